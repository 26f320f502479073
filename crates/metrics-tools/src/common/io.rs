//! メトリクス CSV の読み書き

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::table::Table;

const READER_BUF_CAP: usize = 128 * 1024; // 128 KiB

/// 浮動小数点は小数 15 桁固定で書き出す
pub fn format_float(value: f64) -> String {
    format!("{value:.15}")
}

pub fn read_table<P: AsRef<Path>>(path: P) -> Result<Table> {
    let p = path.as_ref();
    let f = File::open(p).with_context(|| format!("failed to open {}", p.display()))?;
    read_table_from(BufReader::with_capacity(READER_BUF_CAP, f))
        .with_context(|| format!("failed to read {}", p.display()))
}

pub fn read_table_from<R: Read>(reader: R) -> Result<Table> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers: Vec<String> = rdr.headers()?.iter().map(ToOwned::to_owned).collect();

    let mut table = Table::new(headers);
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("invalid CSV record at line {}", i + 2))?;
        table.push_row(record.iter().map(ToOwned::to_owned).collect());
    }
    Ok(table)
}

/// ファイル全体を上書きする（一時ファイル経由の置き換えはしない）
pub fn write_table<P: AsRef<Path>>(path: P, table: &Table) -> Result<()> {
    let p = path.as_ref();
    let f = File::create(p).with_context(|| format!("failed to create {}", p.display()))?;
    let mut w = BufWriter::new(f);
    write_table_to(&mut w, table).with_context(|| format!("failed to write {}", p.display()))?;
    // BufWriter の drop ではエラーが握りつぶされるので明示的に flush する
    let mut file = w.into_inner().map_err(|e| e.into_error())?;
    file.flush()?;
    Ok(())
}

pub fn write_table_to<W: Write>(writer: W, table: &Table) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(table.headers())?;
    for row in table.rows() {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_float_uses_fifteen_decimals() {
        assert_eq!(format_float(1.5), "1.500000000000000");
        assert_eq!(format_float(3.0), "3.000000000000000");
    }

    #[test]
    fn table_roundtrip_keeps_raw_fields() {
        let src = "epoch,split,tau_s,target_key\n1,val,1e-3,\"a,b\"\n2,val,0.0010,\n";
        let table = read_table_from(src.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(0).get("tau_s").unwrap(), "1e-3");
        assert_eq!(table.row(0).get("target_key").unwrap(), "a,b");

        let mut out = Vec::new();
        write_table_to(&mut out, &table).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), src);
    }

    #[test]
    fn header_only_input_gives_empty_table() {
        let table = read_table_from("epoch,split\n".as_bytes()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.headers(), ["epoch", "split"]);
    }
}
