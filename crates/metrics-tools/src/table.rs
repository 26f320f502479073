//! ヘッダ付き CSV を生の文字列のまま保持するテーブル
//!
//! 補間範囲外の行はパースせずに文字列のまま書き戻すため、
//! 値の正規化（浮動小数点の再フォーマット等）は一切行わない。

use std::collections::HashMap;

use crate::error::MetricsError;

/// ヘッダ行 + データ行
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        let index = build_index(&headers);
        Self {
            headers,
            index,
            rows: Vec::new(),
        }
    }

    pub fn with_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut table = Self::new(headers);
        table.rows = rows;
        table
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    /// 列名から列番号を引く
    pub fn column(&self, name: &str) -> Result<usize, MetricsError> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| MetricsError::MissingColumn(name.to_owned()))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn row(&self, idx: usize) -> Row<'_> {
        Row {
            cols: &self.rows[idx],
            index: &self.index,
            line: idx + 2,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> {
        (0..self.rows.len()).map(|idx| self.row(idx))
    }

    /// 全列が空文字の行（ヘッダ幅）
    pub fn blank_row(&self) -> Vec<String> {
        vec![String::new(); self.headers.len()]
    }

    /// `row` の `name` 列に値を入れる
    pub fn set_field(
        &self,
        row: &mut [String],
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), MetricsError> {
        let idx = self.column(name)?;
        row[idx] = value.into();
        Ok(())
    }

    pub fn set(&mut self, row: usize, name: &str, value: impl Into<String>) -> Result<(), MetricsError> {
        let idx = self.column(name)?;
        self.rows[row][idx] = value.into();
        Ok(())
    }
}

/// 1 行分の読み取りビュー
#[derive(Clone, Copy)]
pub struct Row<'a> {
    cols: &'a [String],
    index: &'a HashMap<String, usize>,
    line: usize,
}

impl<'a> Row<'a> {
    /// ファイル上の行番号（ヘッダを 1 行目とする）
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn raw(&self) -> &'a [String] {
        self.cols
    }

    pub fn get(&self, key: &str) -> Result<&'a str, MetricsError> {
        self.get_opt(key).ok_or_else(|| MetricsError::MissingColumn(key.to_owned()))
    }

    /// 列が無い場合は `None`
    pub fn get_opt(&self, key: &str) -> Option<&'a str> {
        let idx = self.index.get(key).copied()?;
        self.cols.get(idx).map(String::as_str)
    }

    pub fn parse_i64(&self, key: &str) -> Result<i64, MetricsError> {
        let value = self.get(key)?;
        value.trim().parse::<i64>().map_err(|_| self.parse_error(key, value))
    }

    pub fn parse_f64(&self, key: &str) -> Result<f64, MetricsError> {
        let value = self.get(key)?;
        value.trim().parse::<f64>().map_err(|_| self.parse_error(key, value))
    }

    /// 列の欠落・空文字・パース失敗をすべて `None` として扱う
    pub fn parse_f64_opt(&self, key: &str) -> Option<f64> {
        self.get_opt(key).and_then(|v| v.trim().parse::<f64>().ok())
    }

    fn parse_error(&self, key: &str, value: &str) -> MetricsError {
        MetricsError::Parse {
            column: key.to_owned(),
            value: value.to_owned(),
            line: self.line,
        }
    }
}

fn build_index(headers: &[String]) -> HashMap<String, usize> {
    headers.iter().enumerate().map(|(idx, name)| (name.clone(), idx)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::with_rows(
            vec!["epoch".into(), "split".into(), "loss".into()],
            vec![
                vec!["1".into(), "train".into(), "0.5".into()],
                vec!["1".into(), "val".into(), "".into()],
            ],
        )
    }

    #[test]
    fn row_accessors_follow_header_names() {
        let table = sample();
        let row = table.row(0);
        assert_eq!(row.get("split").unwrap(), "train");
        assert_eq!(row.parse_i64("epoch").unwrap(), 1);
        assert_eq!(row.parse_f64_opt("loss"), Some(0.5));
        assert_eq!(row.line(), 2);

        let val = table.row(1);
        assert_eq!(val.parse_f64_opt("loss"), None);
        assert_eq!(val.parse_f64_opt("no_such_column"), None);
        assert!(matches!(val.get("no_such_column"), Err(MetricsError::MissingColumn(_))));
    }

    #[test]
    fn parse_error_reports_line_and_value() {
        let table = sample();
        match table.row(1).parse_f64("loss") {
            Err(MetricsError::Parse { column, value, line }) => {
                assert_eq!(column, "loss");
                assert_eq!(value, "");
                assert_eq!(line, 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn set_field_rejects_unknown_column() {
        let table = sample();
        let mut row = table.blank_row();
        table.set_field(&mut row, "loss", "1.0").unwrap();
        assert_eq!(row, vec!["", "", "1.0"]);
        assert!(table.set_field(&mut row, "lb", "0.1").is_err());
    }
}
