//! perbin の rmse_s から epoch ごとの val_secRMSE を再計算する
//!
//! 集約値は `sqrt(Σ rmse_i² · n_i / Σ n_i)`（サンプル数重み付き二乗平均平方根）。
//! 既存値が欠損・パース不能、または閾値未満のときだけ置き換える。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::common::columns::{EPOCH, N, RMSE_S, SPLIT, SPLIT_VAL, VAL_SEC_RMSE};
use crate::common::io::{format_float, read_table, write_table};
use crate::error::MetricsError;
use crate::table::{Row, Table};

const EPOCH_FILE_PREFIX: &str = "epoch_metrics_";
const PERBIN_FILE_PREFIX: &str = "perbin_metrics_";

/// 1 epoch 分の重み付き二乗和
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RmseAccumulator {
    sq_sum: f64,
    n: u64,
}

impl RmseAccumulator {
    pub fn add(&mut self, rmse: f64, n: u64) {
        self.sq_sum += rmse * rmse * n as f64;
        self.n += n;
    }

    pub fn samples(&self) -> u64 {
        self.n
    }

    /// サンプル数 0 なら未定義
    pub fn rmse(&self) -> Option<f64> {
        (self.n > 0).then(|| (self.sq_sum / self.n as f64).sqrt())
    }
}

/// perbin テーブルの val 行を epoch ごとに集約する
///
/// パースできない行は警告を出して読み飛ばす。`n` が空なら 0 件として扱う。
pub fn aggregate_perbin(table: &Table) -> BTreeMap<i64, RmseAccumulator> {
    let mut by_epoch: BTreeMap<i64, RmseAccumulator> = BTreeMap::new();
    for row in table.iter() {
        if row.get_opt(SPLIT) != Some(SPLIT_VAL) {
            continue;
        }
        match parse_perbin_row(&row) {
            Ok((epoch, rmse, n)) => by_epoch.entry(epoch).or_default().add(rmse, n),
            Err(e) => log::warn!("skipping perbin row at line {}: {e}", row.line()),
        }
    }
    by_epoch
}

fn parse_perbin_row(row: &Row<'_>) -> Result<(i64, f64, u64), MetricsError> {
    let epoch = row.parse_i64(EPOCH)?;
    let rmse = row.parse_f64(RMSE_S)?;
    let n = match row.get_opt(N).map(str::trim) {
        None | Some("") => 0,
        Some(v) => v.parse::<u64>().map_err(|_| MetricsError::Parse {
            column: N.to_owned(),
            value: v.to_owned(),
            line: row.line(),
        })?,
    };
    Ok((epoch, rmse, n))
}

/// epoch テーブルの val 行の val_secRMSE を書き換え、置き換えた件数を返す
pub fn rewrite_epoch_rmse(
    table: &mut Table,
    aggregates: &BTreeMap<i64, RmseAccumulator>,
    threshold: f64,
) -> Result<usize, MetricsError> {
    let mut replacements: Vec<(usize, f64)> = Vec::new();
    for (idx, row) in table.iter().enumerate() {
        if row.get_opt(SPLIT) != Some(SPLIT_VAL) {
            continue;
        }
        let epoch = match row.parse_i64(EPOCH) {
            Ok(e) => e,
            Err(e) => {
                log::warn!("skipping epoch row at line {}: {e}", row.line());
                continue;
            }
        };
        let Some(rmse) = aggregates.get(&epoch).and_then(RmseAccumulator::rmse) else {
            continue;
        };
        if needs_replacement(row.parse_f64_opt(VAL_SEC_RMSE), threshold) {
            log::debug!("epoch {epoch}: val_secRMSE -> {rmse}");
            replacements.push((idx, rmse));
        }
    }

    for &(idx, rmse) in &replacements {
        table.set(idx, VAL_SEC_RMSE, format_float(rmse))?;
    }
    Ok(replacements.len())
}

/// 欠損・パース不能、または閾値未満なら置き換え対象
pub fn needs_replacement(current: Option<f64>, threshold: f64) -> bool {
    match current {
        None => true,
        Some(v) => v < threshold,
    }
}

/// epoch_metrics_<suffix> と対応する perbin_metrics_<suffix> の組
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePair {
    pub epoch: PathBuf,
    pub perbin: PathBuf,
}

/// `dir` 内の `epoch_metrics_*.csv` を列挙し、同じディレクトリの perbin ファイルと対応付ける
///
/// perbin 側が存在しないものは除外する。結果はパス順。
pub fn find_pairs(dir: &Path) -> Result<Vec<FilePair>> {
    let escaped = PathBuf::from(glob::Pattern::escape(&dir.to_string_lossy()));
    let pattern = escaped
        .join(format!("{EPOCH_FILE_PREFIX}*.csv"))
        .to_string_lossy()
        .into_owned();
    let mut epoch_paths: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("invalid glob pattern: {pattern}"))?
        .collect::<Result<_, _>>()
        .with_context(|| format!("failed to list {}", dir.display()))?;
    epoch_paths.sort();

    let mut pairs = Vec::with_capacity(epoch_paths.len());
    for epoch in epoch_paths {
        let Some(suffix) = epoch
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(EPOCH_FILE_PREFIX))
        else {
            continue;
        };
        let perbin = epoch.with_file_name(format!("{PERBIN_FILE_PREFIX}{suffix}"));
        if !perbin.is_file() {
            log::debug!("no perbin file for {}, skipped", epoch.display());
            continue;
        }
        pairs.push(FilePair { epoch, perbin });
    }
    Ok(pairs)
}

/// 1 組分の再計算。置き換えが 1 件以上あるときだけ epoch ファイルを上書きする。
pub fn recompute_pair(pair: &FilePair, threshold: f64, dry_run: bool) -> Result<usize> {
    let perbin = read_table(&pair.perbin)?;
    let aggregates = aggregate_perbin(&perbin);

    let mut epochs = read_table(&pair.epoch)?;
    let replaced = rewrite_epoch_rmse(&mut epochs, &aggregates, threshold)
        .with_context(|| format!("failed to update {}", pair.epoch.display()))?;

    if replaced > 0 && !dry_run {
        write_table(&pair.epoch, &epochs)?;
    }
    Ok(replaced)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RmseSummary {
    pub pairs: usize,
    pub files_updated: usize,
    pub values_replaced: usize,
}

/// ディレクトリ内の全ペアを順に処理する
pub fn recompute_dir(dir: &Path, threshold: f64, dry_run: bool) -> Result<RmseSummary> {
    let pairs = find_pairs(dir)?;
    let mut summary = RmseSummary {
        pairs: pairs.len(),
        ..RmseSummary::default()
    };
    for pair in &pairs {
        let replaced = recompute_pair(pair, threshold, dry_run)?;
        if replaced > 0 {
            summary.files_updated += 1;
            summary.values_replaced += replaced;
            log::info!(
                "{}: replaced {replaced} val_secRMSE value(s){}",
                pair.epoch.display(),
                if dry_run { " (dry run)" } else { "" }
            );
        } else {
            log::debug!("{}: no change", pair.epoch.display());
        }
    }
    Ok(summary)
}
