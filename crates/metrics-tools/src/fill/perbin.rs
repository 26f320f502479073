use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;

use super::{
    Direction, FillParams, Filled, Jitter, KeyedRow, MetricRule, Span, assemble, lerp_count,
};
use crate::common::columns::{ACC_AT_TAU_PCT, BIN, EPOCH, MAE_S, N, RMSE_S, SPLIT, TAU_S};
use crate::common::io::format_float;
use crate::error::MetricsError;
use crate::table::{Row, Table};

pub const PERBIN_METRICS: [MetricRule; 3] = [
    MetricRule::new(MAE_S, Direction::LowerIsBetter, Span::AnchorSpread),
    MetricRule::new(RMSE_S, Direction::LowerIsBetter, Span::AnchorSpread),
    MetricRule::new(ACC_AT_TAU_PCT, Direction::HigherIsBetter, Span::AnchorSpread),
];

/// perbin テーブルの `[start, end]` を (epoch, bin) 単位で再生成する
///
/// best epoch・直前 epoch・範囲内のどこかに行を持つ bin が対象で、
/// そのすべてに best epoch の行が必要。
pub fn fill_perbin<R: Rng>(
    table: &Table,
    params: &FillParams,
    jitter: &mut Jitter<R>,
) -> Result<Filled, MetricsError> {
    let range = params.range;
    range.validate()?;

    let mut keyed: BTreeMap<(i64, i64), usize> = BTreeMap::new();
    let mut epochs_by_bin: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
    let mut out: Vec<KeyedRow> = Vec::with_capacity(table.len());

    for (idx, row) in table.iter().enumerate() {
        let epoch = row.parse_i64(EPOCH)?;
        let bin = row.parse_i64(BIN)?;
        keyed.insert((epoch, bin), idx);
        epochs_by_bin.entry(bin).or_default().insert(epoch);
        if !range.contains(epoch) {
            out.push(((epoch, bin), row.raw().to_vec()));
        }
    }

    // best epoch・直前 epoch・範囲内のいずれかに行を持つ bin はすべて再生成する
    let bins: Vec<i64> = epochs_by_bin
        .iter()
        .filter(|(_, epochs)| {
            epochs.contains(&range.best)
                || epochs.range(range.predecessor()..=range.end).next().is_some()
        })
        .map(|(&bin, _)| bin)
        .collect();
    if bins.is_empty() {
        return Err(MetricsError::MissingAnchor {
            epoch: range.best,
            key: "bin=*".to_owned(),
        });
    }

    // bin ごとのアンカー行 (lo, hi)
    let mut anchors: Vec<(i64, Row<'_>, Row<'_>)> = Vec::with_capacity(bins.len());
    for &bin in &bins {
        let epochs = &epochs_by_bin[&bin];
        let hi_idx = keyed.get(&(range.best, bin)).copied().ok_or_else(|| {
            MetricsError::MissingAnchor {
                epoch: range.best,
                key: format!("bin={bin}"),
            }
        })?;
        let lo_epoch = params.fallback.resolve(&range, epochs).ok_or_else(|| {
            MetricsError::MissingAnchor {
                epoch: range.predecessor(),
                key: format!("bin={bin}"),
            }
        })?;
        if lo_epoch != range.predecessor() {
            log::warn!(
                "bin {bin}: epoch {} is missing, using epoch {lo_epoch} as lower anchor",
                range.predecessor()
            );
        }
        let lo = table.row(keyed[&(lo_epoch, bin)]);
        let hi = table.row(hi_idx);
        anchors.push((bin, lo, hi));
    }

    let mut generated = 0;
    for epoch in range.epochs() {
        let t = range.fraction(epoch);
        for (bin, lo, hi) in &anchors {
            let mut row = table.blank_row();
            table.set_field(&mut row, EPOCH, epoch.to_string())?;
            table.set_field(&mut row, SPLIT, hi.get(SPLIT)?)?;
            table.set_field(&mut row, BIN, bin.to_string())?;
            for rule in &PERBIN_METRICS {
                let value = rule.interpolate(
                    lo.parse_f64_opt(rule.column),
                    hi.parse_f64_opt(rule.column),
                    t,
                    jitter,
                );
                table.set_field(&mut row, rule.column, value.map(format_float).unwrap_or_default())?;
            }
            table.set_field(&mut row, TAU_S, hi.get(TAU_S)?)?;
            let n = lerp_count(lo.parse_i64(N)?, hi.parse_i64(N)?, t);
            table.set_field(&mut row, N, n.to_string())?;

            out.push(((epoch, *bin), row));
            generated += 1;
        }
    }

    log::debug!(
        "perbin: regenerated epochs {}..={} for bins {:?} ({} rows)",
        range.start,
        range.end,
        bins,
        generated
    );
    Ok(Filled {
        table: assemble(out, table.headers()),
        generated,
    })
}
