use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;

use super::{Direction, FillParams, Filled, Jitter, KeyedRow, MetricRule, Span, assemble};
use crate::common::columns::{
    EPOCH, LB, LOSS, ROUTER_ENTROPY, ROUTER_MAX_SHARE, SPLIT, SPLIT_TRAIN, SPLIT_VAL, TARGET_KEY,
    VAL_MAPE, VAL_MSE, VAL_SEC_MAE, VAL_SEC_RMSE, split_rank,
};
use crate::common::io::format_float;
use crate::error::MetricsError;
use crate::table::{Row, Table};

/// train 行: 改善方向を持たないのでクランプしない。ルータ統計は固定幅のノイズ。
pub const TRAIN_METRICS: [MetricRule; 4] = [
    MetricRule::new(LOSS, Direction::Unranked, Span::AnchorSpread),
    MetricRule::new(LB, Direction::Unranked, Span::AnchorSpread),
    MetricRule::new(ROUTER_ENTROPY, Direction::Unranked, Span::Fixed(0.1)),
    MetricRule::new(ROUTER_MAX_SHARE, Direction::Unranked, Span::Fixed(0.05)),
];

/// val 行: すべて誤差系（小さいほど良い）
pub const VAL_METRICS: [MetricRule; 4] = [
    MetricRule::new(VAL_MSE, Direction::LowerIsBetter, Span::AnchorSpread),
    MetricRule::new(VAL_SEC_MAE, Direction::LowerIsBetter, Span::AnchorSpread),
    MetricRule::new(VAL_SEC_RMSE, Direction::LowerIsBetter, Span::AnchorSpread),
    MetricRule::new(VAL_MAPE, Direction::LowerIsBetter, Span::AnchorSpread),
];

/// 再生成する split と、その split で値を持つ列
pub const SPLITS: [(&str, &[MetricRule]); 2] =
    [(SPLIT_TRAIN, &TRAIN_METRICS), (SPLIT_VAL, &VAL_METRICS)];

/// epoch テーブルの `[start, end]` を (epoch, split) 単位で再生成する
///
/// 各 epoch について train → val の順で生成し、その split に属さない列は空にする。
pub fn fill_epoch<R: Rng>(
    table: &Table,
    params: &FillParams,
    jitter: &mut Jitter<R>,
) -> Result<Filled, MetricsError> {
    let range = params.range;
    range.validate()?;

    let mut keyed: BTreeMap<(i64, &str), usize> = BTreeMap::new();
    let mut epochs_by_split: BTreeMap<&str, BTreeSet<i64>> = BTreeMap::new();
    let mut out: Vec<KeyedRow> = Vec::with_capacity(table.len());

    for (idx, row) in table.iter().enumerate() {
        let epoch = row.parse_i64(EPOCH)?;
        let split = row.get(SPLIT)?;
        keyed.insert((epoch, split), idx);
        epochs_by_split.entry(split).or_default().insert(epoch);
        if !range.contains(epoch) {
            out.push(((epoch, i64::from(split_rank(split))), row.raw().to_vec()));
        }
    }

    let mut anchors: Vec<(&str, &[MetricRule], Row<'_>, Row<'_>)> =
        Vec::with_capacity(SPLITS.len());
    for (split, rules) in SPLITS {
        let hi_idx = keyed.get(&(range.best, split)).copied().ok_or_else(|| {
            MetricsError::MissingAnchor {
                epoch: range.best,
                key: format!("split={split}"),
            }
        })?;
        let lo_epoch = epochs_by_split
            .get(split)
            .and_then(|epochs| params.fallback.resolve(&range, epochs))
            .ok_or_else(|| MetricsError::MissingAnchor {
                epoch: range.predecessor(),
                key: format!("split={split}"),
            })?;
        if lo_epoch != range.predecessor() {
            log::warn!(
                "split {split}: epoch {} is missing, using epoch {lo_epoch} as lower anchor",
                range.predecessor()
            );
        }
        let lo = table.row(keyed[&(lo_epoch, split)]);
        anchors.push((split, rules, lo, table.row(hi_idx)));
    }

    let mut generated = 0;
    for epoch in range.epochs() {
        let t = range.fraction(epoch);
        for (split, rules, lo, hi) in &anchors {
            let mut row = table.blank_row();
            table.set_field(&mut row, EPOCH, epoch.to_string())?;
            table.set_field(&mut row, SPLIT, *split)?;
            for rule in rules.iter() {
                let value = rule.interpolate(
                    lo.parse_f64_opt(rule.column),
                    hi.parse_f64_opt(rule.column),
                    t,
                    jitter,
                );
                table.set_field(&mut row, rule.column, value.map(format_float).unwrap_or_default())?;
            }
            table.set_field(&mut row, TARGET_KEY, hi.get_opt(TARGET_KEY).unwrap_or_default())?;

            out.push(((epoch, i64::from(split_rank(split))), row));
            generated += 1;
        }
    }

    log::debug!(
        "epoch: regenerated epochs {}..={} for train/val ({} rows)",
        range.start,
        range.end,
        generated
    );
    Ok(Filled {
        table: assemble(out, table.headers()),
        generated,
    })
}
