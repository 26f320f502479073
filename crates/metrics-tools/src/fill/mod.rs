//! 欠損 epoch 範囲の補間生成
//!
//! `[start, end]` の各 epoch を、直前 epoch (`start - 1`) と best epoch の
//! アンカー行の間で線形補間して再生成する。補間値にはアンカー間の差に比例した
//! 小さな一様ノイズを加え、改善方向が定まっているメトリクスは best epoch の値を
//! 超えて良くならないようにクランプする。

pub mod epoch;
pub mod perbin;

use std::collections::BTreeSet;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::common::io::{read_table, write_table};
use crate::error::MetricsError;
use crate::table::Table;

pub use epoch::fill_epoch;
pub use perbin::fill_perbin;

/// 再生成する epoch 範囲（両端を含む）と best epoch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FillRange {
    pub start: i64,
    pub end: i64,
    pub best: i64,
}

impl FillRange {
    pub fn new(start: i64, end: i64, best: i64) -> Result<Self, MetricsError> {
        let range = Self { start, end, best };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<(), MetricsError> {
        // best - (start - 1) が i64 に収まれば end - start + 1 も収まる
        let span = self
            .start
            .checked_sub(1)
            .and_then(|pred| self.best.checked_sub(pred));
        if self.start > self.end || self.best <= self.end || span.is_none() {
            return Err(MetricsError::InvalidRange {
                start: self.start,
                end: self.end,
                best: self.best,
            });
        }
        Ok(())
    }

    /// 補間の起点となる epoch（t = 0）
    pub fn predecessor(&self) -> i64 {
        self.start - 1
    }

    pub fn contains(&self, epoch: i64) -> bool {
        (self.start..=self.end).contains(&epoch)
    }

    pub fn epochs(&self) -> impl Iterator<Item = i64> {
        self.start..=self.end
    }

    pub fn epoch_count(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    /// `t = (e - (start-1)) / (best - (start-1))`
    pub fn fraction(&self, epoch: i64) -> f64 {
        let base = self.predecessor();
        (epoch - base) as f64 / (self.best - base) as f64
    }
}

/// 直前 epoch のアンカー行が無いときの扱い
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AnchorFallback {
    /// 欠落はエラー
    #[default]
    Strict,
    /// 指定 epoch の行を使う
    Fixed(i64),
    /// `start` より前で最も近い epoch の行を使う
    Nearest,
}

impl AnchorFallback {
    /// `epochs` はそのサブキー（bin / split）について存在する epoch の集合
    pub fn resolve(&self, range: &FillRange, epochs: &BTreeSet<i64>) -> Option<i64> {
        let pred = range.predecessor();
        if epochs.contains(&pred) {
            return Some(pred);
        }
        match *self {
            AnchorFallback::Strict => None,
            AnchorFallback::Fixed(epoch) => epochs.contains(&epoch).then_some(epoch),
            AnchorFallback::Nearest => epochs.range(..range.start).next_back().copied(),
        }
    }
}

impl FromStr for AnchorFallback {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "strict" => Ok(AnchorFallback::Strict),
            "nearest" => Ok(AnchorFallback::Nearest),
            _ => s
                .strip_prefix("fixed:")
                .and_then(|e| e.trim().parse::<i64>().ok())
                .map(AnchorFallback::Fixed)
                .ok_or_else(|| MetricsError::InvalidFallback(s.to_owned())),
        }
    }
}

/// 補間パラメータ一式
#[derive(Clone, Debug, PartialEq)]
pub struct FillParams {
    pub range: FillRange,
    pub seed: u64,
    pub noise_scale: f64,
    pub noise_floor: f64,
    pub fallback: AnchorFallback,
}

/// メトリクスの改善方向
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
    /// 改善方向を持たない（クランプしない）
    Unranked,
}

impl Direction {
    /// best の値より良くならないように丸める
    pub fn clamp_not_better(self, value: f64, best: f64) -> f64 {
        match self {
            Direction::LowerIsBetter => value.max(best),
            Direction::HigherIsBetter => value.min(best),
            Direction::Unranked => value,
        }
    }
}

/// ノイズ振幅の基準
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Span {
    /// アンカー間の差 `lo - hi`
    AnchorSpread,
    /// 固定値
    Fixed(f64),
}

/// 補間対象の 1 列分の規則
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricRule {
    pub column: &'static str,
    pub direction: Direction,
    pub span: Span,
}

impl MetricRule {
    pub const fn new(column: &'static str, direction: Direction, span: Span) -> Self {
        Self {
            column,
            direction,
            span,
        }
    }

    /// 片方のアンカーが欠けていればもう一方と同値とみなし、両方欠けていれば `None`
    pub fn interpolate<R: Rng>(
        &self,
        lo: Option<f64>,
        hi: Option<f64>,
        t: f64,
        jitter: &mut Jitter<R>,
    ) -> Option<f64> {
        let (lo, hi) = match (lo, hi) {
            (None, None) => return None,
            (Some(a), None) => (a, a),
            (None, Some(b)) => (b, b),
            (Some(a), Some(b)) => (a, b),
        };
        let span = match self.span {
            Span::AnchorSpread => lo - hi,
            Span::Fixed(s) => s,
        };
        let value = jitter.apply(lerp(lo, hi, t), span);
        Some(self.direction.clamp_not_better(value, hi))
    }
}

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// 整数列（サンプル数）の補間。丸めは偶数丸め。
pub fn lerp_count(a: i64, b: i64, t: f64) -> i64 {
    lerp(a as f64, b as f64, t).round_ties_even() as i64
}

/// `span` に比例した有界一様ノイズ
pub struct Jitter<R> {
    rng: R,
    scale: f64,
    floor: f64,
}

impl Jitter<ChaCha8Rng> {
    pub fn seeded(params: &FillParams) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(params.seed), params.noise_scale, params.noise_floor)
    }
}

impl<R: Rng> Jitter<R> {
    pub fn new(rng: R, scale: f64, floor: f64) -> Self {
        Self { rng, scale, floor }
    }

    /// `scale * (|span| + floor)`
    pub fn amplitude(&self, span: f64) -> f64 {
        self.scale * (span.abs() + self.floor)
    }

    pub fn apply(&mut self, value: f64, span: f64) -> f64 {
        let amp = self.amplitude(span);
        if amp <= 0.0 || !amp.is_finite() {
            return value;
        }
        value + self.rng.random_range(-amp..=amp)
    }
}

/// 再生成後のテーブルと生成行数
#[derive(Clone, Debug)]
pub struct Filled {
    pub table: Table,
    pub generated: usize,
}

/// 並べ替えキー付きの行
type KeyedRow = ((i64, i64), Vec<String>);

/// 範囲外の既存行と生成行を合わせ、(epoch, サブキー) 順に並べる
fn assemble(mut rows: Vec<KeyedRow>, headers: &[String]) -> Table {
    rows.sort_by_key(|(key, _)| *key);
    Table::with_rows(headers.to_vec(), rows.into_iter().map(|(_, row)| row).collect())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FillSummary {
    pub perbin_rows: usize,
    pub perbin_generated: usize,
    pub epoch_rows: usize,
    pub epoch_generated: usize,
}

/// perbin / epoch の 2 ファイルを読み込み、範囲を再生成して上書きする
///
/// 乱数列は perbin → epoch の順に共有するため、同じ seed なら出力は毎回一致する。
pub fn fill_files(
    perbin_path: &Path,
    epoch_path: &Path,
    params: &FillParams,
    dry_run: bool,
) -> Result<FillSummary> {
    params.range.validate()?;
    let perbin = read_table(perbin_path)?;
    let epochs = read_table(epoch_path)?;

    let mut jitter = Jitter::seeded(params);
    let perbin = fill_perbin(&perbin, params, &mut jitter)
        .with_context(|| format!("failed to fill {}", perbin_path.display()))?;
    let epochs = fill_epoch(&epochs, params, &mut jitter)
        .with_context(|| format!("failed to fill {}", epoch_path.display()))?;

    let summary = FillSummary {
        perbin_rows: perbin.table.len(),
        perbin_generated: perbin.generated,
        epoch_rows: epochs.table.len(),
        epoch_generated: epochs.generated,
    };

    if dry_run {
        log::info!(
            "dry run: {} ({} generated) and {} ({} generated) not written",
            perbin_path.display(),
            summary.perbin_generated,
            epoch_path.display(),
            summary.epoch_generated
        );
        return Ok(summary);
    }

    write_table(perbin_path, &perbin.table)?;
    log::info!(
        "wrote {} rows ({} regenerated) to {}",
        summary.perbin_rows,
        summary.perbin_generated,
        perbin_path.display()
    );
    write_table(epoch_path, &epochs.table)?;
    log::info!(
        "wrote {} rows ({} regenerated) to {}",
        summary.epoch_rows,
        summary.epoch_generated,
        epoch_path.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_is_zero_at_predecessor_and_one_at_best() {
        let range = FillRange::new(105, 304, 305).unwrap();
        assert_eq!(range.fraction(104), 0.0);
        assert_eq!(range.fraction(305), 1.0);
        assert_eq!(range.epoch_count(), 200);

        let short = FillRange::new(11, 19, 20).unwrap();
        assert_eq!(short.fraction(15), 0.5);
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(matches!(FillRange::new(10, 9, 20), Err(MetricsError::InvalidRange { .. })));
        assert!(matches!(FillRange::new(10, 20, 20), Err(MetricsError::InvalidRange { .. })));
        assert!(FillRange::new(10, 10, 11).is_ok());
    }

    #[test]
    fn ranges_overflowing_i64_are_rejected() {
        assert!(matches!(
            FillRange::new(i64::MIN, 0, 1),
            Err(MetricsError::InvalidRange { .. })
        ));
        assert!(matches!(
            FillRange::new(-5, 0, i64::MAX),
            Err(MetricsError::InvalidRange { .. })
        ));
        let widest = FillRange::new(i64::MIN + 1, -2, -1).unwrap();
        assert_eq!(widest.predecessor(), i64::MIN);
        assert_eq!(widest.epoch_count(), (i64::MAX - 1) as usize);
        assert!(FillRange::new(i64::MIN + 1, -1, 0).is_err());
    }

    #[test]
    fn lerp_hits_anchors_exactly() {
        assert_eq!(lerp(2.5, 7.25, 0.0), 2.5);
        assert_eq!(lerp(2.5, 7.25, 1.0), 7.25);
        assert_eq!(lerp_count(100, 103, 0.5), 102); // 101.5 -> 102
        assert_eq!(lerp_count(100, 105, 0.5), 102); // 102.5 -> 102
    }

    #[test]
    fn clamp_respects_direction() {
        assert_eq!(Direction::LowerIsBetter.clamp_not_better(1.0, 2.0), 2.0);
        assert_eq!(Direction::LowerIsBetter.clamp_not_better(3.0, 2.0), 3.0);
        assert_eq!(Direction::HigherIsBetter.clamp_not_better(90.0, 80.0), 80.0);
        assert_eq!(Direction::HigherIsBetter.clamp_not_better(70.0, 80.0), 70.0);
        assert_eq!(Direction::Unranked.clamp_not_better(1.0, 2.0), 1.0);
    }

    #[test]
    fn jitter_stays_within_amplitude() {
        let mut jitter = Jitter::new(ChaCha8Rng::seed_from_u64(7), 0.02, 1e-6);
        let amp = jitter.amplitude(-4.0);
        assert!((amp - 0.02 * (4.0 + 1e-6)).abs() < 1e-15);
        for _ in 0..1000 {
            let v = jitter.apply(10.0, -4.0);
            assert!((v - 10.0).abs() <= amp);
        }
    }

    #[test]
    fn zero_scale_disables_jitter() {
        let mut jitter = Jitter::new(ChaCha8Rng::seed_from_u64(7), 0.0, 1e-6);
        assert_eq!(jitter.apply(1.25, 100.0), 1.25);
    }

    #[test]
    fn interpolate_treats_missing_anchor_as_equal() {
        let rule = MetricRule::new("val_MSE", Direction::LowerIsBetter, Span::AnchorSpread);
        let mut jitter = Jitter::new(ChaCha8Rng::seed_from_u64(1), 0.0, 0.0);
        assert_eq!(rule.interpolate(None, None, 0.3, &mut jitter), None);
        assert_eq!(rule.interpolate(Some(4.0), None, 0.3, &mut jitter), Some(4.0));
        assert_eq!(rule.interpolate(None, Some(2.0), 0.3, &mut jitter), Some(2.0));
        assert_eq!(rule.interpolate(Some(4.0), Some(2.0), 0.5, &mut jitter), Some(3.0));
    }

    #[test]
    fn anchor_fallback_parses_and_resolves() {
        let range = FillRange::new(105, 304, 305).unwrap();
        let epochs: BTreeSet<i64> = [90, 100, 305].into_iter().collect();

        assert_eq!("strict".parse::<AnchorFallback>().unwrap(), AnchorFallback::Strict);
        assert_eq!("nearest".parse::<AnchorFallback>().unwrap(), AnchorFallback::Nearest);
        assert_eq!("fixed:90".parse::<AnchorFallback>().unwrap(), AnchorFallback::Fixed(90));
        assert!("fixed:abc".parse::<AnchorFallback>().is_err());

        assert_eq!(AnchorFallback::Strict.resolve(&range, &epochs), None);
        assert_eq!(AnchorFallback::Fixed(90).resolve(&range, &epochs), Some(90));
        assert_eq!(AnchorFallback::Fixed(95).resolve(&range, &epochs), None);
        assert_eq!(AnchorFallback::Nearest.resolve(&range, &epochs), Some(100));

        let with_pred: BTreeSet<i64> = [100, 104, 305].into_iter().collect();
        assert_eq!(AnchorFallback::Strict.resolve(&range, &with_pred), Some(104));
    }
}
