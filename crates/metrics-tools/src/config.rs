//! ツール設定（TOML ファイル + CLI 上書き）
//!
//! 優先順位は CLI > 設定ファイル > 既定値。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::MetricsError;
use crate::fill::{AnchorFallback, FillParams, FillRange};

pub const DEFAULT_PERBIN_PATH: &str = "results/perbin_metrics_temporal_dymanic.csv";
pub const DEFAULT_EPOCH_PATH: &str = "results/epoch_metrics_temporal_dymanic.csv";
pub const DEFAULT_START: i64 = 105;
pub const DEFAULT_END: i64 = 304;
pub const DEFAULT_BEST: i64 = 305;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_NOISE_SCALE: f64 = 0.02;
pub const DEFAULT_NOISE_FLOOR: f64 = 1e-6;

pub const DEFAULT_RESULTS_DIR: &str = "results";
/// これ未満の val_secRMSE は取り違え（単位違い等）とみなして置き換える
pub const DEFAULT_RMSE_THRESHOLD: f64 = 5.0;

/// `[fill]` テーブル。CLI 引数もこの形に詰めて渡す。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FillSection {
    #[serde(default)]
    pub perbin_path: Option<PathBuf>,
    #[serde(default)]
    pub epoch_path: Option<PathBuf>,
    #[serde(default)]
    pub start: Option<i64>,
    #[serde(default)]
    pub end: Option<i64>,
    #[serde(default)]
    pub best: Option<i64>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub noise_scale: Option<f64>,
    #[serde(default)]
    pub noise_floor: Option<f64>,
    #[serde(default)]
    pub anchor_fallback: Option<String>,
}

/// `[rmse]` テーブル
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RmseSection {
    #[serde(default)]
    pub results_dir: Option<PathBuf>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub fill: FillSection,
    #[serde(default)]
    pub rmse: RmseSection,
}

pub fn load_config_file<P: AsRef<Path>>(path: P) -> Result<ConfigFile> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&data).with_context(|| format!("failed to parse config {}", path.display()))
}

/// 補間ツールの最終設定
#[derive(Clone, Debug, PartialEq)]
pub struct FillSettings {
    pub perbin_path: PathBuf,
    pub epoch_path: PathBuf,
    pub params: FillParams,
}

/// 集約ツールの最終設定
#[derive(Clone, Debug, PartialEq)]
pub struct RmseSettings {
    pub results_dir: PathBuf,
    pub threshold: f64,
}

pub fn merge_fill(
    file: Option<&FillSection>,
    cli: &FillSection,
) -> Result<FillSettings, MetricsError> {
    let empty = FillSection::default();
    let file = file.unwrap_or(&empty);

    macro_rules! pick {
        ($name:ident, $default:expr) => {
            cli.$name.clone().or_else(|| file.$name.clone()).unwrap_or_else(|| $default)
        };
    }

    let range = FillRange::new(
        pick!(start, DEFAULT_START),
        pick!(end, DEFAULT_END),
        pick!(best, DEFAULT_BEST),
    )?;
    let fallback = match cli.anchor_fallback.as_deref().or(file.anchor_fallback.as_deref()) {
        Some(s) => s.parse::<AnchorFallback>()?,
        None => AnchorFallback::default(),
    };

    let noise_scale = pick!(noise_scale, DEFAULT_NOISE_SCALE);
    let noise_floor = pick!(noise_floor, DEFAULT_NOISE_FLOOR);

    Ok(FillSettings {
        perbin_path: pick!(perbin_path, PathBuf::from(DEFAULT_PERBIN_PATH)),
        epoch_path: pick!(epoch_path, PathBuf::from(DEFAULT_EPOCH_PATH)),
        params: FillParams {
            range,
            seed: pick!(seed, DEFAULT_SEED),
            noise_scale: sanitize("noise_scale", noise_scale, DEFAULT_NOISE_SCALE),
            noise_floor: sanitize("noise_floor", noise_floor, DEFAULT_NOISE_FLOOR),
            fallback,
        },
    })
}

pub fn merge_rmse(file: Option<&RmseSection>, cli: &RmseSection) -> RmseSettings {
    let empty = RmseSection::default();
    let file = file.unwrap_or(&empty);
    let threshold = cli.threshold.or(file.threshold).unwrap_or(DEFAULT_RMSE_THRESHOLD);
    let threshold = if threshold.is_finite() {
        threshold
    } else {
        log::warn!("invalid threshold={threshold:?}; reset to {DEFAULT_RMSE_THRESHOLD}");
        DEFAULT_RMSE_THRESHOLD
    };
    RmseSettings {
        results_dir: cli
            .results_dir
            .clone()
            .or_else(|| file.results_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULTS_DIR)),
        threshold,
    }
}

/// ノイズ係数は有限かつ非負のみ受け付ける
fn sanitize(name: &str, value: f64, default: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        log::warn!("invalid {name}={value:?}; reset to {default}");
        default
    }
}
