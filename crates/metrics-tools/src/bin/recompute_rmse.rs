use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;

use metrics_tools::config::{RmseSection, load_config_file, merge_rmse};
use metrics_tools::rmse::recompute_dir;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Recompute val_secRMSE in epoch_metrics_*.csv from the matching perbin_metrics_*.csv"
)]
struct Cli {
    /// 設定ファイル（TOML, [rmse] テーブル）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 対象ディレクトリ（既定: results）
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// これ未満の既存値を置き換える（既定: 5.0）
    #[arg(long)]
    threshold: Option<f64>,

    /// ファイルを書き換えずに件数だけ表示
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let file = cli.config.as_deref().map(load_config_file).transpose()?;
    let overrides = RmseSection {
        results_dir: cli.results_dir.clone(),
        threshold: cli.threshold,
    };
    let settings = merge_rmse(file.as_ref().map(|f| &f.rmse), &overrides);
    if !settings.results_dir.is_dir() {
        bail!("results directory not found: {}", settings.results_dir.display());
    }

    let summary = recompute_dir(&settings.results_dir, settings.threshold, cli.dry_run)?;
    log::info!(
        "{} file pair(s) scanned, {} file(s) updated, {} value(s) replaced (threshold={})",
        summary.pairs,
        summary.files_updated,
        summary.values_replaced,
        settings.threshold
    );
    Ok(())
}
