use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use metrics_tools::config::{FillSection, load_config_file, merge_fill};
use metrics_tools::fill::fill_files;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Regenerate a missing epoch range in perbin/epoch metric CSVs by interpolating towards the best epoch"
)]
struct Cli {
    /// 設定ファイル（TOML, [fill] テーブル）
    #[arg(long)]
    config: Option<PathBuf>,

    /// perbin_metrics CSV（既定: results/perbin_metrics_temporal_dymanic.csv）
    #[arg(long)]
    perbin: Option<PathBuf>,

    /// epoch_metrics CSV（既定: results/epoch_metrics_temporal_dymanic.csv）
    #[arg(long)]
    epoch: Option<PathBuf>,

    /// 再生成範囲の先頭 epoch（既定: 105）
    #[arg(long)]
    start: Option<i64>,

    /// 再生成範囲の末尾 epoch（既定: 304）
    #[arg(long)]
    end: Option<i64>,

    /// best epoch（補間の終点、既定: 305）
    #[arg(long)]
    best: Option<i64>,

    /// ノイズ用乱数シード（既定: 42）
    #[arg(long)]
    seed: Option<u64>,

    /// ノイズ振幅係数（既定: 0.02, 0 でノイズ無し）
    #[arg(long)]
    noise_scale: Option<f64>,

    /// ノイズ振幅の下限項（既定: 1e-6）
    #[arg(long)]
    noise_floor: Option<f64>,

    /// 直前 epoch が無いときの扱い: strict | nearest | fixed:<epoch>
    #[arg(long)]
    anchor_fallback: Option<String>,

    /// ファイルを書き換えずに件数だけ表示
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

impl Cli {
    fn overrides(&self) -> FillSection {
        FillSection {
            perbin_path: self.perbin.clone(),
            epoch_path: self.epoch.clone(),
            start: self.start,
            end: self.end,
            best: self.best,
            seed: self.seed,
            noise_scale: self.noise_scale,
            noise_floor: self.noise_floor,
            anchor_fallback: self.anchor_fallback.clone(),
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let file = cli.config.as_deref().map(load_config_file).transpose()?;
    let settings = merge_fill(file.as_ref().map(|f| &f.fill), &cli.overrides())?;

    let range = settings.params.range;
    log::info!(
        "regenerating epochs {}..={} towards best epoch {} (seed={}, noise_scale={})",
        range.start,
        range.end,
        range.best,
        settings.params.seed,
        settings.params.noise_scale
    );

    let summary =
        fill_files(&settings.perbin_path, &settings.epoch_path, &settings.params, cli.dry_run)?;
    log::info!(
        "done: perbin {} rows ({} regenerated), epoch {} rows ({} regenerated)",
        summary.perbin_rows,
        summary.perbin_generated,
        summary.epoch_rows,
        summary.epoch_generated
    );
    Ok(())
}
