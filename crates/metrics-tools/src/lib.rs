//! 学習ログ（epoch / perbin メトリクス CSV）の後処理ツール
//!
//! - [`fill`]: 欠損 epoch 範囲をアンカー行間の補間で再生成する
//! - [`rmse`]: perbin の rmse_s から epoch ごとの val_secRMSE を再計算する

pub mod common;
pub mod config;
pub mod error;
pub mod fill;
pub mod rmse;
pub mod table;

pub use error::MetricsError;
pub use table::Table;
