use thiserror::Error;

/// テーブル変換で発生する構造的なエラー
///
/// 補間範囲やアンカー行の欠落は回復不能として扱い、呼び出し側で処理を打ち切る。
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid fill range: start={start}, end={end}, best={best} (expected start <= end < best)")]
    InvalidRange { start: i64, end: i64, best: i64 },

    #[error("missing anchor row: epoch={epoch}, {key}")]
    MissingAnchor { epoch: i64, key: String },

    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("failed to parse {column}={value:?} at line {line}")]
    Parse {
        column: String,
        value: String,
        line: usize,
    },

    #[error("invalid anchor fallback: {0:?} (expected strict, nearest or fixed:<epoch>)")]
    InvalidFallback(String),
}
