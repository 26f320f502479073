//! perbin / epoch メトリクス CSV の列名

pub const EPOCH: &str = "epoch";
pub const SPLIT: &str = "split";

pub const SPLIT_TRAIN: &str = "train";
pub const SPLIT_VAL: &str = "val";

// perbin_metrics_*.csv
pub const BIN: &str = "bin";
pub const MAE_S: &str = "mae_s";
pub const RMSE_S: &str = "rmse_s";
pub const ACC_AT_TAU_PCT: &str = "acc_at_tau_pct";
pub const TAU_S: &str = "tau_s";
pub const N: &str = "n";

pub const PERBIN_COLUMNS: [&str; 8] = [EPOCH, SPLIT, BIN, MAE_S, RMSE_S, ACC_AT_TAU_PCT, TAU_S, N];

// epoch_metrics_*.csv
pub const LOSS: &str = "loss";
pub const LB: &str = "lb";
pub const VAL_MSE: &str = "val_MSE";
pub const VAL_SEC_MAE: &str = "val_secMAE";
pub const VAL_SEC_RMSE: &str = "val_secRMSE";
pub const VAL_MAPE: &str = "val_MAPE";
pub const ROUTER_ENTROPY: &str = "router_entropy";
pub const ROUTER_MAX_SHARE: &str = "router_max_share";
pub const TARGET_KEY: &str = "target_key";

pub const EPOCH_COLUMNS: [&str; 11] = [
    EPOCH,
    SPLIT,
    LOSS,
    LB,
    VAL_MSE,
    VAL_SEC_MAE,
    VAL_SEC_RMSE,
    VAL_MAPE,
    ROUTER_ENTROPY,
    ROUTER_MAX_SHARE,
    TARGET_KEY,
];

/// 同一 epoch 内での split の並び順（train → val → その他）
pub fn split_rank(split: &str) -> u8 {
    match split {
        SPLIT_TRAIN => 0,
        SPLIT_VAL => 1,
        _ => 9,
    }
}
