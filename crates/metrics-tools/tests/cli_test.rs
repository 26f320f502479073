use std::fs;
use std::path::Path;
use std::process::Command;

const PERBIN_CSV: &str = "\
epoch,split,bin,mae_s,rmse_s,acc_at_tau_pct,tau_s,n
1,val,0,2,3,50,30,10
1,val,1,4,5,40,30,5
4,val,0,1,2,60,30,10
4,val,1,2,3,55,30,5
";

const EPOCH_CSV: &str = "\
epoch,split,loss,lb,val_MSE,val_secMAE,val_secRMSE,val_MAPE,router_entropy,router_max_share,target_key
1,train,2.0,0.5,,,,,1.2,0.4,speed
1,val,,,10,2,,,,,speed
4,train,1.0,0.3,,,,,1.0,0.5,speed
4,val,,,5,1,2.5,0.1,,,speed
";

fn write_fixtures(dir: &Path) {
    fs::write(dir.join("perbin_metrics_run.csv"), PERBIN_CSV).expect("write perbin");
    fs::write(dir.join("epoch_metrics_run.csv"), EPOCH_CSV).expect("write epoch");
}

#[test]
fn recompute_rmse_updates_results_dir() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());

    let out = Command::new(env!("CARGO_BIN_EXE_recompute_rmse"))
        .arg("--results-dir")
        .arg(dir.path())
        .output()
        .expect("run recompute_rmse");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let updated = fs::read_to_string(dir.path().join("epoch_metrics_run.csv")).unwrap();
    assert_ne!(updated, EPOCH_CSV);
    assert!(updated.contains(&format!("{:.15}", (215.0_f64 / 15.0).sqrt())));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("value(s) replaced"), "stderr: {stderr}");
}

#[test]
fn recompute_rmse_fails_on_missing_dir() {
    let dir = tempfile::tempdir().unwrap();
    let out = Command::new(env!("CARGO_BIN_EXE_recompute_rmse"))
        .arg("--results-dir")
        .arg(dir.path().join("nope"))
        .output()
        .expect("run recompute_rmse");
    assert!(!out.status.success());
}

#[test]
fn fill_missing_epochs_reads_config_and_cli_overrides_it() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let perbin = dir.path().join("perbin_metrics_run.csv");
    let epoch = dir.path().join("epoch_metrics_run.csv");

    // best = 9 は不正だが CLI の --best 4 が優先される
    let config = dir.path().join("tools.toml");
    fs::write(
        &config,
        format!(
            "[fill]\nperbin_path = {:?}\nepoch_path = {:?}\nstart = 2\nend = 3\nbest = 9\nseed = 1\n",
            perbin.display().to_string(),
            epoch.display().to_string()
        ),
    )
    .unwrap();

    let out = Command::new(env!("CARGO_BIN_EXE_fill_missing_epochs"))
        .arg("--config")
        .arg(&config)
        .args(["--best", "4", "--noise-scale", "0"])
        .output()
        .expect("run fill_missing_epochs");
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let perbin_out = fs::read_to_string(&perbin).unwrap();
    // epoch 2, 3 x bin 0, 1 が追加される
    assert_eq!(perbin_out.lines().count(), 1 + 4 + 4);
    assert!(perbin_out.contains("\n2,val,0,"));
    assert!(perbin_out.contains("\n3,val,1,"));
    let epoch_out = fs::read_to_string(&epoch).unwrap();
    assert_eq!(epoch_out.lines().count(), 1 + 4 + 4);
}

#[test]
fn fill_missing_epochs_rejects_invalid_range() {
    let dir = tempfile::tempdir().unwrap();
    write_fixtures(dir.path());
    let out = Command::new(env!("CARGO_BIN_EXE_fill_missing_epochs"))
        .arg("--perbin")
        .arg(dir.path().join("perbin_metrics_run.csv"))
        .arg("--epoch")
        .arg(dir.path().join("epoch_metrics_run.csv"))
        .args(["--start", "2", "--end", "4", "--best", "4"])
        .output()
        .expect("run fill_missing_epochs");
    assert!(!out.status.success());
    assert_eq!(
        fs::read_to_string(dir.path().join("perbin_metrics_run.csv")).unwrap(),
        PERBIN_CSV
    );
}
