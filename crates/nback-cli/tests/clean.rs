use assert_cmd::cargo::cargo_bin_cmd;
use nback_lib::io::eye::{EyeTable, LEFT_PUPIL, RIGHT_PUPIL};
use serde_json::Value;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const HEADER: &str =
    "Participant ID,Run ID,Timestamp,Left Pupil Dilation,Right Pupil Dilation,Blink\n";

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .expect("crates dir")
        .parent()
        .expect("workspace root")
        .to_path_buf()
}

fn seed_session(root: &Path) -> Result<(), Box<dyn Error>> {
    let trial_1 = root.join("P01_20240307_090501/trial_1");
    let trial_2 = root.join("P01_20240307_090501/trial_2");
    fs::create_dir_all(&trial_1)?;
    fs::create_dir_all(&trial_2)?;
    fs::copy(
        workspace_root().join("test_data/eye_data_sample.csv"),
        trial_1.join("eye_data.csv"),
    )?;
    fs::write(trial_2.join("eye_data.csv"), HEADER)?;
    Ok(())
}

fn assert_close(a: f64, b: f64, tol: f64) {
    let diff = (a - b).abs();
    assert!(
        diff <= tol,
        "diff {} exceeded tol {} ({} vs {})",
        diff,
        tol,
        a,
        b
    );
}

#[test]
fn clean_writes_sibling_and_reports_summary() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    seed_session(temp.path())?;

    let mut cmd = cargo_bin_cmd!("nback");
    cmd.args(["clean", temp.path().to_str().expect("utf8 path")]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: Value = serde_json::from_slice(&output)?;
    assert_eq!(summary["found"], 2);
    assert_eq!(summary["cleaned"], 1);
    assert_eq!(summary["skipped"], 1);
    assert_eq!(summary["failed"], 0);
    assert_eq!(summary["files"][0]["status"], "cleaned");
    assert_eq!(summary["files"][1]["status"], "skipped");

    let trial_1 = temp.path().join("P01_20240307_090501/trial_1");
    let cleaned = EyeTable::read(&trial_1.join("eye_data_clean.csv"))?;
    let raw = EyeTable::read(&trial_1.join("eye_data.csv"))?;
    assert_eq!(cleaned.rows.len(), raw.rows.len());
    assert_eq!(cleaned.headers, raw.headers);

    let left = cleaned.series(&cleaned.channel(LEFT_PUPIL).expect("left column"));
    let right = cleaned.series(&cleaned.channel(RIGHT_PUPIL).expect("right column"));
    assert_eq!(left.missing_count(), 0);
    assert_eq!(right.missing_count(), 0);
    assert_close(left.values[5].unwrap_or_default(), 3.15, 1e-6);
    assert_close(left.values[8].unwrap_or_default(), 3.18, 1e-6);
    assert_close(right.values[5].unwrap_or_default(), 3.25, 1e-6);

    for (before, after) in raw.rows.iter().zip(&cleaned.rows) {
        assert_eq!(&before[0], &after[0]);
        assert_eq!(&before[2], &after[2]);
        assert_eq!(before.len(), after.len());
    }
    assert_eq!(&cleaned.rows[12][2], "Blink Count");

    let trial_2 = temp.path().join("P01_20240307_090501/trial_2");
    assert!(!trial_2.join("eye_data_clean.csv").exists());
    Ok(())
}

#[test]
fn clean_twice_does_not_pick_up_its_own_output() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    seed_session(temp.path())?;
    for _ in 0..2 {
        let mut cmd = cargo_bin_cmd!("nback");
        cmd.args(["clean", temp.path().to_str().expect("utf8 path")]);
        let output = cmd.assert().success().get_output().stdout.clone();
        let summary: Value = serde_json::from_slice(&output)?;
        assert_eq!(summary["found"], 2);
    }
    Ok(())
}

#[test]
fn config_columns_missing_from_table_are_skipped() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let data = temp.path().join("data");
    seed_session(&data)?;
    let config = temp.path().join("clean.toml");
    fs::write(
        &config,
        "[clean]\nmultiplier = 3.0\ncolumns = [\"Left Pupil Dilation\", \"Gaze X\"]\n",
    )?;

    let mut cmd = cargo_bin_cmd!("nback");
    cmd.args([
        "clean",
        data.to_str().expect("utf8 path"),
        "--config",
        config.to_str().expect("utf8 path"),
        "--jobs",
        "1",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: Value = serde_json::from_slice(&output)?;
    let file = &summary["files"][0];
    assert_eq!(file["status"], "cleaned");
    assert_eq!(file["channels"].as_array().map(Vec::len), Some(1));
    assert_eq!(file["channels"][0]["column"], "Left Pupil Dilation");
    assert_eq!(file["skipped"][0]["MissingColumn"], "Gaze X");

    let cleaned = EyeTable::read(&data.join("P01_20240307_090501/trial_1/eye_data_clean.csv"))?;
    // right channel untouched, including its blank cell
    assert_eq!(&cleaned.rows[5][4], "");
    assert_close(cleaned.rows[5][3].parse::<f64>()?, 3.15, 1e-6);
    Ok(())
}

#[test]
fn clean_rejects_missing_root() {
    let temp = tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("nback");
    cmd.args([
        "clean",
        temp.path().join("absent").to_str().expect("utf8 path"),
    ]);
    cmd.assert().failure();
}

#[test]
fn clean_eye_data_requires_a_folder() {
    let mut cmd = cargo_bin_cmd!("clean-eye-data");
    let output = cmd.assert().failure().code(2).get_output().stderr.clone();
    let stderr = String::from_utf8_lossy(&output);
    assert!(stderr.contains("Usage"));
}

#[test]
fn clean_eye_data_cleans_tree() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    seed_session(temp.path())?;
    let mut cmd = cargo_bin_cmd!("clean-eye-data");
    cmd.arg(temp.path());
    let output = cmd.assert().success().get_output().stdout.clone();
    let summary: Value = serde_json::from_slice(&output)?;
    assert_eq!(summary["found"], 2);
    assert_eq!(summary["cleaned"], 1);
    assert_eq!(summary["skipped"], 1);
    assert_eq!(summary["failed"], 0);
    assert_eq!(summary["files"][0]["status"], "cleaned");
    assert!(temp
        .path()
        .join("P01_20240307_090501/trial_1/eye_data_clean.csv")
        .exists());
    Ok(())
}
