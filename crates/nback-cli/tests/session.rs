use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, fs, path::PathBuf};
use tempfile::tempdir;

#[test]
fn session_init_creates_trials_and_plan() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let base = temp.path().join("participants_data");
    let mut cmd = cargo_bin_cmd!("nback");
    cmd.args([
        "session-init",
        "--participant",
        "P09",
        "--base",
        base.to_str().expect("utf8 path"),
        "--levels",
        "3-1-2",
        "--seed",
        "5",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let layout: Value = serde_json::from_slice(&output)?;
    let root = PathBuf::from(layout["root"].as_str().expect("root"));
    assert!(root.starts_with(&base));
    assert!(root
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("P09_")));
    assert_eq!(layout["trials"].as_array().map(Vec::len), Some(5));

    for trial in 1..=5 {
        let dir = root.join(format!("trial_{}", trial));
        let eye = fs::read_to_string(dir.join("eye_data.csv"))?;
        assert!(eye.starts_with("Participant ID,Run ID,Timestamp,Left Pupil Dilation"));
        assert!(dir.join("main.csv").exists());
    }

    let plan: Value = serde_json::from_str(&fs::read_to_string(root.join("plan.json"))?)?;
    assert_eq!(plan["participant"], "P09");
    assert_eq!(plan["level_sequence"], "3-1-2");
    assert_eq!(plan["trials"][4]["lighting"], "Bright");
    assert_eq!(plan["trials"][0]["blocks"][0]["level"], 3);
    Ok(())
}

#[test]
fn session_init_honours_design_file() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let design = temp.path().join("design.toml");
    fs::write(&design, "trials = 2\ntargets = 4\nlevels = [1, 1, 2]\n")?;
    let mut cmd = cargo_bin_cmd!("nback");
    cmd.args([
        "session-init",
        "--participant",
        "P10",
        "--base",
        temp.path().to_str().expect("utf8 path"),
        "--design",
        design.to_str().expect("utf8 path"),
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let layout: Value = serde_json::from_slice(&output)?;
    assert_eq!(layout["trials"].as_array().map(Vec::len), Some(2));
    Ok(())
}

#[test]
fn session_init_rejects_bad_levels() {
    let temp = tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("nback");
    cmd.args([
        "session-init",
        "--participant",
        "P11",
        "--base",
        temp.path().to_str().expect("utf8 path"),
        "--levels",
        "1-2",
    ]);
    cmd.assert().failure();
}

#[test]
fn session_init_trials_flag_overrides_design() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let mut cmd = cargo_bin_cmd!("nback");
    cmd.args([
        "session-init",
        "--participant",
        "P12",
        "--base",
        temp.path().to_str().expect("utf8 path"),
        "--trials",
        "3",
        "--seed",
        "1",
    ]);
    let output = cmd.assert().success().get_output().stdout.clone();
    let layout: Value = serde_json::from_slice(&output)?;
    assert_eq!(layout["trials"].as_array().map(Vec::len), Some(3));
    Ok(())
}

#[test]
fn session_init_rejects_zero_trials() {
    let temp = tempdir().expect("tempdir");
    let mut cmd = cargo_bin_cmd!("nback");
    cmd.args([
        "session-init",
        "--participant",
        "P13",
        "--base",
        temp.path().to_str().expect("utf8 path"),
        "--trials",
        "0",
    ]);
    cmd.assert().failure();
}
