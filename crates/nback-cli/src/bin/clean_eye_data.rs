use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;
use nback_lib::{batch::clean_tree, config::CleanConfig};
use std::path::PathBuf;

/// Clean every eye_data.csv below a participants-data folder.
#[derive(Parser)]
#[command(name = "clean-eye-data", version)]
struct Cli {
    /// Folder holding the participant sessions
    participants_data_folder: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let summary = clean_tree(&cli.participants_data_folder, &CleanConfig::default())?;
    info!(
        "cleaned {}, skipped {}, failed {} of {} file(s)",
        summary.cleaned, summary.skipped, summary.failed, summary.found
    );
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
