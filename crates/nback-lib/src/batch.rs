use crate::{
    config::CleanConfig,
    detectors::artifact::{clean_series_with_config, CleaningReport},
    error::{CleanError, Result, SkipReason},
    io::eye::EyeTable,
};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Cleaning result for one channel of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelOutcome {
    pub column: String,
    pub report: CleaningReport,
}

/// Outcome of cleaning every configured channel of a table in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableOutcome {
    pub channels: Vec<ChannelOutcome>,
    pub skipped: Vec<SkipReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Cleaned {
        output: PathBuf,
        #[serde(flatten)]
        table: TableOutcome,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub input: PathBuf,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub found: usize,
    pub cleaned: usize,
    pub skipped: usize,
    pub failed: usize,
    pub files: Vec<FileReport>,
}

impl BatchSummary {
    fn from_reports(files: Vec<FileReport>) -> Self {
        let mut summary = Self {
            found: files.len(),
            ..Self::default()
        };
        for report in &files {
            match report.outcome {
                FileOutcome::Cleaned { .. } => summary.cleaned += 1,
                FileOutcome::Skipped { .. } => summary.skipped += 1,
                FileOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        summary.files = files;
        summary
    }
}

/// `dir/eye_data.csv` -> `dir/eye_data_clean.csv`.
pub fn output_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    input.with_file_name(name)
}

/// Recursively collect files called `file_name` below `root`, sorted by path.
///
/// Symlinked directories are not followed. Unreadable subdirectories and entries are
/// logged and skipped; an unreadable root is an error.
pub fn discover(root: &Path, file_name: &str) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(CleanError::NotADirectory(root.to_path_buf()));
    }
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if dir == root => return Err(CleanError::io(&dir, e)),
            Err(e) => {
                warn!("cannot read directory {}: {}", dir.display(), e);
                continue;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("cannot read entry in {}: {}", dir.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            let kind = match entry.file_type() {
                Ok(kind) => kind,
                Err(e) => {
                    warn!("cannot stat {}: {}", path.display(), e);
                    continue;
                }
            };
            if kind.is_dir() {
                pending.push(path);
            } else if entry.file_name() == file_name {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Clean every configured channel of a table in place. Absent columns are
/// logged and reported, never fatal.
pub fn clean_table(table: &mut EyeTable, cfg: &CleanConfig) -> Result<TableOutcome> {
    let artifact = cfg.artifact();
    let mut outcome = TableOutcome::default();
    for column in &cfg.columns {
        let Some(channel) = table.channel(column) else {
            outcome
                .skipped
                .push(SkipReason::MissingColumn(column.clone()));
            continue;
        };
        let cleaned = clean_series_with_config(&table.series(&channel), &artifact);
        table.replace_series(&channel, &cleaned.series)?;
        debug!(
            "{}: threshold {:?}, {} of {} samples flagged",
            column,
            cleaned.report.threshold,
            cleaned.report.flagged.len(),
            cleaned.report.samples
        );
        outcome.channels.push(ChannelOutcome {
            column: column.clone(),
            report: cleaned.report,
        });
    }
    Ok(outcome)
}

/// Read, clean and write one recording.
///
/// Returns `Skipped` for a table without samples; the output file is only
/// written when the table has samples.
pub fn clean_file(input: &Path, cfg: &CleanConfig) -> Result<FileOutcome> {
    let mut table = EyeTable::read(input)?;
    if table.is_empty() {
        warn!("skipping empty file: {}", input.display());
        return Ok(FileOutcome::Skipped {
            reason: SkipReason::EmptyTable,
        });
    }
    let outcome = clean_table(&mut table, cfg)?;
    for reason in &outcome.skipped {
        warn!("{} in {}, skipping that column", reason, input.display());
    }
    let output = output_path(input, &cfg.suffix);
    table.write(&output)?;
    info!("cleaned {}", input.display());
    Ok(FileOutcome::Cleaned {
        output,
        table: outcome,
    })
}

fn report_file(input: PathBuf, cfg: &CleanConfig) -> FileReport {
    let outcome = match clean_file(&input, cfg) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("failed to clean {}: {}", input.display(), e);
            FileOutcome::Failed {
                error: e.to_string(),
            }
        }
    };
    FileReport { input, outcome }
}

/// Clean a list of recordings in parallel. Reports keep the input order.
pub fn clean_files(files: Vec<PathBuf>, cfg: &CleanConfig) -> Result<BatchSummary> {
    cfg.validate()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.jobs)
        .build()
        .map_err(|e| CleanError::WorkerPool(e.to_string()))?;
    let reports: Vec<FileReport> = pool.install(|| {
        files
            .into_par_iter()
            .map(|input| report_file(input, cfg))
            .collect()
    });
    Ok(BatchSummary::from_reports(reports))
}

/// Discover and clean every recording below `root`.
pub fn clean_tree(root: &Path, cfg: &CleanConfig) -> Result<BatchSummary> {
    cfg.validate()?;
    let files = discover(root, &cfg.file_name)?;
    info!("found {} {} file(s)", files.len(), cfg.file_name);
    for path in &files {
        info!("    {}", path.display());
    }
    clean_files(files, cfg)
}
