use crate::{
    detectors::artifact::{ArtifactConfig, DEFAULT_MULTIPLIER},
    error::{CleanError, Result},
    io::eye::{LEFT_PUPIL, RIGHT_PUPIL},
};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

pub const DEFAULT_FILE_NAME: &str = "eye_data.csv";
pub const DEFAULT_SUFFIX: &str = "_clean";

/// Settings for a cleaning run. Every field can be omitted from the TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanConfig {
    /// MAD multiplier for the jump threshold.
    pub multiplier: f64,
    /// Pupil channels to clean.
    pub columns: Vec<String>,
    /// Basename of the recordings to discover.
    pub file_name: String,
    /// Appended to the input stem to name the output.
    pub suffix: String,
    /// Worker threads; 0 lets rayon decide.
    pub jobs: usize,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            multiplier: DEFAULT_MULTIPLIER,
            columns: vec![LEFT_PUPIL.to_string(), RIGHT_PUPIL.to_string()],
            file_name: DEFAULT_FILE_NAME.to_string(),
            suffix: DEFAULT_SUFFIX.to_string(),
            jobs: 0,
        }
    }
}

impl CleanConfig {
    pub fn artifact(&self) -> ArtifactConfig {
        ArtifactConfig {
            multiplier: self.multiplier,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.multiplier.is_finite() || self.multiplier < 0.0 {
            return Err(CleanError::Config(format!(
                "multiplier must be a non-negative number, got {}",
                self.multiplier
            )));
        }
        if self.columns.is_empty() {
            return Err(CleanError::Config("no columns to clean".into()));
        }
        if self.file_name.trim().is_empty() {
            return Err(CleanError::Config("file_name is empty".into()));
        }
        // an empty suffix would write the output over its input
        if self.suffix.is_empty() {
            return Err(CleanError::Config("suffix is empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    clean: CleanConfig,
}

pub fn parse_config(text: &str) -> Result<CleanConfig> {
    let file: ConfigFile =
        toml::from_str(text).map_err(|e| CleanError::Config(e.to_string()))?;
    file.clean.validate()?;
    Ok(file.clean)
}

pub fn read_config(path: &Path) -> Result<CleanConfig> {
    let contents = fs::read_to_string(path).map_err(|e| CleanError::io(path, e))?;
    parse_config(&contents).map_err(|e| match e {
        CleanError::Config(msg) => CleanError::Config(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}
