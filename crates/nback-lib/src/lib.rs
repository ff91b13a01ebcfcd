pub mod batch;
pub mod config;
pub mod detectors;
pub mod error;
pub mod io;
pub mod metrics;
pub mod plot;
pub mod recording;
pub mod signal;

pub use detectors::artifact::{clean_series, clean_series_with_config, ArtifactConfig};
pub use error::{CleanError, SkipReason};
pub use signal::*;
