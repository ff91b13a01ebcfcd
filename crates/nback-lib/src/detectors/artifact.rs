use crate::{
    metrics::robust::{mad, median},
    signal::{interpolate_missing, Series},
};
use serde::{Deserialize, Serialize};

/// Default number of scaled MADs above the median jump that marks an artifact.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Tuning for the jump-based artifact detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Multiplier `N` in `threshold = median + N * MAD`.
    pub multiplier: f64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

/// Absolute jumps from each sample to its left and right neighbours.
///
/// Boundaries are padded with the sample itself, so the missing side of the
/// first and last sample contributes a zero jump. A jump involving a missing
/// sample is itself missing.
#[derive(Debug, Clone, PartialEq)]
pub struct JumpDifferences {
    pub prepend: Vec<Option<f64>>,
    pub append: Vec<Option<f64>>,
}

impl JumpDifferences {
    pub fn from_series(series: &Series) -> Self {
        let x = &series.values;
        let m = x.len();
        let prepend = (0..m)
            .map(|i| abs_diff(x[i], x[i.saturating_sub(1)]))
            .collect();
        let append = (0..m)
            .map(|i| abs_diff(x[(i + 1).min(m - 1)], x[i]))
            .collect();
        Self { prepend, append }
    }

    /// Larger of the two per-side jumps at each position. Positions where both
    /// sides are missing are left out.
    ///
    /// A missing sample only removes its own jumps from the statistics; it
    /// never disables the threshold for the rest of the series.
    pub fn max_per_sample(&self) -> Vec<f64> {
        self.prepend
            .iter()
            .zip(&self.append)
            .filter_map(|(p, a)| match (p, a) {
                (Some(p), Some(a)) => Some(p.max(*a)),
                (Some(v), None) | (None, Some(v)) => Some(*v),
                (None, None) => None,
            })
            .collect()
    }
}

fn abs_diff(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some((a - b).abs()),
        _ => None,
    }
}

/// `median(diffs) + multiplier * MAD(diffs)` over the per-sample max jumps.
///
/// Returns `None` when no jump could be measured.
pub fn jump_threshold(jumps: &JumpDifferences, multiplier: f64) -> Option<f64> {
    let diffs = jumps.max_per_sample();
    let med = median(&diffs)?;
    let spread = mad(&diffs)?;
    Some(med + multiplier * spread)
}

/// Flag every sample whose left jump or right jump on its own exceeds the threshold.
pub fn artifact_mask(jumps: &JumpDifferences, threshold: f64) -> Vec<bool> {
    jumps
        .prepend
        .iter()
        .zip(&jumps.append)
        .map(|(p, a)| p.is_some_and(|d| d > threshold) || a.is_some_and(|d| d > threshold))
        .collect()
}

/// What the cleaner did to one series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub samples: usize,
    pub threshold: Option<f64>,
    /// Indices flagged as artifacts.
    pub flagged: Vec<usize>,
    /// Samples that were missing before cleaning.
    pub missing_before: usize,
    /// Samples still missing afterwards; only non-zero when no valid sample exists.
    pub missing_after: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanedSeries {
    pub series: Series,
    pub report: CleaningReport,
}

/// Remove jump artifacts with the default multiplier and fill the gaps.
pub fn clean_series(series: &Series) -> Series {
    clean_series_with_config(series, &ArtifactConfig::default()).series
}

/// Remove jump artifacts and fill the gaps, returning a report alongside the
/// cleaned series. Length and order are always preserved.
pub fn clean_series_with_config(series: &Series, cfg: &ArtifactConfig) -> CleanedSeries {
    let missing_before = series.missing_count();
    if series.len() <= 1 || !series.has_valid() {
        return CleanedSeries {
            series: series.clone(),
            report: CleaningReport {
                samples: series.len(),
                threshold: None,
                flagged: Vec::new(),
                missing_before,
                missing_after: missing_before,
            },
        };
    }

    let jumps = JumpDifferences::from_series(series);
    let threshold = jump_threshold(&jumps, cfg.multiplier);
    let mask = match threshold {
        Some(ts) => artifact_mask(&jumps, ts),
        None => vec![false; series.len()],
    };

    let masked = Series::new(
        series
            .values
            .iter()
            .zip(&mask)
            .map(|(v, &flag)| if flag { None } else { *v })
            .collect(),
    );
    let cleaned = interpolate_missing(&masked);
    let flagged: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter_map(|(i, &flag)| flag.then_some(i))
        .collect();

    CleanedSeries {
        report: CleaningReport {
            samples: series.len(),
            threshold,
            flagged,
            missing_before,
            missing_after: cleaned.missing_count(),
        },
        series: cleaned,
    }
}
