use serde::{Deserialize, Serialize};

/// One channel of one recording, in acquisition order. `None` marks a missing sample.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Series {
    pub values: Vec<Option<f64>>,
}

impl Series {
    pub fn new(values: Vec<Option<f64>>) -> Self {
        Self { values }
    }

    /// Build a series from raw floats, treating NaN as missing.
    pub fn from_f64(values: &[f64]) -> Self {
        Self {
            values: values
                .iter()
                .map(|v| if v.is_nan() { None } else { Some(*v) })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    pub fn has_valid(&self) -> bool {
        self.values.iter().any(Option::is_some)
    }

    /// Values with missing samples rendered as NaN, for plotting and numeric export.
    pub fn to_f64(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.unwrap_or(f64::NAN)).collect()
    }
}

/// Fill missing samples by linear interpolation over the index axis.
///
/// Gaps at either end are filled flat from the nearest valid sample. A series
/// without any valid sample is returned unchanged.
pub fn interpolate_missing(series: &Series) -> Series {
    let valid: Vec<(usize, f64)> = series
        .values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|x| (i, x)))
        .collect();
    let (Some(&(first_idx, first_val)), Some(&(last_idx, last_val))) =
        (valid.first(), valid.last())
    else {
        return series.clone();
    };

    let mut out = series.values.clone();
    for slot in out.iter_mut().take(first_idx) {
        *slot = Some(first_val);
    }
    for slot in out.iter_mut().skip(last_idx + 1) {
        *slot = Some(last_val);
    }
    for pair in valid.windows(2) {
        let (i0, x0) = pair[0];
        let (i1, x1) = pair[1];
        let span = (i1 - i0) as f64;
        for (k, slot) in out.iter_mut().enumerate().take(i1).skip(i0 + 1) {
            let t = (k - i0) as f64 / span;
            *slot = Some(x0 + (x1 - x0) * t);
        }
    }
    Series::new(out)
}
