/// Scale factor that makes the MAD a consistent estimator of the standard
/// deviation for normally distributed data.
pub const MAD_SCALE: f64 = 1.4826;

/// Median of the values; even-length inputs average the two middle elements.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Median absolute deviation scaled by [`MAD_SCALE`].
pub fn mad(values: &[f64]) -> Option<f64> {
    let med = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    median(&deviations).map(|m| MAD_SCALE * m)
}
