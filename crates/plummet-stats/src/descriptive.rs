//! Batch mean and standard deviation helpers.
//!
//! These operate on a complete slice; use [`crate::Welford`] when values
//! arrive one at a time.

/// Arithmetic mean. NaN for an empty slice.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (n denominator). `None` for an empty slice.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn population_stdev(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Sample standard deviation (n−1 denominator). `None` for fewer than two
/// values.
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn sample_stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}
