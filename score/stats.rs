//! Summary statistics over per-repeat accuracies.

use crate::types::EvalError;

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Bessel-corrected sample standard deviation.
///
/// Undefined, and reported as an error, for fewer than two values.
pub fn sample_stdev(values: &[f64]) -> Result<f64, EvalError> {
    if values.len() < 2 {
        return Err(EvalError::UndefinedStdev {
            samples: values.len(),
        });
    }
    let centre = values.iter().sum::<f64>() / values.len() as f64;
    let squares: f64 = values.iter().map(|x| (x - centre).powi(2)).sum();
    Ok((squares / (values.len() - 1) as f64).sqrt())
}
