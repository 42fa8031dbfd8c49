//! Timer validation
//!
//! The T1 ratio may be given as a fraction or as a percentage.

use crate::ConfigError;

/// Smallest accepted T1 ratio
pub const MIN_T1: f64 = 0.10;

/// Largest accepted T1 ratio
pub const MAX_T1: f64 = 0.95;

/// Normalize a T1 value to a ratio in [`MIN_T1`], [`MAX_T1`]
///
/// Values in [1, 100] are read as percentages.
pub fn normalize_t1(value: f64) -> Result<f64, ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::T1NotFinite { value });
    }

    let ratio = if (1.0..=100.0).contains(&value) {
        value / 100.0
    } else {
        value
    };

    if ratio < MIN_T1 {
        return Err(ConfigError::T1TooSmall { value });
    }
    if ratio > MAX_T1 {
        return Err(ConfigError::T1TooLarge { value });
    }
    Ok(ratio)
}
