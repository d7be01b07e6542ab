use std::str::FromStr;

use crate::prelude::*;

pub fn non_zero_usize(value: &str) -> Result<usize> {
    match FromStr::from_str(value)? {
        value if value >= 1 => Ok(value),
        _ => Err(anyhow!("expected a positive number")),
    }
}

/// Parses a number within `[0, 1]`.
pub fn unit_interval(value: &str) -> Result<f64> {
    match f64::from_str(value)? {
        value if (0.0..=1.0).contains(&value) => Ok(value),
        value => Err(anyhow!("{} is not within [0, 1]", value)),
    }
}

pub fn non_negative_f64(value: &str) -> Result<f64> {
    match f64::from_str(value)? {
        value if value.is_finite() && value >= 0.0 => Ok(value),
        value => Err(anyhow!("expected a non-negative number, got {}", value)),
    }
}

pub fn positive_f64(value: &str) -> Result<f64> {
    match f64::from_str(value)? {
        value if value.is_finite() && value > 0.0 => Ok(value),
        value => Err(anyhow!("expected a positive number, got {}", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_interval_ok() {
        assert_eq!(unit_interval("0").unwrap(), 0.0);
        assert_eq!(unit_interval("1").unwrap(), 1.0);
        assert!(unit_interval("1.01").is_err());
        assert!(unit_interval("-0.1").is_err());
        assert!(unit_interval("NaN").is_err());
    }

    #[test]
    fn non_zero_usize_ok() {
        assert_eq!(non_zero_usize("3").unwrap(), 3);
        assert!(non_zero_usize("0").is_err());
    }

    #[test]
    fn positive_f64_ok() {
        assert!(positive_f64("0").is_err());
        assert!(positive_f64("inf").is_err());
        assert_eq!(positive_f64("0.5").unwrap(), 0.5);
    }
}
