use rust_decimal::Decimal;
use thiserror::Error;

use crate::model::Sex;

pub type Result<T> = std::result::Result<T, RangeError>;

/// Input errors raised before any store access.
///
/// Every variant names the offending descriptor by its position in the
/// submitted list so callers can point the user at the right row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("descriptor {index}: invalid age range [{age_min}, {age_max}]")]
    InvalidAgeRange {
        index: usize,
        age_min: String,
        age_max: String,
    },

    #[error(
        "descriptor {second_index} {second} overlaps descriptor {first_index} {first} for sex {sex}"
    )]
    Overlap {
        sex: Sex,
        first_index: usize,
        first: String,
        second_index: usize,
        second: String,
    },

    #[error("descriptor {index}: unrecognized sex '{raw}'")]
    InvalidSex { index: usize, raw: String },

    #[error("descriptor {index}: unrecognized age unit '{raw}'")]
    InvalidAgeUnit { index: usize, raw: String },

    #[error("descriptor {index}: field '{field}' is not a number: '{raw}'")]
    InvalidNumericValue {
        index: usize,
        field: &'static str,
        raw: String,
    },

    #[error("descriptor {index}: lower bound {lower} is greater than upper bound {upper}")]
    InvalidValueRange {
        index: usize,
        lower: Decimal,
        upper: Decimal,
    },
}

impl RangeError {
    /// Stable machine-readable code reported to callers.
    pub fn code(&self) -> &'static str {
        match self {
            RangeError::InvalidAgeRange { .. } => "INVALID_AGE_RANGE",
            RangeError::Overlap { .. } => "REFERENCE_RANGE_OVERLAP",
            RangeError::InvalidSex { .. } => "INVALID_SEX",
            RangeError::InvalidAgeUnit { .. } => "INVALID_AGE_UNIT",
            RangeError::InvalidNumericValue { .. } => "INVALID_NUMERIC_VALUE",
            RangeError::InvalidValueRange { .. } => "INVALID_VALUE_RANGE",
        }
    }

    pub fn descriptor_index(&self) -> usize {
        match self {
            RangeError::InvalidAgeRange { index, .. }
            | RangeError::InvalidSex { index, .. }
            | RangeError::InvalidAgeUnit { index, .. }
            | RangeError::InvalidNumericValue { index, .. }
            | RangeError::InvalidValueRange { index, .. } => *index,
            RangeError::Overlap { second_index, .. } => *second_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = RangeError::InvalidAgeRange {
            index: 2,
            age_min: "10".into(),
            age_max: "5".into(),
        };
        assert_eq!(err.code(), "INVALID_AGE_RANGE");
        assert_eq!(err.descriptor_index(), 2);
        assert_eq!(err.to_string(), "descriptor 2: invalid age range [10, 5]");

        let err = RangeError::Overlap {
            sex: Sex::Masculino,
            first_index: 0,
            first: "[0, 10] years".into(),
            second_index: 1,
            second: "[9, 15] years".into(),
        };
        assert_eq!(err.code(), "REFERENCE_RANGE_OVERLAP");
        assert_eq!(err.descriptor_index(), 1);
        assert!(err.to_string().contains("Masculino"));
    }
}
