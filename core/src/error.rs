use thiserror::Error;

/// Rejected input on an entity constructor or setter.
///
/// The offending field is left untouched when a setter returns one of these.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than or equal to zero (got {value})")]
    InvalidArgument { field: &'static str, value: f64 },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("unknown nutrient code {0}")]
    UnknownNutrient(i32),
    #[error("unknown nutrient '{0}'")]
    UnknownNutrientName(String),
    #[error("diary entry refers to food {entry_food_id}, not food {food_id}")]
    FoodMismatch { entry_food_id: i64, food_id: i64 },
}

/// Reject negative or NaN magnitudes.
pub(crate) fn non_negative(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_nan() || value < 0.0 {
        return Err(ValidationError::InvalidArgument { field, value });
    }
    Ok(value)
}

pub(crate) fn non_negative_int(field: &'static str, value: i32) -> Result<i32, ValidationError> {
    if value < 0 {
        return Err(ValidationError::InvalidArgument {
            field,
            value: f64::from(value),
        });
    }
    Ok(value)
}

pub(crate) fn non_blank(field: &'static str, value: String) -> Result<String, ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(value)
}
