//! Result type alias for Meridian
//!
//! This module provides a convenient Result type alias that uses MeridianError
//! as the error type.

use super::errors::MeridianError;

/// Result type alias for Meridian operations
///
/// This is a convenience type alias that uses `MeridianError` as the error type.
/// Use this throughout the codebase for fallible operations outside the
/// conversion core (which uses [`super::errors::ConversionResult`]).
///
/// # Examples
///
/// ```
/// use meridian::domain::result::Result;
/// use meridian::domain::errors::MeridianError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(MeridianError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, MeridianError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ConversionError;

    #[test]
    fn test_result_err() {
        let result: Result<i32> = Err(MeridianError::Validation("test error".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_conversion_error_with_question_mark() {
        fn inner() -> std::result::Result<i32, ConversionError> {
            Err(ConversionError::InvalidSchema("empty tree".to_string()))
        }

        fn outer() -> Result<i32> {
            Ok(inner()?)
        }

        assert!(matches!(outer(), Err(MeridianError::Conversion(_))));
    }
}
