//! Validation helpers for DTOs.

use validator::ValidationError;

/// Shortest access code accepted from clients.
pub const MIN_ACCESS_CODE_LENGTH: usize = 4;
/// Longest access code accepted from clients.
pub const MAX_ACCESS_CODE_LENGTH: usize = 12;

/// Rejects strings that are empty once surrounding whitespace is removed.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Validates the shape of an exercise access code: 4 to 12 ASCII letters or digits.
///
/// Case is not checked here; codes are upper-cased before lookup.
///
/// # Examples
///
/// ```ignore
/// validate_access_code("K7QX2M") // Ok
/// validate_access_code("k7qx2m") // Ok
/// validate_access_code("K7Q")    // Err - too short
/// validate_access_code("K7-X2M") // Err - punctuation
/// ```
pub fn validate_access_code(code: &str) -> Result<(), ValidationError> {
    let len = code.trim().len();
    if !(MIN_ACCESS_CODE_LENGTH..=MAX_ACCESS_CODE_LENGTH).contains(&len) {
        let mut err = ValidationError::new("access_code_length");
        err.message = Some(
            format!(
                "Access code must be {MIN_ACCESS_CODE_LENGTH} to {MAX_ACCESS_CODE_LENGTH} characters (got {len})"
            )
            .into(),
        );
        return Err(err);
    }

    if !code.trim().chars().all(|c| c.is_ascii_alphanumeric()) {
        let mut err = ValidationError::new("access_code_format");
        err.message = Some("Access code must contain only letters and digits".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_blank() {
        assert!(validate_not_blank("Breach detected").is_ok());
        assert!(validate_not_blank("").is_err());
        assert!(validate_not_blank("   \t").is_err());
    }

    #[test]
    fn test_validate_access_code_valid() {
        assert!(validate_access_code("K7QX2M").is_ok());
        assert!(validate_access_code("abcd").is_ok());
        assert!(validate_access_code(" ABCDEFGH2345 ").is_ok());
    }

    #[test]
    fn test_validate_access_code_invalid() {
        assert!(validate_access_code("K7Q").is_err()); // too short
        assert!(validate_access_code("ABCDEFGH23456").is_err()); // too long
        assert!(validate_access_code("K7-X2M").is_err()); // punctuation
        assert!(validate_access_code("K7 X2M").is_err()); // inner space
    }
}
