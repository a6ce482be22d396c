//! Validation helpers for DTOs.

use validator::ValidationError;

/// Characters allowed in a room code.
pub const ROOM_CODE_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Rejects strings made only of whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a room code: 4 to 12 characters from [`ROOM_CODE_ALPHABET`].
///
/// # Examples
///
/// ```ignore
/// validate_room_code("AB12CD") // Ok
/// validate_room_code("ab12cd") // Err - lowercase
/// validate_room_code("AB1")    // Err - too short
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if !(4..=12).contains(&code.len()) {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(
            format!(
                "Room code must be between 4 and 12 characters (got {})",
                code.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !code.chars().all(|c| ROOM_CODE_ALPHABET.contains(c)) {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Room code must contain only digits and uppercase letters".into());
        return Err(err);
    }

    Ok(())
}
