//! Common validation utilities for family-related input.

use validator::ValidationError;

/// Length of a family alias (join code).
pub const ALIAS_LENGTH: usize = 6;

/// Maximum length of a family name.
pub const MAX_FAMILY_NAME_LENGTH: usize = 60;

/// Maximum length of a join-request message.
pub const MAX_JOIN_MESSAGE_LENGTH: usize = 300;

lazy_static::lazy_static! {
    static ref ALIAS_REGEX: regex::Regex =
        regex::Regex::new(r"^[A-Z0-9]{6}$").unwrap();
}

/// Validates a family alias: exactly six uppercase alphanumeric characters.
pub fn validate_alias(alias: &str) -> Result<(), ValidationError> {
    if ALIAS_REGEX.is_match(alias) {
        Ok(())
    } else {
        let mut err = ValidationError::new("alias_format");
        err.message = Some("Alias must be 6 uppercase letters or digits".into());
        Err(err)
    }
}

/// Validates a family name: non-blank, bounded length.
pub fn validate_family_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("name_blank");
        err.message = Some("Family name must not be blank".into());
        return Err(err);
    }
    if trimmed.chars().count() > MAX_FAMILY_NAME_LENGTH {
        let mut err = ValidationError::new("name_length");
        err.message = Some("Family name must be at most 60 characters".into());
        return Err(err);
    }
    Ok(())
}

/// Validates an optional join-request message length.
pub fn validate_join_message(message: &str) -> Result<(), ValidationError> {
    if message.chars().count() > MAX_JOIN_MESSAGE_LENGTH {
        let mut err = ValidationError::new("message_length");
        err.message = Some("Message must be at most 300 characters".into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_alias_accepts_uppercase_alphanumeric() {
        assert!(validate_alias("ABC123").is_ok());
        assert!(validate_alias("ZZZZZZ").is_ok());
        assert!(validate_alias("000000").is_ok());
    }

    #[test]
    fn test_validate_alias_rejects_bad_input() {
        assert!(validate_alias("abc123").is_err()); // lowercase
        assert!(validate_alias("ABC12").is_err()); // too short
        assert!(validate_alias("ABC1234").is_err()); // too long
        assert!(validate_alias("ABC-12").is_err()); // punctuation
        assert!(validate_alias("").is_err());
    }

    #[test]
    fn test_validate_family_name() {
        assert!(validate_family_name("Smith Family").is_ok());
        assert!(validate_family_name("  padded  ").is_ok());
        assert!(validate_family_name("").is_err());
        assert!(validate_family_name("   ").is_err());
        assert!(validate_family_name(&"x".repeat(61)).is_err());
        assert!(validate_family_name(&"x".repeat(60)).is_ok());
    }

    #[test]
    fn test_validate_join_message() {
        assert!(validate_join_message("").is_ok());
        assert!(validate_join_message("Hi, it's me!").is_ok());
        assert!(validate_join_message(&"m".repeat(300)).is_ok());
        assert!(validate_join_message(&"m".repeat(301)).is_err());
    }
}
