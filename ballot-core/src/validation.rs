//! Form checks applied before a write leaves the client.

use crate::error::BallotError;

pub const POLL_TITLE_MIN: usize = 3;
pub const POLL_TITLE_MAX: usize = 100;
pub const CANDIDATE_NAME_MIN: usize = 1;
pub const CANDIDATE_NAME_MAX: usize = 50;

/// Returns the trimmed title, or the reason it cannot be used.
pub fn validate_poll_title(title: &str) -> Result<&str, BallotError> {
    let title = title.trim();
    check_length("title", title, POLL_TITLE_MIN, POLL_TITLE_MAX)?;
    if !title.chars().all(is_title_char) {
        return Err(BallotError::validation(
            "title",
            "contains invalid characters",
        ));
    }
    Ok(title)
}

/// Returns the trimmed candidate name, or the reason it cannot be used.
pub fn validate_candidate_name(name: &str) -> Result<&str, BallotError> {
    let name = name.trim();
    check_length("name", name, CANDIDATE_NAME_MIN, CANDIDATE_NAME_MAX)?;
    if !name.chars().all(is_name_char) {
        return Err(BallotError::validation("name", "contains invalid characters"));
    }
    Ok(name)
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), BallotError> {
    let len = value.chars().count();
    if len == 0 {
        return Err(BallotError::validation(field, "is required"));
    }
    if len < min {
        return Err(BallotError::validation(
            field,
            format!("must be at least {min} characters"),
        ));
    }
    if len > max {
        return Err(BallotError::validation(
            field,
            format!("must be no more than {max} characters"),
        ));
    }
    Ok(())
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, '-' | '_' | '.')
}

fn is_title_char(c: char) -> bool {
    is_name_char(c) || matches!(c, ',' | '!' | '?' | '(' | ')')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_of(err: BallotError) -> String {
        match err {
            BallotError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn title_is_trimmed_before_length_check() {
        assert_eq!(validate_poll_title("  Favorite Color  ").unwrap(), "Favorite Color");
        assert_eq!(field_of(validate_poll_title("  ab  ").unwrap_err()), "title");
        assert!(validate_poll_title("abc").is_ok());
    }

    #[test]
    fn title_bounds() {
        assert!(validate_poll_title(&"a".repeat(100)).is_ok());
        assert!(validate_poll_title(&"a".repeat(101)).is_err());
        assert!(validate_poll_title("   ").is_err());
    }

    #[test]
    fn title_rejects_unexpected_characters() {
        assert!(validate_poll_title("Lunch (Friday)?").is_ok());
        assert!(validate_poll_title("Lunch <script>").is_err());
    }

    #[test]
    fn candidate_name_rules() {
        assert_eq!(validate_candidate_name(" Red ").unwrap(), "Red");
        assert!(validate_candidate_name("A").is_ok());
        assert!(validate_candidate_name(&"x".repeat(50)).is_ok());
        assert_eq!(field_of(validate_candidate_name(&"x".repeat(51)).unwrap_err()), "name");
        assert!(validate_candidate_name("").is_err());
        assert!(validate_candidate_name("Red, Blue").is_err());
    }
}
