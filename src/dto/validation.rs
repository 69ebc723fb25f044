//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest tag accepted on a match filter.
pub const MAX_TAG_LENGTH: usize = 32;

/// Validates that every tag is non-blank and at most [`MAX_TAG_LENGTH`] characters.
///
/// # Examples
///
/// ```ignore
/// validate_tags(&["math".into()])     // Ok
/// validate_tags(&["  ".into()])       // Err - blank
/// ```
pub fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    for tag in tags {
        if tag.trim().is_empty() {
            let mut err = ValidationError::new("tag_blank");
            err.message = Some("Tags must not be blank".into());
            return Err(err);
        }

        let length = tag.chars().count();
        if length > MAX_TAG_LENGTH {
            let mut err = ValidationError::new("tag_length");
            err.message = Some(
                format!("Tags must be at most {MAX_TAG_LENGTH} characters (got {length})").into(),
            );
            return Err(err);
        }
    }

    Ok(())
}

/// Validates that a question offers between 2 and 6 options and that `correct_index` points at one.
pub fn validate_question_options(
    options: &[String],
    correct_index: u32,
) -> Result<(), ValidationError> {
    if !(2..=6).contains(&options.len()) {
        let mut err = ValidationError::new("options_count");
        err.message = Some(
            format!(
                "Questions must have between 2 and 6 options (got {})",
                options.len()
            )
            .into(),
        );
        return Err(err);
    }

    if correct_index as usize >= options.len() {
        let mut err = ValidationError::new("correct_index_range");
        err.message = Some("Correct index must point at an option".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tags_valid() {
        assert!(validate_tags(&[]).is_ok());
        assert!(validate_tags(&["math".into(), "history".into()]).is_ok());
        assert!(validate_tags(&["a".repeat(MAX_TAG_LENGTH)]).is_ok());
    }

    #[test]
    fn test_validate_tags_invalid() {
        assert!(validate_tags(&["".into()]).is_err());
        assert!(validate_tags(&["   ".into()]).is_err());
        assert!(validate_tags(&["a".repeat(MAX_TAG_LENGTH + 1)]).is_err());
    }

    #[test]
    fn test_validate_question_options() {
        let two = vec!["yes".to_string(), "no".to_string()];
        assert!(validate_question_options(&two, 1).is_ok());
        assert!(validate_question_options(&two, 2).is_err()); // out of range
        assert!(validate_question_options(&two[..1], 0).is_err()); // too few
        assert!(validate_question_options(&vec!["x".to_string(); 7], 0).is_err()); // too many
    }
}
