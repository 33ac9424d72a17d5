use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BranchNameError {
    #[error("branch name must not be empty")]
    Empty,
    #[error("branch name contains invalid character {0:?}")]
    InvalidCharacter(char),
    #[error("branch name must not start with '.' or '-'")]
    BadLeadingCharacter,
    #[error("branch name must not contain '..' or '//'")]
    BadSequence,
}

/// Validate a feature branch name against the canonical grammar:
/// `^[A-Za-z0-9/_.-]+$`, no leading `.` or `-`, no `..` or `//`.
pub fn validate_branch_name(name: &str) -> Result<(), BranchNameError> {
    if name.is_empty() {
        return Err(BranchNameError::Empty);
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '/' | '_' | '.' | '-')))
    {
        return Err(BranchNameError::InvalidCharacter(c));
    }
    if name.starts_with('.') || name.starts_with('-') {
        return Err(BranchNameError::BadLeadingCharacter);
    }
    if name.contains("..") || name.contains("//") {
        return Err(BranchNameError::BadSequence);
    }
    Ok(())
}

/// The auto-generated branch name for a workflow: `bugfix/gh-<issueNumber>`.
pub fn default_branch_name(issue_number: u64) -> String {
    format!("bugfix/gh-{issue_number}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_nested_names() {
        assert!(validate_branch_name("foo/bar").is_ok());
        assert!(validate_branch_name("bugfix/gh-42").is_ok());
        assert!(validate_branch_name("release_1.2.3").is_ok());
    }

    #[test]
    fn rejects_leading_dot_and_dash() {
        assert_eq!(validate_branch_name(".hidden"), Err(BranchNameError::BadLeadingCharacter));
        assert_eq!(validate_branch_name("-flag"), Err(BranchNameError::BadLeadingCharacter));
        assert_eq!(validate_branch_name("..foo"), Err(BranchNameError::BadLeadingCharacter));
    }

    #[test]
    fn rejects_bad_sequences() {
        assert_eq!(validate_branch_name("foo..bar"), Err(BranchNameError::BadSequence));
        assert_eq!(validate_branch_name("foo//bar"), Err(BranchNameError::BadSequence));
    }

    #[test]
    fn rejects_invalid_characters_and_empty() {
        assert_eq!(validate_branch_name(""), Err(BranchNameError::Empty));
        assert_eq!(
            validate_branch_name("feat branch"),
            Err(BranchNameError::InvalidCharacter(' '))
        );
        assert_eq!(
            validate_branch_name("feat~1"),
            Err(BranchNameError::InvalidCharacter('~'))
        );
    }

    #[test]
    fn default_name_shape() {
        assert_eq!(default_branch_name(42), "bugfix/gh-42");
        assert!(validate_branch_name(&default_branch_name(42)).is_ok());
    }
}
