use validator::ValidationError;

/// Rejects text that is empty once surrounding whitespace is stripped.
pub fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_is_blank() {
        assert!(not_blank("   \t\n").is_err());
        assert!(not_blank("").is_err());
        assert!(not_blank("  hello ").is_ok());
    }
}
