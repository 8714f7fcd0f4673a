//! Input sanitization, the pipeline's first gate.

use crate::error::EngineError;

/// Validate and normalize raw input: reject null bytes, strip other control
/// characters, trim, and enforce the configured length cap. Deterministic
/// messages; no state is touched on rejection.
pub fn sanitize(input: &str, max_chars: usize) -> Result<String, EngineError> {
    if input.contains('\0') {
        return Err(EngineError::InvalidInput(
            "input contains a null byte".to_string(),
        ));
    }

    let cleaned: String = input
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let trimmed = cleaned.trim().to_string();

    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput("input is empty".to_string()));
    }
    if trimmed.chars().count() > max_chars {
        return Err(EngineError::InvalidInput(format!(
            "input exceeds {max_chars} characters"
        )));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_bytes_are_rejected_outright() {
        assert!(matches!(
            sanitize("hello\0there", 1000),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn control_characters_are_stripped_to_spaces() {
        assert_eq!(sanitize("who\x07 scored\x1b?", 1000).unwrap(), "who  scored ?");
    }

    #[test]
    fn empty_and_whitespace_inputs_are_invalid() {
        assert!(sanitize("", 1000).is_err());
        assert!(sanitize("   \t\n ", 1000).is_err());
    }

    #[test]
    fn length_cap_applies_after_trimming() {
        let padded = format!("   {}   ", "x".repeat(1000));
        assert!(sanitize(&padded, 1000).is_ok());
        let over = "x".repeat(1001);
        assert!(matches!(
            sanitize(&over, 1000),
            Err(EngineError::InvalidInput(_))
        ));
    }
}
