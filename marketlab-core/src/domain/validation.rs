//! Order validation outcome — a value, not an error.

use serde::{Deserialize, Serialize};

/// Result of running an order through the trading-rules validator.
///
/// All rule violations are accumulated; the caller gets the complete list
/// rather than the first failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.is_valid = false;
    }

    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// All errors joined with newlines, for logs and rejection records.
    pub fn error_message(&self) -> String {
        self.errors.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_errors() {
        let mut result = ValidationResult::valid();
        assert!(result.is_valid);
        result.add_error("suspended");
        result.add_error("insufficient cash");
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.error_message(), "suspended\ninsufficient cash");
    }

    #[test]
    fn warnings_do_not_invalidate() {
        let mut result = ValidationResult::valid();
        result.add_warning("near limit up");
        assert!(result.is_valid);
        assert_eq!(result.warnings.len(), 1);
    }
}
