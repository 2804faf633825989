//! Value conversion error types
//!
//! Conversions are pure: these errors never abort a transaction and are
//! returned straight to the caller of `parse`/`convert`.

use super::Value;
use thiserror::Error;

/// Errors produced by the value codec
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    /// Source value lies outside the target type's legal range
    #[error("Value out of range for {target}: {source_text}")]
    Range {
        /// Name of the target type
        target: &'static str,
        /// Text of the offending source value
        source_text: String,
    },

    /// Source value is not exactly representable; `approximate` holds the rounded result
    #[error("Inexact conversion, rounded to {approximate}")]
    Inexact {
        /// Best-effort rounded result
        approximate: Value,
    },

    /// Text could not be interpreted as the target type
    #[error("Cannot interpret '{text}' as {target}")]
    BadString {
        /// Name of the target type
        target: &'static str,
        /// The rejected text
        text: String,
    },
}

impl ValueError {
    /// Best-effort value carried by an `Inexact` error
    pub fn approximate(&self) -> Option<&Value> {
        match self {
            ValueError::Inexact { approximate } => Some(approximate),
            _ => None,
        }
    }
}

/// Result type for value codec operations
pub type ValueResult<T> = Result<T, ValueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ValueError::Range {
            target: "char",
            source_text: "300".to_string(),
        };
        assert_eq!(err.to_string(), "Value out of range for char: 300");

        let err = ValueError::Inexact {
            approximate: Value::Int(4),
        };
        assert_eq!(err.approximate(), Some(&Value::Int(4)));
    }
}
