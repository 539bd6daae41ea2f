//! Error types for the table converter.
//!
//! Only hard input errors live here: malformed fixed-shape inputs that
//! indicate a caller or data contract violation. Heuristic non-findings and
//! injection bounds violations are reported as values, not errors.

use thiserror::Error;

/// Primary error type for the table converter.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed signature database.
    #[error("Signature parse error at line {line}, token '{token}': {message}")]
    SignatureParse {
        line: usize,
        token: String,
        message: String,
    },

    /// The memory image does not fit in the 16-bit address space.
    #[error("Memory image out of range: load address ${load_address:04X} with {length} bytes exceeds $FFFF")]
    ImageOutOfRange { load_address: u16, length: usize },

    /// The memory image holds no bytes.
    #[error("Memory image is empty")]
    EmptyImage,

    /// A source instrument is shorter than its fixed record width.
    #[error("Instrument {index} is {length} bytes, expected at least 8")]
    InstrumentTooShort { index: usize, length: usize },

    /// A table payload does not have the shape its role requires.
    #[error("Invalid {role} table: {message}")]
    InvalidTable { role: String, message: String },

    /// Failure inside one pipeline stage.
    #[error("Pipeline stage '{stage}' failed: {message}")]
    Pipeline { stage: String, message: String },
}

/// Result type alias for converter operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Extension trait for tagging an error with the pipeline stage it came from.
pub trait ResultExt<T> {
    /// Wrap any error as a [`ConvertError::Pipeline`] for `stage`.
    fn stage(self, stage: &str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn stage(self, stage: &str) -> Result<T> {
        self.map_err(|e| match e {
            ConvertError::Pipeline { .. } => e,
            other => ConvertError::Pipeline {
                stage: stage.to_string(),
                message: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConvertError::InstrumentTooShort {
            index: 3,
            length: 5,
        };
        assert!(err.to_string().contains('3'));
        assert!(err.to_string().contains('5'));
    }

    #[test]
    fn test_image_out_of_range_is_hex() {
        let err = ConvertError::ImageOutOfRange {
            load_address: 0xF000,
            length: 0x2000,
        };
        assert!(err.to_string().contains("$F000"));
    }

    #[test]
    fn test_stage_wraps_once() {
        let res: Result<()> = Err(ConvertError::EmptyImage);
        let err = res.stage("extract").stage("convert").unwrap_err();
        match err {
            ConvertError::Pipeline { stage, .. } => assert_eq!(stage, "extract"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
