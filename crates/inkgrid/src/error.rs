//! Error types for InkGrid.
//!
//! Every fallible operation in the crate returns [`InkgridError`]. The enum
//! is built with `thiserror` and keeps the underlying cause reachable through
//! `std::error::Error::source`.
//!
//! # Error Handling Philosophy
//!
//! **System errors always bubble up unchanged:**
//! - `InkgridError::Io` (from `std::io::Error`) - missing files, permission errors
//!
//! **Application errors carry context:**
//! - `Parsing` - malformed index or analysis documents
//! - `Validation` - invalid configuration or index invariants (duplicate identities, bad rectangles)
//! - `Cache` - analysis cache problems (never fatal for a session)
//! - `ImageProcessing` - a bitmap failed to decode
//!
//! Degenerate inputs (a character with a single occurrence, an unknown page
//! size) are *not* errors. They are modelled as explicit "unavailable"
//! outcomes by the components that refuse them.
//!
//! # Example
//!
//! ```rust
//! use inkgrid::{InkgridError, Result};
//!
//! fn read_index(path: &str) -> Result<String> {
//!     // IO errors bubble up automatically via ?
//!     let content = std::fs::read_to_string(path)?;
//!
//!     if content.trim().is_empty() {
//!         return Err(InkgridError::parsing(format!("Index is empty: {}", path)));
//!     }
//!
//!     Ok(content)
//! }
//! ```
use thiserror::Error;

/// Result type alias using `InkgridError`.
pub type Result<T> = std::result::Result<T, InkgridError>;

/// Main error type for all InkGrid operations.
///
/// # Variants
///
/// - `Io` - File system and I/O errors (always bubble up)
/// - `Parsing` - Index / analysis document parsing errors
/// - `Validation` - Configuration or index invariant violations
/// - `Cache` - Analysis cache errors (non-fatal, sessions fall back to live computation)
/// - `ImageProcessing` - Bitmap decoding errors
/// - `Serialization` - JSON/TOML/YAML serialization errors
/// - `Other` - Catch-all for uncommon errors
#[derive(Debug, Error)]
pub enum InkgridError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {message}")]
    Parsing {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Image processing error: {message}")]
    ImageProcessing {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for InkgridError {
    fn from(err: serde_json::Error) -> Self {
        InkgridError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<image::ImageError> for InkgridError {
    fn from(err: image::ImageError) -> Self {
        InkgridError::ImageProcessing {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

macro_rules! error_constructor {
    ($name:ident, $variant:ident) => {
        pastey::paste! {
            #[doc = "Create a " $variant " error"]
            pub fn $name<S: Into<String>>(message: S) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: None,
                }
            }

            #[doc = "Create a " $variant " error with source"]
            pub fn [<$name _with_source>]<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
                message: S,
                source: E,
            ) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: Some(Box::new(source)),
                }
            }
        }
    };
}

impl InkgridError {
    error_constructor!(parsing, Parsing);
    error_constructor!(validation, Validation);
    error_constructor!(cache, Cache);
    error_constructor!(image_processing, ImageProcessing);
    error_constructor!(serialization, Serialization);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "index.json not found");
        let err: InkgridError = io_err.into();
        assert!(matches!(err, InkgridError::Io(_)));
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_parsing_error() {
        let err = InkgridError::parsing("files must be an array");
        assert_eq!(err.to_string(), "Parsing error: files must be an array");
    }

    #[test]
    fn test_parsing_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad data");
        let err = InkgridError::parsing_with_source("invalid index", source);
        assert_eq!(err.to_string(), "Parsing error: invalid index");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_validation_error() {
        let err = InkgridError::validation("duplicate identity 7");
        assert_eq!(err.to_string(), "Validation error: duplicate identity 7");
    }

    #[test]
    fn test_cache_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "cannot read");
        let err = InkgridError::cache_with_source("analysis unreadable", source);
        assert_eq!(err.to_string(), "Cache error: analysis unreadable");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_image_processing_error() {
        let err = InkgridError::image_processing("decode failed");
        assert_eq!(err.to_string(), "Image processing error: decode failed");
    }

    #[test]
    fn test_serde_json_error_maps_to_serialization() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: InkgridError = json_err.into();
        assert!(matches!(err, InkgridError::Serialization { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_other_error() {
        let err = InkgridError::Other("unexpected".to_string());
        assert_eq!(err.to_string(), "unexpected");
    }
}
