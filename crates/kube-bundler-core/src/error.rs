//! Error types for manifest composition and bundle assembly

use thiserror::Error;

/// Errors surfaced by the composer, the aggregator and the bundle assembler
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BundleError {
    /// A required parameter is missing or empty
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The blueprint is malformed or a placeholder could not be resolved
    #[error("Manifest composition failed: {0}")]
    ManifestComposition(String),

    /// A named resource does not resolve under its folder
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// The archive could not be built
    #[error("Bundle write failed: {0}")]
    BundleWrite(String),
}

impl BundleError {
    /// Convert the error to an HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            BundleError::InvalidParameter(_) => 400,
            BundleError::ResourceNotFound(_) => 404,
            BundleError::ManifestComposition(_) => 422,
            BundleError::BundleWrite(_) => 500,
        }
    }
}

impl From<zip::result::ZipError> for BundleError {
    fn from(err: zip::result::ZipError) -> Self {
        BundleError::BundleWrite(err.to_string())
    }
}

impl From<serde_json::Error> for BundleError {
    fn from(err: serde_json::Error) -> Self {
        BundleError::ManifestComposition(format!("invalid blueprint JSON: {}", err))
    }
}

impl From<serde_yaml::Error> for BundleError {
    fn from(err: serde_yaml::Error) -> Self {
        BundleError::ManifestComposition(format!("manifest serialization: {}", err))
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, BundleError>;
