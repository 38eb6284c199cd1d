//! Error types for bundle assembly.
//!
//! Every add-variant failure except [`BundleError::PersistFailure`] is raised
//! before the bundle or the export directory is touched.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for bundle operations.
///
/// # Examples
///
/// ```
/// use aprender_bundle::error::BundleError;
///
/// let err = BundleError::AlreadySaved;
/// assert!(err.to_string().contains("add_variants"));
/// ```
#[derive(Error, Debug)]
pub enum BundleError {
    /// The export directory existed before the builder was constructed.
    #[error("Export directory already exists, please specify a different export directory: {0}")]
    DirectoryAlreadyExists(PathBuf),

    /// Parameters were already persisted by an earlier call.
    #[error(
        "Graph state including parameters and assets has already been saved, \
         use add_variants() instead"
    )]
    AlreadySaved,

    /// A variants-only call arrived before any parameters were persisted.
    #[error(
        "Graph state including parameters and assets has not been saved yet, \
         call add_variants_and_parameters() first"
    )]
    VariablesNotSavedYet,

    /// A `TensorInfo` in a signature is missing its encoding or dtype.
    #[error("Malformed TensorInfo '{key}' in signature '{signature}': {reason}")]
    MalformedTensorInfo {
        /// Signature name
        signature: String,
        /// Input or output key inside the signature
        key: String,
        /// What is wrong with it
        reason: String,
    },

    /// An asset reference does not resolve to a constant scalar string.
    #[error("Invalid asset reference '{reference}': {reason}")]
    InvalidAssetReference {
        /// The tensor reference as supplied
        reference: String,
        /// Why it was rejected
        reason: String,
    },

    /// The graph already records a legacy init op.
    #[error("Graph already contains a legacy init op under the collection 'legacy_init_op': {existing}")]
    DuplicateLegacyInitOp {
        /// Name of the op already recorded
        existing: String,
    },

    /// An init/main/train op reference has the wrong kind or dangles.
    #[error("Invalid {role} reference '{reference}': {reason}")]
    InvalidOpReference {
        /// Which attachment slot ("main_op", "legacy_init_op", "train_op")
        role: &'static str,
        /// The reference as supplied
        reference: String,
        /// Why it was rejected
        reason: String,
    },

    /// Parameter persistence failed; partial shards may remain on disk.
    #[error("Failed to persist parameters to {path}: {reason}")]
    PersistFailure {
        /// Destination prefix or file
        path: PathBuf,
        /// Failure description
        reason: String,
    },

    /// I/O error (asset copy, directory creation, bundle write).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or decoding of the bundle document failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A bundle file on disk is not in the expected layout.
    #[error("Invalid bundle format: {message}")]
    FormatError {
        /// Error description
        message: String,
    },

    /// CRC32 verification of a bundle file or parameter failed.
    #[error("Checksum mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    ChecksumMismatch {
        /// Stored checksum
        expected: u32,
        /// Computed checksum
        actual: u32,
    },
}

impl BundleError {
    /// Shorthand for a [`BundleError::FormatError`].
    #[must_use]
    pub fn format(message: impl Into<String>) -> Self {
        Self::FormatError {
            message: message.into(),
        }
    }

    /// Shorthand for a [`BundleError::PersistFailure`].
    #[must_use]
    pub fn persist(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::PersistFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True for the protocol-sequencing errors (wrong entry point).
    #[must_use]
    pub fn is_sequencing(&self) -> bool {
        matches!(self, Self::AlreadySaved | Self::VariablesNotSavedYet)
    }
}

impl From<serde_json::Error> for BundleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON: {err}"))
    }
}

impl From<rmp_serde::encode::Error> for BundleError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(format!("MessagePack encode: {err}"))
    }
}

impl From<rmp_serde::decode::Error> for BundleError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(format!("MessagePack decode: {err}"))
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, BundleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_exists_message_names_path() {
        let err = BundleError::DirectoryAlreadyExists(PathBuf::from("/tmp/export"));
        assert!(err.to_string().contains("/tmp/export"));
    }

    #[test]
    fn test_malformed_tensor_info_message() {
        let err = BundleError::MalformedTensorInfo {
            signature: "serving_default".to_string(),
            key: "x".to_string(),
            reason: "no encoding set".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("serving_default"));
        assert!(msg.contains("'x'"));
        assert!(msg.contains("no encoding set"));
    }

    #[test]
    fn test_sequencing_classification() {
        assert!(BundleError::AlreadySaved.is_sequencing());
        assert!(BundleError::VariablesNotSavedYet.is_sequencing());
        assert!(!BundleError::format("bad").is_sequencing());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BundleError = io.into();
        assert!(matches!(err, BundleError::Io(_)));
    }

    #[test]
    fn test_checksum_hex_format() {
        let err = BundleError::ChecksumMismatch {
            expected: 0xDEAD_BEEF,
            actual: 0x1,
        };
        assert_eq!(
            err.to_string(),
            "Checksum mismatch: expected 0xDEADBEEF, got 0x00000001"
        );
    }
}
