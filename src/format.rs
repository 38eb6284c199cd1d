//! Bundle file encodings.
//!
//! Two encodings of the same [`SavedBundle`] value:
//!
//! ```text
//! saved_model.pb (binary)
//! +------------------+
//! | Magic (8 bytes)  |  "APRSMDL\0"
//! +------------------+
//! | Version (4 bytes)|  u32 little-endian schema version
//! +------------------+
//! | Payload Length   |  u64 little-endian
//! +------------------+
//! | Payload          |  MessagePack, named fields
//! +------------------+
//! | CRC32 (4 bytes)  |  over every preceding byte
//! +------------------+
//!
//! saved_model.pbtxt (text)
//!   pretty-printed JSON
//! ```

use crate::constants::{
    BUNDLE_MAGIC, SAVED_MODEL_FILENAME_PB, SAVED_MODEL_FILENAME_PBTXT, SAVED_MODEL_SCHEMA_VERSION,
};
use crate::error::{BundleError, Result};
use crate::types::SavedBundle;
use std::fs;
use std::path::{Path, PathBuf};

/// CRC32 checksum (IEEE polynomial 0xEDB88320).
///
/// Used for the binary bundle footer, the per-entry checksums in the
/// parameter index and the graph fingerprint behind legacy init op checks.
pub(crate) fn crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let idx = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ TABLE[idx];
    }
    !crc
}

/// Encoding of a bundle file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BundleEncoding {
    /// Compact binary (`saved_model.pb`)
    #[default]
    Binary,
    /// Human-readable text (`saved_model.pbtxt`)
    Text,
}

impl BundleEncoding {
    /// Pick the encoding from an `as_text` flag.
    #[must_use]
    pub fn from_as_text(as_text: bool) -> Self {
        if as_text {
            Self::Text
        } else {
            Self::Binary
        }
    }

    /// Fixed filename of this encoding.
    #[must_use]
    pub fn filename(self) -> &'static str {
        match self {
            Self::Binary => SAVED_MODEL_FILENAME_PB,
            Self::Text => SAVED_MODEL_FILENAME_PBTXT,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Text => "text",
        }
    }
}

/// Binary framing helpers.
#[derive(Debug, Clone, Copy)]
pub struct BundleFormat;

impl BundleFormat {
    /// Header size: magic (8) + version (4) + `payload_len` (8) = 20 bytes.
    pub const HEADER_SIZE: usize = 20;

    /// Footer size: CRC32.
    pub const FOOTER_SIZE: usize = 4;

    /// Validate magic bytes.
    #[must_use]
    pub fn validate_magic(bytes: &[u8]) -> bool {
        bytes.get(0..8) == Some(BUNDLE_MAGIC.as_slice())
    }

    /// Encode `bundle` in `encoding`.
    ///
    /// # Errors
    /// [`BundleError::Serialization`] if the document cannot be encoded.
    pub fn encode(bundle: &SavedBundle, encoding: BundleEncoding) -> Result<Vec<u8>> {
        match encoding {
            BundleEncoding::Binary => Self::encode_binary(bundle),
            BundleEncoding::Text => Self::encode_text(bundle),
        }
    }

    /// Binary encoding.
    ///
    /// # Errors
    /// [`BundleError::Serialization`] if MessagePack encoding fails.
    pub fn encode_binary(bundle: &SavedBundle) -> Result<Vec<u8>> {
        let payload = rmp_serde::to_vec_named(bundle)?;

        let mut bytes = Vec::with_capacity(Self::HEADER_SIZE + payload.len() + Self::FOOTER_SIZE);
        bytes.extend_from_slice(BUNDLE_MAGIC);
        bytes.extend_from_slice(&bundle.saved_model_schema_version.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&payload);
        let checksum = crc32(&bytes);
        bytes.extend_from_slice(&checksum.to_le_bytes());
        Ok(bytes)
    }

    /// Text encoding.
    ///
    /// # Errors
    /// [`BundleError::Serialization`] if JSON encoding fails.
    pub fn encode_text(bundle: &SavedBundle) -> Result<Vec<u8>> {
        let mut text = serde_json::to_vec_pretty(bundle)?;
        text.push(b'\n');
        Ok(text)
    }

    /// Decode a binary bundle file.
    ///
    /// # Errors
    /// [`BundleError::FormatError`] for bad framing or an unsupported schema
    /// version, [`BundleError::ChecksumMismatch`] for corruption,
    /// [`BundleError::Serialization`] for an undecodable payload.
    pub fn decode_binary(bytes: &[u8]) -> Result<SavedBundle> {
        if bytes.len() < Self::HEADER_SIZE + Self::FOOTER_SIZE {
            return Err(BundleError::format("file too small for bundle header"));
        }
        if !Self::validate_magic(bytes) {
            return Err(BundleError::format("magic bytes mismatch"));
        }

        let (body, footer) = bytes.split_at(bytes.len() - Self::FOOTER_SIZE);
        let expected = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
        let actual = crc32(body);
        if expected != actual {
            return Err(BundleError::ChecksumMismatch { expected, actual });
        }

        let version = u32::from_le_bytes([body[8], body[9], body[10], body[11]]);
        if version > SAVED_MODEL_SCHEMA_VERSION {
            return Err(BundleError::format(format!(
                "schema version {version} is newer than supported {SAVED_MODEL_SCHEMA_VERSION}"
            )));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&body[12..20]);
        let payload_len = usize::try_from(u64::from_le_bytes(len_bytes))
            .map_err(|_| BundleError::format("payload length out of range"))?;
        let payload = &body[Self::HEADER_SIZE..];
        if payload.len() != payload_len {
            return Err(BundleError::format(format!(
                "payload length mismatch: header says {payload_len}, found {}",
                payload.len()
            )));
        }

        Ok(rmp_serde::from_slice(payload)?)
    }

    /// Decode a text bundle file.
    ///
    /// # Errors
    /// [`BundleError::Serialization`] for malformed JSON.
    pub fn decode_text(bytes: &[u8]) -> Result<SavedBundle> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

// ============================================================================
// Reading bundles from disk
// ============================================================================

/// True when `dir` holds a binary or text bundle file.
#[must_use]
pub fn contains_bundle(dir: impl AsRef<Path>) -> bool {
    let dir = dir.as_ref();
    dir.join(SAVED_MODEL_FILENAME_PB).is_file() || dir.join(SAVED_MODEL_FILENAME_PBTXT).is_file()
}

/// Path of the bundle file in `dir`, preferring the binary encoding.
#[must_use]
pub fn bundle_file(dir: impl AsRef<Path>) -> Option<(PathBuf, BundleEncoding)> {
    let dir = dir.as_ref();
    [BundleEncoding::Binary, BundleEncoding::Text]
        .into_iter()
        .map(|enc| (dir.join(enc.filename()), enc))
        .find(|(path, _)| path.is_file())
}

/// Read one encoding of the bundle in `dir`.
///
/// # Errors
/// [`BundleError::Io`] if the file cannot be read, otherwise the decode errors
/// of [`BundleFormat`].
pub fn read_bundle(dir: impl AsRef<Path>, encoding: BundleEncoding) -> Result<SavedBundle> {
    let bytes = fs::read(dir.as_ref().join(encoding.filename()))?;
    match encoding {
        BundleEncoding::Binary => BundleFormat::decode_binary(&bytes),
        BundleEncoding::Text => BundleFormat::decode_text(&bytes),
    }
}

/// Read the bundle in `dir`, binary first, then text.
///
/// # Errors
/// [`BundleError::FormatError`] if neither file exists, otherwise the errors
/// of [`read_bundle`].
pub fn load_bundle(dir: impl AsRef<Path>) -> Result<SavedBundle> {
    let dir = dir.as_ref();
    let (_, encoding) = bundle_file(dir).ok_or_else(|| {
        BundleError::format(format!("no bundle file found in {}", dir.display()))
    })?;
    read_bundle(dir, encoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphDef;
    use crate::types::Variant;

    fn bundle() -> SavedBundle {
        let mut bundle = SavedBundle::new();
        let mut v = Variant::new(GraphDef::default());
        v.meta_info.tags = vec!["serve".to_string()];
        bundle.meta_graphs.push(v);
        bundle
    }

    #[test]
    fn test_crc32_known_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn test_binary_roundtrip() {
        let bytes = BundleFormat::encode_binary(&bundle()).expect("encode");
        assert!(BundleFormat::validate_magic(&bytes));
        assert_eq!(BundleFormat::decode_binary(&bytes).expect("decode"), bundle());
    }

    #[test]
    fn test_text_is_json() {
        let bytes = BundleFormat::encode_text(&bundle()).expect("encode");
        let value: serde_json::Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value["saved_model_schema_version"], 1);
        assert_eq!(value["meta_graphs"][0]["meta_info"]["tags"][0], "serve");
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let a = BundleFormat::encode_binary(&bundle()).expect("a");
        let b = BundleFormat::encode_binary(&bundle()).expect("b");
        assert_eq!(a, b);
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut bytes = BundleFormat::encode_binary(&bundle()).expect("encode");
        bytes[0] = b'X';
        assert!(matches!(
            BundleFormat::decode_binary(&bytes),
            Err(BundleError::FormatError { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_corruption() {
        let mut bytes = BundleFormat::encode_binary(&bundle()).expect("encode");
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0x55;
        assert!(matches!(
            BundleFormat::decode_binary(&bytes),
            Err(BundleError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_truncated() {
        assert!(BundleFormat::decode_binary(b"APRSMDL\0").is_err());
    }

    #[test]
    fn test_encoding_filenames() {
        assert_eq!(BundleEncoding::from_as_text(false).filename(), "saved_model.pb");
        assert_eq!(BundleEncoding::from_as_text(true).filename(), "saved_model.pbtxt");
    }

    #[test]
    fn test_load_bundle_missing() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        assert!(!contains_bundle(dir.path()));
        assert!(load_bundle(dir.path()).is_err());
    }
}
