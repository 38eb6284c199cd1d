//! Shared parameter store.
//!
//! Parameters are written once per bundle, as fixed-width little-endian
//! blobs packed into shards, plus a JSON index:
//!
//! ```text
//! variables/
//!   variables.data-00000-of-00002   [raw bytes of params, name order]
//!   variables.data-00001-of-00002
//!   variables.index                 {"entries": {name: {dtype, shape, shard, offset, length, crc32}}}
//! ```
//!
//! A parameter is never split across shards. No "latest checkpoint" pointer
//! file is written; a bundle can be moved without it going stale.

use crate::constants::{SAVER_WRITE_VERSION, VARIABLES_INDEX_SUFFIX};
use crate::error::{BundleError, Result};
use crate::format::crc32;
use crate::fs::FileSystem;
use crate::types::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

// ============================================================================
// Parameters
// ============================================================================

/// One named parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Element type (must be fixed width)
    pub dtype: DataType,
    /// Shape; empty for scalars
    pub shape: Vec<usize>,
    /// Little-endian element bytes
    pub data: Vec<u8>,
    /// False until a value has been assigned
    pub initialized: bool,
}

impl Parameter {
    /// Parameter from raw little-endian bytes.
    #[must_use]
    pub fn from_bytes(dtype: DataType, shape: Vec<usize>, data: Vec<u8>) -> Self {
        Self {
            dtype,
            shape,
            data,
            initialized: true,
        }
    }

    /// F32 parameter.
    #[must_use]
    pub fn from_f32(shape: Vec<usize>, values: &[f32]) -> Self {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_bytes(DataType::Float, shape, data)
    }

    /// I64 parameter.
    #[must_use]
    pub fn from_i64(shape: Vec<usize>, values: &[i64]) -> Self {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::from_bytes(DataType::Int64, shape, data)
    }

    /// Declared but never assigned.
    #[must_use]
    pub fn uninitialized(dtype: DataType, shape: Vec<usize>) -> Self {
        Self {
            dtype,
            shape,
            data: Vec::new(),
            initialized: false,
        }
    }

    /// Number of elements implied by the shape, `None` on overflow.
    #[must_use]
    pub fn num_elements(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    /// Byte length implied by dtype and shape, `None` for variable width or
    /// a shape whose size overflows.
    #[must_use]
    pub fn expected_bytes(&self) -> Option<usize> {
        let size = self.dtype.size_in_bytes()?;
        self.num_elements()?.checked_mul(size)
    }

    /// Decode F32 values; `None` for other dtypes.
    #[must_use]
    pub fn to_f32(&self) -> Option<Vec<f32>> {
        if self.dtype != DataType::Float {
            return None;
        }
        Some(
            self.data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    }
}

/// Explicit set of parameters to persist, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    params: BTreeMap<String, Parameter>,
}

impl ParameterSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a parameter (builder style).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, param: Parameter) -> Self {
        self.insert(name, param);
        self
    }

    /// Add or replace a parameter.
    pub fn insert(&mut self, name: impl Into<String>, param: Parameter) {
        self.params.insert(name.into(), param);
    }

    /// Look a parameter up.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.get(name)
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterate in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Parameter)> {
        self.params.iter()
    }

    /// Total data bytes.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.params.values().map(|p| p.data.len()).sum()
    }
}

// ============================================================================
// Index
// ============================================================================

/// Location of one parameter in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterIndexEntry {
    /// Element type
    pub dtype: DataType,
    /// Shape
    pub shape: Vec<usize>,
    /// Shard number
    pub shard: usize,
    /// Byte offset inside the shard
    pub offset: u64,
    /// Byte length
    pub length: u64,
    /// CRC32 of the bytes
    pub crc32: u32,
}

/// Contents of `variables.index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterIndex {
    /// Store format version
    pub version: u32,
    /// Number of data shards
    pub num_shards: usize,
    /// Parameter name → location
    pub entries: BTreeMap<String, ParameterIndexEntry>,
}

/// Path of shard `shard` of `num_shards` under `prefix`.
#[must_use]
pub fn shard_path(prefix: &Path, shard: usize, num_shards: usize) -> PathBuf {
    suffixed(prefix, &format!(".data-{shard:05}-of-{num_shards:05}"))
}

/// Path of the index file under `prefix`.
#[must_use]
pub fn index_path(prefix: &Path) -> PathBuf {
    suffixed(prefix, &format!(".{VARIABLES_INDEX_SUFFIX}"))
}

fn suffixed(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(prefix.as_os_str());
    s.push(suffix);
    PathBuf::from(s)
}

// ============================================================================
// Store
// ============================================================================

/// Writes and reads the sharded parameter store.
///
/// The store does not guard against being invoked twice; the builder does.
#[derive(Debug, Clone, Copy)]
pub struct ParameterStore {
    max_shard_bytes: usize,
}

impl ParameterStore {
    /// Store that starts a new shard once `max_shard_bytes` would be exceeded.
    #[must_use]
    pub fn new(max_shard_bytes: usize) -> Self {
        Self {
            max_shard_bytes: max_shard_bytes.max(1),
        }
    }

    /// Write every parameter of `params` under `prefix`.
    ///
    /// All parameters are checked before the first byte is written. A write
    /// error part-way leaves the shards written so far on disk.
    ///
    /// # Errors
    /// [`BundleError::PersistFailure`] for an uninitialized or inconsistent
    /// parameter, or any shard/index write failure.
    pub fn persist<F: FileSystem>(
        &self,
        fs: &F,
        params: &ParameterSet,
        prefix: &Path,
    ) -> Result<ParameterIndex> {
        for (name, param) in params.iter() {
            check_parameter(prefix, name, param)?;
        }

        let mut shards: Vec<Vec<u8>> = vec![Vec::new()];
        let mut entries = BTreeMap::new();
        for (name, param) in params.iter() {
            let needs_new_shard = shards.last().is_some_and(|current| {
                !current.is_empty() && current.len() + param.data.len() > self.max_shard_bytes
            });
            if needs_new_shard {
                shards.push(Vec::new());
            }
            let shard = shards.len() - 1;
            let buf = &mut shards[shard];
            entries.insert(
                name.clone(),
                ParameterIndexEntry {
                    dtype: param.dtype,
                    shape: param.shape.clone(),
                    shard,
                    offset: buf.len() as u64,
                    length: param.data.len() as u64,
                    crc32: crc32(&param.data),
                },
            );
            buf.extend_from_slice(&param.data);
        }

        let num_shards = shards.len();
        for (i, bytes) in shards.iter().enumerate() {
            let path = shard_path(prefix, i, num_shards);
            fs.write_atomic(&path, bytes)
                .map_err(|e| BundleError::persist(&path, format!("shard write failed: {e}")))?;
        }

        let index = ParameterIndex {
            version: SAVER_WRITE_VERSION,
            num_shards,
            entries,
        };
        let index_file = index_path(prefix);
        let json = serde_json::to_vec_pretty(&index)
            .map_err(|e| BundleError::persist(&index_file, format!("index encoding failed: {e}")))?;
        fs.write_atomic(&index_file, &json)
            .map_err(|e| BundleError::persist(&index_file, format!("index write failed: {e}")))?;

        info!(
            prefix = %prefix.display(),
            parameters = params.len(),
            shards = num_shards,
            bytes = params.total_bytes(),
            "Parameters persisted"
        );
        Ok(index)
    }

    /// Read a store written by [`ParameterStore::persist`].
    ///
    /// # Errors
    /// [`BundleError::Io`] on read failure, [`BundleError::FormatError`] for
    /// an index that points outside its shard, [`BundleError::ChecksumMismatch`]
    /// for corrupted bytes.
    pub fn restore(prefix: &Path) -> Result<ParameterSet> {
        let index: ParameterIndex = serde_json::from_slice(&fs::read(index_path(prefix))?)?;

        let mut shards = Vec::with_capacity(index.num_shards);
        for i in 0..index.num_shards {
            shards.push(fs::read(shard_path(prefix, i, index.num_shards))?);
        }

        let mut params = ParameterSet::new();
        for (name, entry) in &index.entries {
            let shard = shards.get(entry.shard).ok_or_else(|| {
                BundleError::format(format!("parameter '{name}' refers to missing shard {}", entry.shard))
            })?;
            let start = usize::try_from(entry.offset)
                .map_err(|_| BundleError::format(format!("offset of '{name}' out of range")))?;
            let len = usize::try_from(entry.length)
                .map_err(|_| BundleError::format(format!("length of '{name}' out of range")))?;
            let bytes = start
                .checked_add(len)
                .and_then(|end| shard.get(start..end))
                .ok_or_else(|| BundleError::format(format!("parameter '{name}' exceeds its shard")))?;

            let actual = crc32(bytes);
            if actual != entry.crc32 {
                return Err(BundleError::ChecksumMismatch {
                    expected: entry.crc32,
                    actual,
                });
            }
            params.insert(
                name.clone(),
                Parameter::from_bytes(entry.dtype, entry.shape.clone(), bytes.to_vec()),
            );
        }
        Ok(params)
    }
}

fn check_parameter(prefix: &Path, name: &str, param: &Parameter) -> Result<()> {
    if !param.initialized {
        return Err(BundleError::persist(
            prefix,
            format!("parameter '{name}' is not initialized"),
        ));
    }
    let size = param.dtype.size_in_bytes().ok_or_else(|| {
        BundleError::persist(
            prefix,
            format!("parameter '{name}' has non fixed-width dtype {}", param.dtype),
        )
    })?;
    let expected = param
        .num_elements()
        .and_then(|n| n.checked_mul(size))
        .ok_or_else(|| {
            BundleError::persist(
                prefix,
                format!("parameter '{name}' shape {:?} overflows", param.shape),
            )
        })?;
    if expected != param.data.len() {
        return Err(BundleError::persist(
            prefix,
            format!(
                "parameter '{name}' holds {} bytes, dtype {} with shape {:?} needs {expected}",
                param.data.len(),
                param.dtype,
                param.shape
            ),
        ));
    }
    Ok(())
}
