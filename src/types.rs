//! Bundle data model.
//!
//! A [`SavedBundle`] is an ordered list of [`Variant`]s that share one
//! parameter store and one asset directory. Everything here derives serde so
//! the same value can be written in the binary and the text encoding.

use crate::graph::{GraphDef, OpRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ============================================================================
// Data types
// ============================================================================

/// Element type of a tensor.
///
/// [`DataType::Invalid`] is the sentinel for "not set" and is rejected by
/// signature validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Unset sentinel
    #[default]
    Invalid,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
    /// IEEE 754 half precision
    Half,
    /// Brain float 16
    BFloat16,
    /// Signed 8-bit integer
    Int8,
    /// Signed 16-bit integer
    Int16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 8-bit integer
    UInt8,
    /// Boolean
    Bool,
    /// Variable-length byte string
    String,
}

impl DataType {
    /// Bytes per element, `None` for variable-width types.
    #[must_use]
    pub fn size_in_bytes(self) -> Option<usize> {
        match self {
            Self::Float | Self::Int32 => Some(4),
            Self::Double | Self::Int64 => Some(8),
            Self::Half | Self::BFloat16 | Self::Int16 => Some(2),
            Self::Int8 | Self::UInt8 | Self::Bool => Some(1),
            Self::String | Self::Invalid => None,
        }
    }

    /// True unless this is the [`DataType::Invalid`] sentinel.
    #[must_use]
    pub fn is_valid(self) -> bool {
        self != Self::Invalid
    }

    /// Short uppercase name used in indexes and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "INVALID",
            Self::Float => "F32",
            Self::Double => "F64",
            Self::Half => "F16",
            Self::BFloat16 => "BF16",
            Self::Int8 => "I8",
            Self::Int16 => "I16",
            Self::Int32 => "I32",
            Self::Int64 => "I64",
            Self::UInt8 => "U8",
            Self::Bool => "BOOL",
            Self::String => "STRING",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// TensorInfo
// ============================================================================

/// How a signature tensor is located in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorEncoding {
    /// No encoding chosen; rejected by validation.
    #[default]
    Unset,
    /// Dense tensor addressed by its `node:output` name.
    Name(String),
    /// Sparse tensor in coordinate format, one graph tensor per component.
    CooSparse {
        /// Name of the values tensor
        values_tensor_name: String,
        /// Name of the indices tensor
        indices_tensor_name: String,
        /// Name of the dense-shape tensor
        dense_shape_tensor_name: String,
    },
}

impl TensorEncoding {
    /// True for every variant except [`TensorEncoding::Unset`].
    #[must_use]
    pub fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }
}

/// Descriptor of one signature input or output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TensorInfo {
    /// Dense name or sparse components
    pub encoding: TensorEncoding,
    /// Element type
    pub dtype: DataType,
    /// Static shape; `None` means unknown rank, `-1` an unknown dimension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<i64>>,
}

impl TensorInfo {
    /// True when nothing at all has been filled in.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ============================================================================
// SignatureDef
// ============================================================================

/// Named input/output contract of a variant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignatureDef {
    /// Input key → tensor descriptor
    pub inputs: BTreeMap<String, TensorInfo>,
    /// Output key → tensor descriptor
    pub outputs: BTreeMap<String, TensorInfo>,
    /// Method the signature implements (e.g. `aprender/serving/predict`)
    pub method_name: String,
}

/// Signature name → definition. Ordered so encodings are deterministic.
pub type SignatureMap = BTreeMap<String, SignatureDef>;

// ============================================================================
// Assets
// ============================================================================

/// One recorded use of an asset file by a graph tensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetFileDef {
    /// Basename inside the bundle's `assets/` directory
    pub filename: String,
    /// The string tensor that feeds the path into the graph
    pub tensor_info: TensorInfo,
}

// ============================================================================
// Variant (meta graph)
// ============================================================================

/// Identification block of a variant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MetaInfo {
    /// Labels used to select this variant at load time
    pub tags: Vec<String>,
    /// Whether default-valued attrs were removed from the graph on export
    pub stripped_default_attrs: bool,
    /// Version of the crate that produced the variant
    pub producer_version: String,
}

/// Where and how the shared parameters were written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaverDef {
    /// Store prefix relative to the export directory
    pub filename_prefix: String,
    /// Always true: the store is written as shards
    pub sharded: bool,
    /// Store format version
    pub version: u32,
}

impl Default for SaverDef {
    fn default() -> Self {
        Self {
            filename_prefix: crate::constants::variables_prefix(),
            sharded: true,
            version: crate::constants::SAVER_WRITE_VERSION,
        }
    }
}

/// One tagged graph definition inside a bundle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Variant {
    /// Tags and export flags
    pub meta_info: MetaInfo,
    /// Exported graph document
    pub graph_def: GraphDef,
    /// Parameter store descriptor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saver_def: Option<SaverDef>,
    /// Signature name → definition
    #[serde(default)]
    pub signature_def: SignatureMap,
    /// Every asset use site, duplicates included
    #[serde(default)]
    pub asset_file_def: Vec<AssetFileDef>,
    /// Legacy init op (only when no main op was supplied)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_init_op: Option<String>,
    /// Main op run after restore at load time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_op: Option<String>,
    /// Training op, stored but never executed on load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_op: Option<OpRef>,
}

impl Variant {
    /// Create a variant around an exported graph.
    #[must_use]
    pub fn new(graph_def: GraphDef) -> Self {
        Self {
            meta_info: MetaInfo {
                producer_version: env!("CARGO_PKG_VERSION").to_string(),
                ..MetaInfo::default()
            },
            graph_def,
            ..Self::default()
        }
    }

    /// Tags as a set, duplicates collapsed.
    #[must_use]
    pub fn tag_set(&self) -> BTreeSet<&str> {
        self.meta_info.tags.iter().map(String::as_str).collect()
    }

    /// Basenames of every asset this variant uses, deduplicated.
    #[must_use]
    pub fn asset_filenames(&self) -> BTreeSet<&str> {
        self.asset_file_def
            .iter()
            .map(|a| a.filename.as_str())
            .collect()
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// The top-level artifact: schema version plus ordered variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedBundle {
    /// Schema version, always [`crate::constants::SAVED_MODEL_SCHEMA_VERSION`]
    pub saved_model_schema_version: u32,
    /// Variants in insertion order
    pub meta_graphs: Vec<Variant>,
}

impl Default for SavedBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl SavedBundle {
    /// Create an empty bundle at the current schema version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            saved_model_schema_version: crate::constants::SAVED_MODEL_SCHEMA_VERSION,
            meta_graphs: Vec::new(),
        }
    }

    /// Number of variants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.meta_graphs.len()
    }

    /// True when no variant has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.meta_graphs.is_empty()
    }

    /// Iterate variants in insertion order.
    pub fn variants(&self) -> impl Iterator<Item = &Variant> {
        self.meta_graphs.iter()
    }

    /// First variant whose tag set equals `tags` exactly.
    #[must_use]
    pub fn variant_with_tags(&self, tags: &[&str]) -> Option<&Variant> {
        let wanted: BTreeSet<&str> = tags.iter().copied().collect();
        self.meta_graphs.iter().find(|v| v.tag_set() == wanted)
    }

    /// Tag sets of all variants, in order.
    #[must_use]
    pub fn tag_sets(&self) -> Vec<BTreeSet<&str>> {
        self.meta_graphs.iter().map(Variant::tag_set).collect()
    }
}
