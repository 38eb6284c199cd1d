//! Graph document carried by each variant.
//!
//! The bundle does not execute graphs. It only needs enough structure to
//! resolve asset path constants, check op references, and run the export
//! pass (device clearing, default-attr stripping).

use crate::config::ExportOptions;
use crate::types::DataType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Op type of constant nodes.
pub const CONST_OP: &str = "Const";

// ============================================================================
// References
// ============================================================================

/// Reference to one output of a node, written `node:output`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TensorRef {
    /// Producing node
    pub node: String,
    /// Output index on that node
    pub output: u32,
}

impl TensorRef {
    /// Reference output `output` of `node`.
    #[must_use]
    pub fn new(node: impl Into<String>, output: u32) -> Self {
        Self {
            node: node.into(),
            output,
        }
    }

    /// Parse `node:3` or bare `node` (output 0).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        if name.is_empty() {
            return None;
        }
        match name.rsplit_once(':') {
            Some((node, idx)) if !node.is_empty() => {
                idx.parse().ok().map(|output| Self::new(node, output))
            }
            Some(_) => None,
            None => Some(Self::new(name, 0)),
        }
    }

    /// Canonical `node:output` name.
    #[must_use]
    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TensorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.output)
    }
}

/// Reference to an operation or one of its output tensors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpRef {
    /// A node, by name
    Operation(String),
    /// An output tensor of a node
    Tensor(TensorRef),
}

impl OpRef {
    /// Reference a node by name.
    #[must_use]
    pub fn op(name: impl Into<String>) -> Self {
        Self::Operation(name.into())
    }

    /// Reference a tensor.
    #[must_use]
    pub fn tensor(node: impl Into<String>, output: u32) -> Self {
        Self::Tensor(TensorRef::new(node, output))
    }

    /// Name of the node this reference points into.
    #[must_use]
    pub fn node_name(&self) -> &str {
        match self {
            Self::Operation(name) => name,
            Self::Tensor(t) => &t.node,
        }
    }

    /// True for [`OpRef::Operation`].
    #[must_use]
    pub fn is_operation(&self) -> bool {
        matches!(self, Self::Operation(_))
    }
}

impl fmt::Display for OpRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation(name) => write!(f, "op {name}"),
            Self::Tensor(t) => write!(f, "tensor {t}"),
        }
    }
}

// ============================================================================
// Attributes
// ============================================================================

/// Constant tensor literal stored in a node attribute.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConstTensor {
    /// Element type
    pub dtype: DataType,
    /// Shape (empty for scalars)
    #[serde(default)]
    pub shape: Vec<i64>,
    /// String elements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub string_val: Vec<String>,
    /// Integer elements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub int_val: Vec<i64>,
    /// Floating point elements
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "float_repr::vec")]
    pub float_val: Vec<f64>,
}

impl ConstTensor {
    /// Scalar string constant.
    #[must_use]
    pub fn scalar_string(value: impl Into<String>) -> Self {
        Self {
            dtype: DataType::String,
            shape: Vec::new(),
            string_val: vec![value.into()],
            ..Self::default()
        }
    }
}

/// Value of a node attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    /// String
    S(String),
    /// Integer
    I(i64),
    /// Float
    F(#[serde(with = "float_repr")] f64),
    /// Boolean
    B(bool),
    /// Element type
    Type(DataType),
    /// Shape
    Shape(Vec<i64>),
    /// Tensor literal
    Tensor(ConstTensor),
    /// List of values
    List(Vec<AttrValue>),
}

/// `f64` serde representation that survives text encodings.
///
/// Binary formats carry the raw IEEE value. Human-readable formats write
/// finite values as numbers and NaN / infinities as the strings `"NaN"`,
/// `"Infinity"` and `"-Infinity"`, which JSON has no literal for.
mod float_repr {
    use serde::de::{self, Deserializer, Visitor};
    use serde::ser::Serializer;
    use serde::{Deserialize, Serialize};
    use std::fmt;

    const NAN: &str = "NaN";
    const INFINITY: &str = "Infinity";
    const NEG_INFINITY: &str = "-Infinity";

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() || !serializer.is_human_readable() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str(NAN)
        } else if value.is_sign_positive() {
            serializer.serialize_str(INFINITY)
        } else {
            serializer.serialize_str(NEG_INFINITY)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        deserializer.deserialize_any(FloatVisitor)
    }

    struct FloatVisitor;

    impl Visitor<'_> for FloatVisitor {
        type Value = f64;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number, \"NaN\", \"Infinity\" or \"-Infinity\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<f64, E> {
            Ok(v)
        }

        fn visit_f32<E: de::Error>(self, v: f32) -> Result<f64, E> {
            Ok(f64::from(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<f64, E> {
            Ok(v as f64)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<f64, E> {
            match v {
                NAN => Ok(f64::NAN),
                INFINITY => Ok(f64::INFINITY),
                NEG_INFINITY => Ok(f64::NEG_INFINITY),
                other => Err(E::invalid_value(de::Unexpected::Str(other), &self)),
            }
        }
    }

    struct Repr(f64);

    impl Serialize for Repr {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serialize(&self.0, serializer)
        }
    }

    impl<'de> Deserialize<'de> for Repr {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserialize(deserializer).map(Repr)
        }
    }

    pub mod vec {
        use super::Repr;
        use serde::de::Deserializer;
        use serde::ser::{SerializeSeq, Serializer};
        use serde::Deserialize;

        pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(values.len()))?;
            for value in values {
                seq.serialize_element(&Repr(*value))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
            let reprs = Vec::<Repr>::deserialize(deserializer)?;
            Ok(reprs.into_iter().map(|r| r.0).collect())
        }
    }
}

// ============================================================================
// Nodes and op library
// ============================================================================

/// One operation in the graph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeDef {
    /// Unique node name
    pub name: String,
    /// Op type (e.g. `Const`, `MatMul`)
    pub op: String,
    /// Input tensor names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    /// Device placement, empty when unplaced
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device: String,
    /// Attributes
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrValue>,
}

impl NodeDef {
    /// Create a node with no inputs or attributes.
    #[must_use]
    pub fn new(name: impl Into<String>, op: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: op.into(),
            ..Self::default()
        }
    }

    /// Scalar string `Const` node, the shape asset paths take.
    #[must_use]
    pub fn string_constant(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, CONST_OP)
            .with_attr("dtype", AttrValue::Type(DataType::String))
            .with_attr("value", AttrValue::Tensor(ConstTensor::scalar_string(value)))
    }

    /// Add an input.
    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.inputs.push(input.into());
        self
    }

    /// Set device placement.
    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Set an attribute.
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    /// Output dtype from the `dtype` attribute, `Invalid` when absent.
    #[must_use]
    pub fn dtype(&self) -> DataType {
        match self.attrs.get("dtype") {
            Some(AttrValue::Type(t)) => *t,
            _ => DataType::Invalid,
        }
    }

    /// Tensor literal held in the `value` attribute.
    #[must_use]
    pub fn const_value(&self) -> Option<&ConstTensor> {
        match self.attrs.get("value") {
            Some(AttrValue::Tensor(t)) => Some(t),
            _ => None,
        }
    }
}

/// Registered op signature; only the attribute defaults matter here.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OpDef {
    /// Op type name
    pub name: String,
    /// Attribute name → default value
    #[serde(default)]
    pub default_attrs: BTreeMap<String, AttrValue>,
}

impl OpDef {
    /// Create an op definition without defaults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_attrs: BTreeMap::new(),
        }
    }

    /// Register a default attribute value.
    #[must_use]
    pub fn with_default(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.default_attrs.insert(key.into(), value);
        self
    }
}

// ============================================================================
// GraphDef
// ============================================================================

/// Serializable graph document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphDef {
    /// Nodes in definition order
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    /// Op type → definition
    #[serde(default)]
    pub library: BTreeMap<String, OpDef>,
    /// Well-known key → node names (e.g. the legacy init op collection)
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<String>>,
}

impl GraphDef {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node (builder style).
    #[must_use]
    pub fn with_node(mut self, node: NodeDef) -> Self {
        self.nodes.push(node);
        self
    }

    /// Register an op definition (builder style).
    #[must_use]
    pub fn with_op(mut self, op: OpDef) -> Self {
        self.library.insert(op.name.clone(), op);
        self
    }

    /// Append a node.
    pub fn add_node(&mut self, node: NodeDef) {
        self.nodes.push(node);
    }

    /// Look a node up by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&NodeDef> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// True when a node named `name` exists.
    #[must_use]
    pub fn contains_node(&self, name: &str) -> bool {
        self.node(name).is_some()
    }

    /// Entries of a collection, empty when the key is unknown.
    #[must_use]
    pub fn collection(&self, key: &str) -> &[String] {
        self.collections
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append a node name to a collection.
    pub fn add_to_collection(&mut self, key: &str, value: impl Into<String>) {
        self.collections
            .entry(key.to_string())
            .or_default()
            .push(value.into());
    }

    /// CRC32 of the nodes and op library; collections are ignored.
    ///
    /// Two requests built from the same graph share a fingerprint even after
    /// export has added collection entries to one of them.
    ///
    /// # Errors
    /// [`crate::error::BundleError::Serialization`] if the graph cannot be
    /// encoded.
    pub fn fingerprint(&self) -> crate::error::Result<u32> {
        let bytes = rmp_serde::to_vec(&(&self.nodes, &self.library))?;
        Ok(crate::format::crc32(&bytes))
    }

    /// Produce the document stored in a variant.
    ///
    /// Returns a deep copy; `self` is left as it was.
    #[must_use]
    pub fn export(&self, options: &ExportOptions) -> GraphDef {
        let mut exported = self.clone();
        if options.clear_devices {
            for node in &mut exported.nodes {
                node.device.clear();
            }
        }
        if options.strip_default_attrs {
            let library = &exported.library;
            for node in &mut exported.nodes {
                if let Some(op_def) = library.get(&node.op) {
                    node.attrs
                        .retain(|key, value| op_def.default_attrs.get(key) != Some(value));
                }
            }
        }
        exported
    }
}
