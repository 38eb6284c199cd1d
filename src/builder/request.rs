//! Arguments of one add-variant call.

use crate::config::ExportOptions;
use crate::graph::{GraphDef, OpRef, TensorRef};
use crate::types::{SignatureDef, SignatureMap};

/// Everything one add call needs: the graph, its tags and signatures, the
/// asset tensors it reads and the ops to attach.
///
/// ```
/// use aprender_bundle::builder::VariantRequest;
/// use aprender_bundle::graph::{GraphDef, NodeDef, OpRef, TensorRef};
///
/// let graph = GraphDef::new()
///     .with_node(NodeDef::string_constant("vocab", "/tmp/vocab.txt"))
///     .with_node(NodeDef::new("init", "NoOp"));
/// let request = VariantRequest::new(graph, ["serve"])
///     .with_asset(TensorRef::new("vocab", 0))
///     .with_main_op(OpRef::op("init"));
/// assert_eq!(request.tags, vec!["serve".to_string()]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct VariantRequest {
    /// Tags identifying the variant
    pub tags: Vec<String>,
    /// Graph the variant is exported from
    pub graph: GraphDef,
    /// Signatures keyed by name
    pub signatures: SignatureMap,
    /// Asset path tensors, one per use site
    pub assets: Vec<TensorRef>,
    /// Legacy init op, ignored when a main op is given
    pub legacy_init_op: Option<OpRef>,
    /// Main op
    pub main_op: Option<OpRef>,
    /// Train op, only accepted together with parameters
    pub train_op: Option<OpRef>,
    /// Graph export options
    pub options: ExportOptions,
}

impl VariantRequest {
    /// Request for `graph` tagged with `tags`.
    #[must_use]
    pub fn new<I, S>(graph: GraphDef, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            graph,
            ..Self::default()
        }
    }

    /// Add or replace one signature.
    #[must_use]
    pub fn with_signature(mut self, key: impl Into<String>, signature: SignatureDef) -> Self {
        self.signatures.insert(key.into(), signature);
        self
    }

    /// Replace the whole signature map.
    #[must_use]
    pub fn with_signatures(mut self, signatures: SignatureMap) -> Self {
        self.signatures = signatures;
        self
    }

    /// Register one asset path tensor.
    #[must_use]
    pub fn with_asset(mut self, tensor: TensorRef) -> Self {
        self.assets.push(tensor);
        self
    }

    /// Set the legacy init op.
    #[must_use]
    pub fn with_legacy_init_op(mut self, op: OpRef) -> Self {
        self.legacy_init_op = Some(op);
        self
    }

    /// Set the main op.
    #[must_use]
    pub fn with_main_op(mut self, op: OpRef) -> Self {
        self.main_op = Some(op);
        self
    }

    /// Set the train op.
    #[must_use]
    pub fn with_train_op(mut self, op: OpRef) -> Self {
        self.train_op = Some(op);
        self
    }

    /// Set graph export options.
    #[must_use]
    pub fn with_export_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }
}
