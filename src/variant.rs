//! Variant assembly: op attachment, tagging and appending.
//!
//! Nothing here validates signatures; callers run
//! [`crate::signature::validate_signature_map`] first.

use crate::constants::{ASSETS_KEY, LEGACY_INIT_OP_KEY, MAIN_OP_KEY, TRAIN_OP_KEY};
use crate::error::{BundleError, Result};
use crate::graph::{GraphDef, OpRef};
use crate::types::{AssetFileDef, SavedBundle, SaverDef, SignatureMap, Variant};

// ============================================================================
// Op attachment
// ============================================================================

/// Init, main and train ops accepted for one add call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpAttachments {
    /// Legacy init op node, only when no main op was given
    pub legacy_init_op: Option<String>,
    /// Main op node
    pub main_op: Option<String>,
    /// Train op (operation or tensor)
    pub train_op: Option<OpRef>,
}

fn require_operation(graph: &GraphDef, role: &'static str, op: &OpRef) -> Result<String> {
    let OpRef::Operation(name) = op else {
        return Err(BundleError::InvalidOpReference {
            role,
            reference: op.to_string(),
            reason: "must be an operation, not a tensor".to_string(),
        });
    };
    require_node(graph, role, op)?;
    Ok(name.clone())
}

fn require_node(graph: &GraphDef, role: &'static str, op: &OpRef) -> Result<()> {
    if graph.contains_node(op.node_name()) {
        Ok(())
    } else {
        Err(BundleError::InvalidOpReference {
            role,
            reference: op.to_string(),
            reason: "no such node in graph".to_string(),
        })
    }
}

/// Check the supplied ops against `graph` and pick the ones to record.
///
/// A main op takes precedence: when present the legacy init op is neither
/// checked nor recorded.
///
/// # Errors
/// [`BundleError::InvalidOpReference`] for a wrong-kind or dangling
/// reference, [`BundleError::DuplicateLegacyInitOp`] when the graph already
/// holds a legacy init op and another one is supplied.
pub fn resolve_op_attachments(
    graph: &GraphDef,
    legacy_init_op: Option<&OpRef>,
    main_op: Option<&OpRef>,
    train_op: Option<&OpRef>,
) -> Result<OpAttachments> {
    let mut ops = OpAttachments::default();

    if let Some(main) = main_op {
        ops.main_op = Some(require_operation(graph, "main_op", main)?);
    } else if let Some(legacy) = legacy_init_op {
        let name = require_operation(graph, "legacy_init_op", legacy)?;
        if let Some(existing) = graph.collection(LEGACY_INIT_OP_KEY).first() {
            return Err(BundleError::DuplicateLegacyInitOp {
                existing: existing.clone(),
            });
        }
        ops.legacy_init_op = Some(name);
    }

    if let Some(train) = train_op {
        require_node(graph, "train_op", train)?;
        ops.train_op = Some(train.clone());
    }

    Ok(ops)
}

/// Record accepted ops and asset uses in the graph's collections.
pub fn record_in_graph(graph: &mut GraphDef, ops: &OpAttachments, assets: &[AssetFileDef]) {
    for asset in assets {
        graph.add_to_collection(ASSETS_KEY, asset.filename.clone());
    }
    if let Some(legacy) = &ops.legacy_init_op {
        graph.add_to_collection(LEGACY_INIT_OP_KEY, legacy.clone());
    }
    if let Some(main) = &ops.main_op {
        graph.add_to_collection(MAIN_OP_KEY, main.clone());
    }
    if let Some(train) = &ops.train_op {
        let entry = match train {
            OpRef::Operation(name) => name.clone(),
            OpRef::Tensor(t) => t.name(),
        };
        graph.add_to_collection(TRAIN_OP_KEY, entry);
    }
}

// ============================================================================
// Assembly
// ============================================================================

/// Variant draft around an exported graph, before tags and signatures.
#[must_use]
pub fn draft_variant(
    graph_def: GraphDef,
    ops: OpAttachments,
    asset_file_defs: Vec<AssetFileDef>,
    stripped_default_attrs: bool,
) -> Variant {
    let mut variant = Variant::new(graph_def);
    variant.meta_info.stripped_default_attrs = stripped_default_attrs;
    variant.saver_def = Some(SaverDef::default());
    variant.asset_file_def = asset_file_defs;
    variant.legacy_init_op = ops.legacy_init_op;
    variant.main_op = ops.main_op;
    variant.train_op = ops.train_op;
    variant
}

/// Tag `variant`, attach copies of the signatures and append it.
///
/// Tags are appended as given (duplicates kept). Same-named signatures
/// overwrite earlier ones on this variant only. The bundle owns the
/// appended value outright.
pub fn tag_and_append(
    bundle: &mut SavedBundle,
    mut variant: Variant,
    tags: &[String],
    signatures: &SignatureMap,
) {
    variant.meta_info.tags.extend(tags.iter().cloned());
    for (key, signature) in signatures {
        variant.signature_def.insert(key.clone(), signature.clone());
    }
    bundle.meta_graphs.push(variant);
}
