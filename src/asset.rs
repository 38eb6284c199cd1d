//! Asset registration and deduplication.
//!
//! Assets arrive as string constants in the graph holding a source path. The
//! registry decides the basename each one gets inside `assets/`:
//!
//! 1. unseen basename: keep it
//! 2. same basename, same path text: reuse it
//! 3. same basename, different path, same bytes: reuse it
//! 4. same basename, different bytes: `name_1`, `name_2`, ... (an existing
//!    suffixed slot holding the same file is reused)
//!
//! The filename map lives as long as the builder and only grows. Planning
//! is side-effect free; the builder commits a plan once the call is known
//! to be valid.

use crate::constants::ASSETS_DIRECTORY;
use crate::error::{BundleError, Result};
use crate::fs::FileSystem;
use crate::graph::{GraphDef, TensorRef, CONST_OP};
use crate::types::{AssetFileDef, DataType, TensorEncoding, TensorInfo};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

/// Basename inside `assets/` → source path it was first registered from.
pub type AssetFilenameMap = BTreeMap<String, String>;

// ============================================================================
// Plan
// ============================================================================

/// Outcome of registering one call's assets, not yet applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetPlan {
    /// One entry per asset reference, duplicates included
    pub asset_file_defs: Vec<AssetFileDef>,
    /// Filename map after this call
    pub filename_map: AssetFilenameMap,
    /// Basenames used by this call
    pub used: BTreeSet<String>,
}

impl AssetPlan {
    /// True when the call registered no assets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.asset_file_defs.is_empty()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Builder-scoped dedup ledger for asset basenames.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    filename_map: AssetFilenameMap,
}

impl AssetRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current ledger.
    #[must_use]
    pub fn filename_map(&self) -> &AssetFilenameMap {
        &self.filename_map
    }

    /// Number of distinct basenames recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filename_map.len()
    }

    /// True when nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filename_map.is_empty()
    }

    /// Resolve and name every asset reference of one call.
    ///
    /// The registry itself is not modified; see [`AssetRegistry::commit`].
    ///
    /// # Errors
    /// [`BundleError::InvalidAssetReference`] for a reference that is not a
    /// scalar string constant, [`BundleError::Io`] if a content comparison
    /// cannot read a file.
    pub fn plan<F: FileSystem>(
        &self,
        fs: &F,
        graph: &GraphDef,
        assets: &[TensorRef],
    ) -> Result<AssetPlan> {
        let mut plan = AssetPlan {
            filename_map: self.filename_map.clone(),
            ..AssetPlan::default()
        };

        for tensor in assets {
            let source = asset_path_from_tensor(graph, tensor)?;
            let filename = asset_filename_to_add(fs, tensor, &source, &plan.filename_map)?;

            plan.asset_file_defs.push(AssetFileDef {
                filename: filename.clone(),
                tensor_info: TensorInfo {
                    encoding: TensorEncoding::Name(tensor.name()),
                    dtype: DataType::String,
                    shape: None,
                },
            });
            plan.filename_map
                .entry(filename.clone())
                .or_insert(source);
            plan.used.insert(filename);
        }

        if !plan.is_empty() {
            debug!(count = plan.asset_file_defs.len(), "Assets added to graph");
        }
        Ok(plan)
    }

    /// Adopt the filename map of an applied plan.
    pub fn commit(&mut self, plan: &AssetPlan) {
        self.filename_map.clone_from(&plan.filename_map);
    }
}

// ============================================================================
// Resolution and naming
// ============================================================================

fn invalid(tensor: &TensorRef, reason: impl Into<String>) -> BundleError {
    BundleError::InvalidAssetReference {
        reference: tensor.name(),
        reason: reason.into(),
    }
}

/// Source path held by an asset tensor.
///
/// # Errors
/// [`BundleError::InvalidAssetReference`] unless `tensor` is output 0 of a
/// `Const` node of dtype string holding exactly one non-empty value.
pub fn asset_path_from_tensor(graph: &GraphDef, tensor: &TensorRef) -> Result<String> {
    let node = graph
        .node(&tensor.node)
        .ok_or_else(|| invalid(tensor, "no such node in graph"))?;
    if node.op != CONST_OP {
        return Err(invalid(
            tensor,
            format!("asset path tensor must be a constant, found op '{}'", node.op),
        ));
    }
    if tensor.output != 0 {
        return Err(invalid(tensor, "constants have a single output"));
    }
    if node.dtype() != DataType::String {
        return Err(invalid(
            tensor,
            format!("asset path tensor must be of dtype string, found {}", node.dtype()),
        ));
    }
    let value = node
        .const_value()
        .ok_or_else(|| invalid(tensor, "constant has no value"))?;
    match value.string_val.as_slice() {
        [path] if !path.is_empty() => Ok(path.clone()),
        [_] => Err(invalid(tensor, "asset path is empty")),
        other => Err(invalid(
            tensor,
            format!("asset path tensor must be a scalar, found {} values", other.len()),
        )),
    }
}

/// Basename to store `source` under, given the ledger so far.
///
/// # Errors
/// [`BundleError::InvalidAssetReference`] if the path has no final
/// component, [`BundleError::Io`] if a comparison cannot read a file.
pub fn asset_filename_to_add<F: FileSystem>(
    fs: &F,
    tensor: &TensorRef,
    source: &str,
    map: &AssetFilenameMap,
) -> Result<String> {
    let basename = Path::new(source)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| invalid(tensor, format!("path '{source}' has no file name")))?;

    match map.get(&basename) {
        None => Ok(basename),
        Some(recorded) if recorded == source => Ok(basename),
        Some(recorded) => {
            if fs.files_equal(Path::new(source), Path::new(recorded))? {
                debug!(%basename, source, recorded = %recorded, "Asset content matches, reusing basename");
                return Ok(basename);
            }
            unique_asset_filename(fs, &basename, source, map)
        }
    }
}

/// First `basename_N` slot that is free or already holds this file.
///
/// # Errors
/// [`BundleError::Io`] if a comparison cannot read a file.
pub fn unique_asset_filename<F: FileSystem>(
    fs: &F,
    basename: &str,
    source: &str,
    map: &AssetFilenameMap,
) -> Result<String> {
    let mut i = 1usize;
    loop {
        let candidate = format!("{basename}_{i}");
        match map.get(&candidate) {
            None => {
                debug!(%basename, %candidate, source, "Asset basename collision, using suffixed name");
                return Ok(candidate);
            }
            Some(recorded) if recorded == source => return Ok(candidate),
            Some(recorded) if fs.files_equal(Path::new(source), Path::new(recorded))? => {
                return Ok(candidate)
            }
            Some(_) => i += 1,
        }
    }
}

// ============================================================================
// Materialization
// ============================================================================

/// Copy the plan's assets into `<export_dir>/assets/`.
///
/// Files already present at the destination are left alone, so repeated
/// calls and re-runs against the same directory copy each basename once.
/// Returns the number of files copied.
///
/// # Errors
/// [`BundleError::Io`] if the directory cannot be created or a copy fails.
pub fn materialize_assets<F: FileSystem>(
    fs: &F,
    export_dir: &Path,
    plan: &AssetPlan,
) -> Result<usize> {
    if plan.used.is_empty() {
        info!("No assets to write.");
        return Ok(0);
    }

    let assets_dir = export_dir.join(ASSETS_DIRECTORY);
    if !fs.exists(&assets_dir) {
        fs.create_dir_all(&assets_dir)?;
    }

    let mut copied = 0;
    for basename in &plan.used {
        let Some(source) = plan.filename_map.get(basename) else {
            continue;
        };
        let destination = assets_dir.join(basename);
        if !fs.exists(&destination) {
            fs.copy(Path::new(source), &destination)?;
            copied += 1;
        }
    }

    info!(dir = %assets_dir.display(), copied, "Assets written");
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFileSystem;
    use crate::graph::{AttrValue, ConstTensor, NodeDef};
    use std::fs;
    use tempfile::TempDir;

    fn graph_with(paths: &[(&str, &str)]) -> GraphDef {
        let mut graph = GraphDef::new();
        for (node, path) in paths {
            graph.add_node(NodeDef::string_constant(*node, *path));
        }
        graph
    }

    fn write(dir: &TempDir, rel: &str, contents: &str) -> String {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, contents).expect("write");
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_path_from_tensor() {
        let graph = graph_with(&[("vocab", "/data/vocab.txt")]);
        let path = asset_path_from_tensor(&graph, &TensorRef::new("vocab", 0)).expect("path");
        assert_eq!(path, "/data/vocab.txt");
    }

    #[test]
    fn test_path_from_non_const_rejected() {
        let graph = GraphDef::new().with_node(NodeDef::new("x", "Placeholder"));
        let err = asset_path_from_tensor(&graph, &TensorRef::new("x", 0)).unwrap_err();
        assert!(matches!(err, BundleError::InvalidAssetReference { .. }));
    }

    #[test]
    fn test_path_from_missing_node_rejected() {
        let err = asset_path_from_tensor(&GraphDef::new(), &TensorRef::new("nope", 0)).unwrap_err();
        assert!(err.to_string().contains("no such node"));
    }

    #[test]
    fn test_path_from_non_string_rejected() {
        let node = NodeDef::new("n", CONST_OP)
            .with_attr("dtype", AttrValue::Type(DataType::Int32))
            .with_attr(
                "value",
                AttrValue::Tensor(ConstTensor {
                    dtype: DataType::Int32,
                    int_val: vec![1],
                    ..ConstTensor::default()
                }),
            );
        let graph = GraphDef::new().with_node(node);
        let err = asset_path_from_tensor(&graph, &TensorRef::new("n", 0)).unwrap_err();
        assert!(err.to_string().contains("dtype string"));
    }

    #[test]
    fn test_path_from_vector_rejected() {
        let node = NodeDef::new("n", CONST_OP)
            .with_attr("dtype", AttrValue::Type(DataType::String))
            .with_attr(
                "value",
                AttrValue::Tensor(ConstTensor {
                    dtype: DataType::String,
                    shape: vec![2],
                    string_val: vec!["a".into(), "b".into()],
                    ..ConstTensor::default()
                }),
            );
        let graph = GraphDef::new().with_node(node);
        let err = asset_path_from_tensor(&graph, &TensorRef::new("n", 0)).unwrap_err();
        assert!(err.to_string().contains("scalar"));
    }

    #[test]
    fn test_path_from_second_output_rejected() {
        let graph = graph_with(&[("vocab", "/data/vocab.txt")]);
        assert!(asset_path_from_tensor(&graph, &TensorRef::new("vocab", 1)).is_err());
    }

    #[test]
    fn test_same_path_twice_reuses_basename() {
        let dir = TempDir::new().expect("tempdir");
        let p = write(&dir, "a/vocab.txt", "abc");
        let graph = graph_with(&[("v1", p.as_str()), ("v2", p.as_str())]);

        let plan = AssetRegistry::new()
            .plan(
                &LocalFileSystem,
                &graph,
                &[TensorRef::new("v1", 0), TensorRef::new("v2", 0)],
            )
            .expect("plan");

        assert_eq!(plan.asset_file_defs.len(), 2);
        assert_eq!(plan.asset_file_defs[0].filename, "vocab.txt");
        assert_eq!(plan.asset_file_defs[1].filename, "vocab.txt");
        assert_eq!(plan.filename_map.len(), 1);
    }

    #[test]
    fn test_different_content_gets_suffix() {
        let dir = TempDir::new().expect("tempdir");
        let p1 = write(&dir, "a/vocab.txt", "abc");
        let p2 = write(&dir, "b/vocab.txt", "xyz");
        let graph = graph_with(&[("v1", p1.as_str()), ("v2", p2.as_str())]);

        let plan = AssetRegistry::new()
            .plan(
                &LocalFileSystem,
                &graph,
                &[TensorRef::new("v1", 0), TensorRef::new("v2", 0)],
            )
            .expect("plan");

        assert_eq!(plan.asset_file_defs[0].filename, "vocab.txt");
        assert_eq!(plan.asset_file_defs[1].filename, "vocab.txt_1");
        assert_eq!(plan.filename_map.get("vocab.txt_1"), Some(&p2));
        assert_eq!(
            plan.asset_file_defs[1].tensor_info.encoding,
            TensorEncoding::Name("v2:0".to_string())
        );
    }

    #[test]
    fn test_same_content_different_path_reuses_basename() {
        let dir = TempDir::new().expect("tempdir");
        let p1 = write(&dir, "a/vocab.txt", "same");
        let p2 = write(&dir, "b/vocab.txt", "same");
        let graph = graph_with(&[("v1", p1.as_str()), ("v2", p2.as_str())]);

        let plan = AssetRegistry::new()
            .plan(
                &LocalFileSystem,
                &graph,
                &[TensorRef::new("v1", 0), TensorRef::new("v2", 0)],
            )
            .expect("plan");

        assert_eq!(plan.used.len(), 1);
        assert_eq!(plan.asset_file_defs.len(), 2);
        assert_eq!(plan.filename_map.get("vocab.txt"), Some(&p1));
    }

    #[test]
    fn test_third_spelling_of_suffixed_file_reuses_suffix() {
        let dir = TempDir::new().expect("tempdir");
        let p1 = write(&dir, "a/vocab.txt", "one");
        let p2 = write(&dir, "b/vocab.txt", "two");
        let p3 = write(&dir, "c/vocab.txt", "two");
        let graph = graph_with(&[("v1", p1.as_str()), ("v2", p2.as_str()), ("v3", p3.as_str())]);

        let plan = AssetRegistry::new()
            .plan(
                &LocalFileSystem,
                &graph,
                &[
                    TensorRef::new("v1", 0),
                    TensorRef::new("v2", 0),
                    TensorRef::new("v3", 0),
                ],
            )
            .expect("plan");

        let names: Vec<_> = plan.asset_file_defs.iter().map(|a| a.filename.as_str()).collect();
        assert_eq!(names, ["vocab.txt", "vocab.txt_1", "vocab.txt_1"]);
    }

    #[test]
    fn test_plan_does_not_touch_registry_until_commit() {
        let dir = TempDir::new().expect("tempdir");
        let p = write(&dir, "vocab.txt", "abc");
        let graph = graph_with(&[("v", p.as_str())]);
        let mut registry = AssetRegistry::new();

        let plan = registry
            .plan(&LocalFileSystem, &graph, &[TensorRef::new("v", 0)])
            .expect("plan");
        assert!(registry.is_empty());

        registry.commit(&plan);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_path_without_file_name_rejected() {
        let graph = graph_with(&[("v", "/")]);
        let err = AssetRegistry::new()
            .plan(&LocalFileSystem, &graph, &[TensorRef::new("v", 0)])
            .unwrap_err();
        assert!(err.to_string().contains("no file name"));
    }

    #[test]
    fn test_materialize_copies_once() {
        let src = TempDir::new().expect("tempdir");
        let export = TempDir::new().expect("tempdir");
        let p = write(&src, "vocab.txt", "abc");
        let graph = graph_with(&[("v", p.as_str())]);
        let plan = AssetRegistry::new()
            .plan(&LocalFileSystem, &graph, &[TensorRef::new("v", 0)])
            .expect("plan");

        assert_eq!(materialize_assets(&LocalFileSystem, export.path(), &plan).expect("copy"), 1);
        assert_eq!(materialize_assets(&LocalFileSystem, export.path(), &plan).expect("copy"), 0);
        let copied = fs::read_to_string(export.path().join("assets/vocab.txt")).expect("read");
        assert_eq!(copied, "abc");
    }

    #[test]
    fn test_materialize_empty_plan_creates_nothing() {
        let export = TempDir::new().expect("tempdir");
        let copied =
            materialize_assets(&LocalFileSystem, export.path(), &AssetPlan::default()).expect("noop");
        assert_eq!(copied, 0);
        assert!(!export.path().join(ASSETS_DIRECTORY).exists());
    }
}
