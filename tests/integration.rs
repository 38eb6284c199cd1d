//! Integration tests for bundle export.
//!
//! These tests drive the builder end to end and read the result back from
//! disk the way a serving process would.

use aprender_bundle::constants::LEGACY_INIT_OP_KEY;
use aprender_bundle::params::ParameterStore;
use aprender_bundle::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn model_graph(vocab: &str) -> GraphDef {
    GraphDef::new()
        .with_node(NodeDef::new("input", "Placeholder"))
        .with_node(NodeDef::new("logits", "MatMul").with_input("input"))
        .with_node(NodeDef::new("scores", "Softmax").with_input("logits"))
        .with_node(NodeDef::new("init_tables", "NoOp"))
        .with_node(NodeDef::new("train_step", "ApplyAdam"))
        .with_node(NodeDef::string_constant("vocab_path", vocab))
}

fn classify_signature() -> SignatureDef {
    predict_signature_def(
        "inputs",
        build_tensor_info(&TensorRef::new("input", 0), DataType::Float, Some(vec![-1, 8])),
        "scores",
        build_tensor_info(&TensorRef::new("scores", 0), DataType::Float, Some(vec![-1, 3])),
    )
}

fn weights() -> ParameterSet {
    ParameterSet::new()
        .with("logits/kernel", Parameter::from_f32(vec![8, 3], &[0.25; 24]))
        .with("logits/bias", Parameter::from_f32(vec![3], &[0.0, 0.1, 0.2]))
        .with("global_step", Parameter::from_i64(vec![], &[1000]))
}

fn write_source(root: &Path, rel: &str, contents: &str) -> String {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(&path, contents).expect("write");
    path.to_string_lossy().into_owned()
}

fn setup() -> (TempDir, PathBuf, String) {
    let root = TempDir::new().expect("tempdir");
    let vocab = write_source(root.path(), "data/vocab.txt", "cat\ndog\nbird\n");
    let export = root.path().join("export").join("00001");
    (root, export, vocab)
}

#[test]
fn test_export_and_reload_workflow() {
    let (_root, export, vocab) = setup();
    let mut builder = BundleBuilder::new(&export).expect("builder");

    builder
        .add_variants_and_parameters(
            VariantRequest::new(model_graph(&vocab), ["train"])
                .with_asset(TensorRef::new("vocab_path", 0))
                .with_legacy_init_op(OpRef::op("init_tables"))
                .with_train_op(OpRef::op("train_step")),
            &weights(),
        )
        .expect("train variant");
    builder
        .add_variants(
            VariantRequest::new(model_graph(&vocab), ["serve"])
                .with_signature(DEFAULT_SERVING_SIGNATURE_KEY, classify_signature())
                .with_asset(TensorRef::new("vocab_path", 0))
                .with_export_options(ExportOptions::new().with_clear_devices(true)),
        )
        .expect("serve variant");
    builder
        .add_variants(VariantRequest::new(model_graph(&vocab), ["serve", "tpu"]))
        .expect("tpu variant");

    let path = builder.save(false).expect("save");
    assert!(path.ends_with("saved_model.pb"));
    assert!(contains_bundle(&export));

    let loaded = load_bundle(&export).expect("load");
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded.tag_sets(), builder.bundle().tag_sets());

    let serve = loaded.variant_with_tags(&["serve"]).expect("serve");
    assert_eq!(
        serve.signature_def.get(DEFAULT_SERVING_SIGNATURE_KEY),
        Some(&classify_signature())
    );
    assert_eq!(serve.asset_file_def.len(), 1);
    assert_eq!(serve.asset_file_def[0].filename, "vocab.txt");
    assert!(serve.saver_def.is_some());

    let train = loaded.variant_with_tags(&["train"]).expect("train");
    assert_eq!(train.legacy_init_op.as_deref(), Some("init_tables"));
    assert_eq!(
        train.graph_def.collection(LEGACY_INIT_OP_KEY),
        ["init_tables".to_string()]
    );
    assert_eq!(train.train_op, Some(OpRef::op("train_step")));

    assert_eq!(
        fs::read_to_string(export.join("assets/vocab.txt")).expect("asset"),
        "cat\ndog\nbird\n"
    );
    let restored = ParameterStore::restore(&export.join("variables/variables")).expect("restore");
    assert_eq!(restored, weights());
}

#[test]
fn test_text_and_binary_decode_to_same_bundle() {
    let (_root, export, vocab) = setup();
    let mut builder = BundleBuilder::new(&export).expect("builder");
    builder
        .add_variants_and_parameters(
            VariantRequest::new(model_graph(&vocab), ["serve"])
                .with_signature(DEFAULT_SERVING_SIGNATURE_KEY, classify_signature()),
            &weights(),
        )
        .expect("add");

    builder.save(false).expect("pb");
    builder.save(true).expect("pbtxt");

    let binary = aprender_bundle::format::read_bundle(&export, BundleEncoding::Binary).expect("pb");
    let text = aprender_bundle::format::read_bundle(&export, BundleEncoding::Text).expect("pbtxt");
    assert_eq!(binary, text);
}

#[test]
fn test_text_only_bundle_is_loadable() {
    let (_root, export, vocab) = setup();
    let mut builder = BundleBuilder::new(&export).expect("builder");
    builder
        .add_variants_and_parameters(VariantRequest::new(model_graph(&vocab), ["serve"]), &weights())
        .expect("add");
    builder.save(true).expect("pbtxt");

    assert!(!export.join("saved_model.pb").exists());
    let loaded = load_bundle(&export).expect("load text");
    assert_eq!(loaded.len(), 1);
}

#[test]
fn test_identical_content_under_two_paths_copied_once() {
    let (root, export, vocab) = setup();
    let copy = write_source(root.path(), "mirror/vocab.txt", "cat\ndog\nbird\n");
    let graph = model_graph(&vocab).with_node(NodeDef::string_constant("vocab_copy", copy.as_str()));

    let mut builder = BundleBuilder::new(&export).expect("builder");
    builder
        .add_variants_and_parameters(
            VariantRequest::new(graph, ["serve"])
                .with_asset(TensorRef::new("vocab_path", 0))
                .with_asset(TensorRef::new("vocab_copy", 0)),
            &weights(),
        )
        .expect("add");

    let assets: Vec<_> = fs::read_dir(export.join("assets")).expect("assets").collect();
    assert_eq!(assets.len(), 1);

    let defs = &builder.bundle().meta_graphs[0].asset_file_def;
    assert_eq!(defs.len(), 2);
    assert!(defs.iter().all(|d| d.filename == "vocab.txt"));
}

#[test]
fn test_collision_across_variants_gets_suffix() {
    let (root, export, vocab) = setup();
    let other = write_source(root.path(), "other/vocab.txt", "fish\n");

    let mut builder = BundleBuilder::new(&export).expect("builder");
    builder
        .add_variants_and_parameters(
            VariantRequest::new(model_graph(&vocab), ["train"])
                .with_asset(TensorRef::new("vocab_path", 0)),
            &weights(),
        )
        .expect("first");
    builder
        .add_variants(
            VariantRequest::new(model_graph(&other), ["serve"])
                .with_asset(TensorRef::new("vocab_path", 0)),
        )
        .expect("second");

    assert_eq!(
        fs::read_to_string(export.join("assets/vocab.txt_1")).expect("suffixed"),
        "fish\n"
    );
    let serve = builder.bundle().variant_with_tags(&["serve"]).expect("serve");
    assert_eq!(serve.asset_file_def[0].filename, "vocab.txt_1");
    assert_eq!(builder.asset_filename_map().len(), 2);
}

#[test]
fn test_sharded_parameters_roundtrip() {
    let (_root, export, vocab) = setup();
    let config = BuilderConfig::new().with_max_shard_bytes(64);
    let mut builder = BundleBuilder::with_config(&export, config).expect("builder");
    builder
        .add_variants_and_parameters(VariantRequest::new(model_graph(&vocab), ["serve"]), &weights())
        .expect("add");

    let shards: Vec<_> = fs::read_dir(export.join("variables"))
        .expect("variables")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".data-"))
        .collect();
    assert!(shards.len() > 1);
    assert!(!export.join("variables/checkpoint").exists());

    let restored = ParameterStore::restore(&export.join("variables/variables")).expect("restore");
    assert_eq!(restored, weights());
}

#[test]
fn test_mutating_request_after_add_does_not_leak() {
    let (_root, export, vocab) = setup();
    let mut builder = BundleBuilder::new(&export).expect("builder");
    let mut signatures = SignatureMap::new();
    signatures.insert(DEFAULT_SERVING_SIGNATURE_KEY.to_string(), classify_signature());

    builder
        .add_variants_and_parameters(
            VariantRequest::new(model_graph(&vocab), ["serve"]).with_signatures(signatures.clone()),
            &weights(),
        )
        .expect("add");
    signatures.clear();

    assert_eq!(builder.bundle().meta_graphs[0].signature_def.len(), 1);
}
