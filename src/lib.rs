//! Aprender Bundle: SavedModel-style export bundles in pure Rust.
//!
//! A bundle is one directory holding several tagged graph variants that
//! share a single parameter store and a single asset directory.
//!
//! # Quick Start
//!
//! ```
//! use aprender_bundle::prelude::*;
//!
//! let root = tempfile::TempDir::new().unwrap();
//! let export_dir = root.path().join("1");
//!
//! let graph = GraphDef::new()
//!     .with_node(NodeDef::new("x", "Placeholder"))
//!     .with_node(NodeDef::new("y", "MatMul").with_input("x"));
//! let signature = predict_signature_def(
//!     "x",
//!     build_tensor_info(&TensorRef::new("x", 0), DataType::Float, Some(vec![-1, 4])),
//!     "y",
//!     build_tensor_info(&TensorRef::new("y", 0), DataType::Float, Some(vec![-1, 1])),
//! );
//! let params = ParameterSet::new()
//!     .with("w", Parameter::from_f32(vec![4, 1], &[0.1, 0.2, 0.3, 0.4]));
//!
//! let mut builder = BundleBuilder::new(&export_dir).unwrap();
//! builder
//!     .add_variants_and_parameters(
//!         VariantRequest::new(graph, ["serve"])
//!             .with_signature(DEFAULT_SERVING_SIGNATURE_KEY, signature),
//!         &params,
//!     )
//!     .unwrap();
//! builder.save(false).unwrap();
//!
//! let loaded = load_bundle(&export_dir).unwrap();
//! assert!(loaded.variant_with_tags(&["serve"]).is_some());
//! ```
//!
//! # Modules
//!
//! - [`builder`]: the bundle builder and its add/save calls
//! - [`signature`]: signature validation and constructors
//! - [`asset`]: asset registration, deduplication and copying
//! - [`variant`]: op attachment and variant assembly
//! - [`params`]: sharded parameter store
//! - [`format`]: binary and text bundle encodings, bundle reader
//! - [`graph`]: graph document and export options
//! - [`types`]: bundle data model
//! - [`fs`]: file-system collaborator
//! - [`config`]: builder configuration
//! - [`error`]: error types

pub mod asset;
pub mod builder;
pub mod config;
pub mod constants;
pub mod error;
pub mod format;
pub mod fs;
pub mod graph;
pub mod params;
pub mod prelude;
pub mod signature;
pub mod types;
pub mod variant;

pub use builder::{BundleBuilder, VariantRequest};
pub use error::{BundleError, Result};
pub use format::{contains_bundle, load_bundle};
pub use types::{SavedBundle, Variant};
