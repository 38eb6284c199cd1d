//! Convenience re-exports for common usage.
//!
//! # Usage
//!
//! ```
//! use aprender_bundle::prelude::*;
//! ```

pub use crate::builder::{BundleBuilder, VariantRequest};
pub use crate::config::{BuilderConfig, ExportOptions};
pub use crate::error::{BundleError, Result};
pub use crate::format::{contains_bundle, load_bundle, BundleEncoding};
pub use crate::graph::{GraphDef, NodeDef, OpDef, OpRef, TensorRef};
pub use crate::params::{Parameter, ParameterSet};
pub use crate::signature::{
    build_signature_def, build_sparse_tensor_info, build_tensor_info, predict_signature_def,
    DEFAULT_SERVING_SIGNATURE_KEY,
};
pub use crate::types::{DataType, SavedBundle, SignatureDef, SignatureMap, TensorInfo, Variant};
