//! Signature validation and construction.
//!
//! Validation is a pure check run before an add call mutates anything, so a
//! rejected signature map leaves the bundle exactly as it was.

use crate::error::{BundleError, Result};
use crate::graph::TensorRef;
use crate::types::{DataType, SignatureDef, SignatureMap, TensorEncoding, TensorInfo};
use std::collections::BTreeMap;

/// Method name of prediction signatures.
pub const PREDICT_METHOD_NAME: &str = "aprender/serving/predict";

/// Method name of classification signatures.
pub const CLASSIFY_METHOD_NAME: &str = "aprender/serving/classify";

/// Method name of regression signatures.
pub const REGRESS_METHOD_NAME: &str = "aprender/serving/regress";

/// Default signature key used by serving front-ends.
pub const DEFAULT_SERVING_SIGNATURE_KEY: &str = "serving_default";

// ============================================================================
// Validation
// ============================================================================

/// Check one tensor descriptor.
///
/// # Errors
/// [`BundleError::MalformedTensorInfo`] when the descriptor is empty, has no
/// encoding, names an empty tensor, or carries the invalid dtype.
pub fn validate_tensor_info(signature: &str, key: &str, info: &TensorInfo) -> Result<()> {
    let malformed = |reason: &str| BundleError::MalformedTensorInfo {
        signature: signature.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if info.is_empty() {
        return Err(malformed("missing; encoding and dtype must both be set"));
    }
    match &info.encoding {
        TensorEncoding::Unset => {
            return Err(malformed(
                "no encoding set; one of 'name' or 'coo_sparse' is required",
            ))
        }
        TensorEncoding::Name(name) if name.is_empty() => {
            return Err(malformed("dense encoding with an empty tensor name"))
        }
        TensorEncoding::CooSparse {
            values_tensor_name,
            indices_tensor_name,
            dense_shape_tensor_name,
        } => {
            if values_tensor_name.is_empty()
                || indices_tensor_name.is_empty()
                || dense_shape_tensor_name.is_empty()
            {
                return Err(malformed("coo_sparse encoding with an empty component name"));
            }
        }
        TensorEncoding::Name(_) => {}
    }
    if !info.dtype.is_valid() {
        return Err(malformed("dtype is not set"));
    }
    Ok(())
}

/// Check every input and output of every signature in the map.
///
/// # Errors
/// The first [`BundleError::MalformedTensorInfo`] found, in key order.
pub fn validate_signature_map(map: &SignatureMap) -> Result<()> {
    for (name, signature) in map {
        for (key, info) in &signature.inputs {
            validate_tensor_info(name, key, info)?;
        }
        for (key, info) in &signature.outputs {
            validate_tensor_info(name, key, info)?;
        }
    }
    Ok(())
}

// ============================================================================
// Constructors
// ============================================================================

/// Dense tensor descriptor.
#[must_use]
pub fn build_tensor_info(tensor: &TensorRef, dtype: DataType, shape: Option<Vec<i64>>) -> TensorInfo {
    TensorInfo {
        encoding: TensorEncoding::Name(tensor.name()),
        dtype,
        shape,
    }
}

/// Sparse (coordinate format) tensor descriptor.
#[must_use]
pub fn build_sparse_tensor_info(
    values: &TensorRef,
    indices: &TensorRef,
    dense_shape: &TensorRef,
    dtype: DataType,
) -> TensorInfo {
    TensorInfo {
        encoding: TensorEncoding::CooSparse {
            values_tensor_name: values.name(),
            indices_tensor_name: indices.name(),
            dense_shape_tensor_name: dense_shape.name(),
        },
        dtype,
        shape: None,
    }
}

/// Signature from input and output descriptors.
#[must_use]
pub fn build_signature_def(
    inputs: BTreeMap<String, TensorInfo>,
    outputs: BTreeMap<String, TensorInfo>,
    method_name: impl Into<String>,
) -> SignatureDef {
    SignatureDef {
        inputs,
        outputs,
        method_name: method_name.into(),
    }
}

/// Single-input, single-output prediction signature.
#[must_use]
pub fn predict_signature_def(
    input_key: &str,
    input: TensorInfo,
    output_key: &str,
    output: TensorInfo,
) -> SignatureDef {
    build_signature_def(
        BTreeMap::from([(input_key.to_string(), input)]),
        BTreeMap::from([(output_key.to_string(), output)]),
        PREDICT_METHOD_NAME,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense(name: &str) -> TensorInfo {
        build_tensor_info(&TensorRef::new(name, 0), DataType::Float, Some(vec![-1, 3]))
    }

    fn map_with(info: TensorInfo) -> SignatureMap {
        SignatureMap::from([(
            "serving_default".to_string(),
            predict_signature_def("x", dense("x"), "y", info),
        )])
    }

    #[test]
    fn test_valid_dense_passes() {
        assert!(validate_signature_map(&map_with(dense("y"))).is_ok());
    }

    #[test]
    fn test_valid_sparse_passes() {
        let sparse = build_sparse_tensor_info(
            &TensorRef::new("sp/values", 0),
            &TensorRef::new("sp/indices", 0),
            &TensorRef::new("sp/shape", 0),
            DataType::Int64,
        );
        assert!(validate_signature_map(&map_with(sparse)).is_ok());
    }

    #[test]
    fn test_missing_info_rejected() {
        let err = validate_signature_map(&map_with(TensorInfo::default())).unwrap_err();
        match err {
            BundleError::MalformedTensorInfo { signature, key, reason } => {
                assert_eq!(signature, "serving_default");
                assert_eq!(key, "y");
                assert!(reason.contains("missing"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unset_encoding_rejected() {
        let info = TensorInfo {
            encoding: TensorEncoding::Unset,
            dtype: DataType::Float,
            shape: None,
        };
        let err = validate_signature_map(&map_with(info)).unwrap_err();
        assert!(err.to_string().contains("no encoding"));
    }

    #[test]
    fn test_invalid_dtype_rejected() {
        let info = TensorInfo {
            encoding: TensorEncoding::Name("y:0".to_string()),
            dtype: DataType::Invalid,
            shape: None,
        };
        let err = validate_signature_map(&map_with(info)).unwrap_err();
        assert!(err.to_string().contains("dtype"));
    }

    #[test]
    fn test_empty_sparse_component_rejected() {
        let info = TensorInfo {
            encoding: TensorEncoding::CooSparse {
                values_tensor_name: "v:0".to_string(),
                indices_tensor_name: String::new(),
                dense_shape_tensor_name: "s:0".to_string(),
            },
            dtype: DataType::Float,
            shape: None,
        };
        assert!(validate_signature_map(&map_with(info)).is_err());
    }

    #[test]
    fn test_bad_input_rejected_too() {
        let sig = predict_signature_def("x", TensorInfo::default(), "y", dense("y"));
        let map = SignatureMap::from([("s".to_string(), sig)]);
        let err = validate_signature_map(&map).unwrap_err();
        assert!(matches!(err, BundleError::MalformedTensorInfo { ref key, .. } if key == "x"));
    }

    #[test]
    fn test_empty_map_passes() {
        assert!(validate_signature_map(&SignatureMap::new()).is_ok());
    }
}
