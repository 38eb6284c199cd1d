//! Bundle builder.
//!
//! Drives one export directory through two call families:
//!
//! ```text
//!            add_variants_and_parameters          add_variants
//!   Empty ------------------------------> Saved <------------+
//!     |                                     |                |
//!     +-- add_variants: VariablesNotSavedYet +----------------+
//!                                           |
//!                                           +-- add_variants_and_parameters: AlreadySaved
//! ```
//!
//! Every add call validates signatures, resolves assets and checks op
//! references before it touches the bundle or the directory. Only parameter
//! persistence can fail after side effects, leaving partial shards behind.
//!
//! # Example
//!
//! ```no_run
//! use aprender_bundle::builder::{BundleBuilder, VariantRequest};
//! use aprender_bundle::graph::GraphDef;
//! use aprender_bundle::params::{Parameter, ParameterSet};
//!
//! let mut builder = BundleBuilder::new("/tmp/export/1")?;
//! let params = ParameterSet::new().with("w", Parameter::from_f32(vec![2], &[0.5, 1.5]));
//! builder.add_variants_and_parameters(VariantRequest::new(GraphDef::new(), ["train"]), &params)?;
//! builder.add_variants(VariantRequest::new(GraphDef::new(), ["serve"]))?;
//! let path = builder.save(false)?;
//! # Ok::<(), aprender_bundle::error::BundleError>(())
//! ```

mod request;

pub use request::VariantRequest;

use crate::asset::{materialize_assets, AssetFilenameMap, AssetRegistry};
use crate::config::BuilderConfig;
use crate::constants::{variables_prefix, VARIABLES_DIRECTORY};
use crate::error::{BundleError, Result};
use crate::format::{BundleEncoding, BundleFormat};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::params::{ParameterSet, ParameterStore};
use crate::signature::validate_signature_map;
use crate::types::SavedBundle;
use crate::variant::{draft_variant, record_in_graph, resolve_op_attachments, tag_and_append};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Assembles a bundle in one export directory.
///
/// Not thread-safe: a builder is driven by one caller, one call at a time.
/// Every mutating method takes `&mut self`.
#[derive(Debug)]
pub struct BundleBuilder<F: FileSystem = LocalFileSystem> {
    export_dir: PathBuf,
    bundle: SavedBundle,
    registry: AssetRegistry,
    /// Graph fingerprint → legacy init op already attached for that graph
    legacy_init_ops: BTreeMap<u32, String>,
    has_saved_parameters: bool,
    config: BuilderConfig,
    fs: F,
}

impl BundleBuilder<LocalFileSystem> {
    /// Builder for a directory that must not exist yet.
    ///
    /// # Errors
    /// [`BundleError::DirectoryAlreadyExists`] if `export_dir` exists,
    /// [`BundleError::Io`] if it cannot be created.
    pub fn new(export_dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(export_dir, BuilderConfig::default())
    }

    /// Builder with an explicit configuration.
    ///
    /// # Errors
    /// Same as [`BundleBuilder::new`].
    pub fn with_config(export_dir: impl AsRef<Path>, config: BuilderConfig) -> Result<Self> {
        Self::with_file_system(export_dir, config, LocalFileSystem)
    }
}

impl<F: FileSystem> BundleBuilder<F> {
    /// Builder over a caller-supplied file system.
    ///
    /// Nothing is created when the directory already exists.
    ///
    /// # Errors
    /// [`BundleError::DirectoryAlreadyExists`] if `export_dir` exists,
    /// [`BundleError::Io`] if it cannot be created.
    pub fn with_file_system(
        export_dir: impl AsRef<Path>,
        config: BuilderConfig,
        fs: F,
    ) -> Result<Self> {
        let export_dir = export_dir.as_ref().to_path_buf();
        if fs.exists(&export_dir) {
            return Err(BundleError::DirectoryAlreadyExists(export_dir));
        }
        fs.create_dir_all(&export_dir)?;
        debug!(dir = %export_dir.display(), "Created export directory");

        Ok(Self {
            export_dir,
            bundle: SavedBundle::new(),
            registry: AssetRegistry::new(),
            legacy_init_ops: BTreeMap::new(),
            has_saved_parameters: false,
            config,
            fs,
        })
    }

    /// Add the first variant and persist the shared parameters.
    ///
    /// # Errors
    /// [`BundleError::AlreadySaved`] on a second call. Otherwise any
    /// validation error (nothing changed) or [`BundleError::PersistFailure`]
    /// (assets and partial shards may remain on disk, no variant appended).
    pub fn add_variants_and_parameters(
        &mut self,
        request: VariantRequest,
        params: &ParameterSet,
    ) -> Result<()> {
        if self.has_saved_parameters {
            return Err(BundleError::AlreadySaved);
        }
        self.add(request, Some(params))?;
        self.has_saved_parameters = true;
        Ok(())
    }

    /// Add another variant sharing the already persisted parameters.
    ///
    /// # Errors
    /// [`BundleError::VariablesNotSavedYet`] before the parameters call,
    /// [`BundleError::InvalidOpReference`] if a train op is supplied, or any
    /// validation error. The bundle is unchanged on error.
    pub fn add_variants(&mut self, request: VariantRequest) -> Result<()> {
        if !self.has_saved_parameters {
            return Err(BundleError::VariablesNotSavedYet);
        }
        if let Some(train) = &request.train_op {
            return Err(BundleError::InvalidOpReference {
                role: "train_op",
                reference: train.to_string(),
                reason: "train ops are only attached by add_variants_and_parameters".to_string(),
            });
        }
        self.add(request, None)
    }

    fn add(&mut self, request: VariantRequest, params: Option<&ParameterSet>) -> Result<()> {
        let VariantRequest {
            tags,
            graph,
            signatures,
            assets,
            legacy_init_op,
            main_op,
            train_op,
            options,
        } = request;

        // Checks only, no side effects yet.
        validate_signature_map(&signatures)?;
        let plan = self.registry.plan(&self.fs, &graph, &assets)?;
        let ops = resolve_op_attachments(
            &graph,
            legacy_init_op.as_ref(),
            main_op.as_ref(),
            train_op.as_ref(),
        )?;
        let legacy_record = match &ops.legacy_init_op {
            Some(name) => {
                let fingerprint = graph.fingerprint()?;
                if let Some(existing) = self.legacy_init_ops.get(&fingerprint) {
                    return Err(BundleError::DuplicateLegacyInitOp {
                        existing: existing.clone(),
                    });
                }
                Some((fingerprint, name.clone()))
            }
            None => None,
        };

        if self.config.copy_assets {
            materialize_assets(&self.fs, &self.export_dir, &plan)?;
        }
        self.registry.commit(&plan);

        if let Some(params) = params {
            let variables_dir = self.export_dir.join(VARIABLES_DIRECTORY);
            self.fs
                .create_dir_all(&variables_dir)
                .map_err(|e| BundleError::persist(&variables_dir, e.to_string()))?;
            ParameterStore::new(self.config.max_shard_bytes).persist(
                &self.fs,
                params,
                &self.export_dir.join(variables_prefix()),
            )?;
        }

        let mut exported = graph.export(&options);
        record_in_graph(&mut exported, &ops, &plan.asset_file_defs);
        let variant = draft_variant(
            exported,
            ops,
            plan.asset_file_defs,
            options.strip_default_attrs,
        );
        tag_and_append(&mut self.bundle, variant, &tags, &signatures);
        if let Some((fingerprint, name)) = legacy_record {
            self.legacy_init_ops.insert(fingerprint, name);
        }

        info!(
            tags = ?tags,
            signatures = signatures.len(),
            variants = self.bundle.len(),
            "Variant added"
        );
        Ok(())
    }

    /// Write the bundle file and return its path.
    ///
    /// Binary goes to `saved_model.pb`, text to `saved_model.pbtxt`. May be
    /// called any number of times; each call overwrites the file with the
    /// current state.
    ///
    /// # Errors
    /// [`BundleError::Serialization`] if encoding fails, [`BundleError::Io`]
    /// if the file cannot be written.
    pub fn save(&self, as_text: bool) -> Result<PathBuf> {
        let encoding = BundleEncoding::from_as_text(as_text);
        if !self.fs.exists(&self.export_dir) {
            self.fs.create_dir_all(&self.export_dir)?;
        }

        let bytes = BundleFormat::encode(&self.bundle, encoding)?;
        let path = self.export_dir.join(encoding.filename());
        self.fs.write_atomic(&path, &bytes)?;

        info!(
            path = %path.display(),
            encoding = encoding.as_str(),
            variants = self.bundle.len(),
            bytes = bytes.len(),
            "Bundle written"
        );
        Ok(path)
    }

    /// Bundle accumulated so far.
    #[must_use]
    pub fn bundle(&self) -> &SavedBundle {
        &self.bundle
    }

    /// Asset basename ledger.
    #[must_use]
    pub fn asset_filename_map(&self) -> &AssetFilenameMap {
        self.registry.filename_map()
    }

    /// True once parameters have been persisted.
    #[must_use]
    pub fn has_saved_parameters(&self) -> bool {
        self.has_saved_parameters
    }

    /// Target directory.
    #[must_use]
    pub fn export_dir(&self) -> &Path {
        &self.export_dir
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }
}

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;
