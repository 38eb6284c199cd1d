//! Builder configuration and per-call export options.

use crate::constants::DEFAULT_MAX_SHARD_BYTES;

/// Configuration for a [`crate::builder::BundleBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Upper bound on one parameter shard in bytes.
    pub max_shard_bytes: usize,
    /// Copy registered assets into `assets/`. When off, only the logical
    /// mapping is recorded in the variants.
    pub copy_assets: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            max_shard_bytes: DEFAULT_MAX_SHARD_BYTES,
            copy_assets: true,
        }
    }
}

impl BuilderConfig {
    /// Create a new builder configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shard size cap (at least one byte).
    #[must_use]
    pub fn with_max_shard_bytes(mut self, max_shard_bytes: usize) -> Self {
        self.max_shard_bytes = max_shard_bytes.max(1);
        self
    }

    /// Enable or disable asset materialization.
    #[must_use]
    pub fn with_copy_assets(mut self, copy_assets: bool) -> Self {
        self.copy_assets = copy_assets;
        self
    }
}

/// Options handed to the graph export step of one add call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExportOptions {
    /// Clear device placement from every node.
    pub clear_devices: bool,
    /// Remove attributes whose value equals the op's registered default.
    pub strip_default_attrs: bool,
}

impl ExportOptions {
    /// Options that leave the graph untouched.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable device clearing.
    #[must_use]
    pub fn with_clear_devices(mut self, clear_devices: bool) -> Self {
        self.clear_devices = clear_devices;
        self
    }

    /// Enable or disable default-attr stripping.
    #[must_use]
    pub fn with_strip_default_attrs(mut self, strip: bool) -> Self {
        self.strip_default_attrs = strip;
        self
    }
}
