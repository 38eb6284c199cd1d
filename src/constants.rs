//! Fixed names and versions of the on-disk bundle layout.
//!
//! ```text
//! <export_dir>/
//!   saved_model.pb          binary bundle
//!   saved_model.pbtxt       text bundle
//!   variables/
//!     variables.data-NNNNN-of-MMMMM
//!     variables.index
//!   assets/
//!     <deduplicated basenames>
//! ```

// ============================================================================
// Schema
// ============================================================================

/// Current bundle schema version.
pub const SAVED_MODEL_SCHEMA_VERSION: u32 = 1;

/// Magic bytes opening the binary bundle file.
pub const BUNDLE_MAGIC: &[u8; 8] = b"APRSMDL\0";

// ============================================================================
// Filenames and directories
// ============================================================================

/// Binary-encoded bundle filename.
pub const SAVED_MODEL_FILENAME_PB: &str = "saved_model.pb";

/// Text-encoded bundle filename.
pub const SAVED_MODEL_FILENAME_PBTXT: &str = "saved_model.pbtxt";

/// Subdirectory holding copied assets.
pub const ASSETS_DIRECTORY: &str = "assets";

/// Subdirectory holding the shared parameter store.
pub const VARIABLES_DIRECTORY: &str = "variables";

/// Filename prefix of the parameter store inside [`VARIABLES_DIRECTORY`].
pub const VARIABLES_FILENAME: &str = "variables";

/// Suffix of the parameter index file.
pub const VARIABLES_INDEX_SUFFIX: &str = "index";

// ============================================================================
// Graph collection keys
// ============================================================================

/// Collection of asset file references.
pub const ASSETS_KEY: &str = "saved_model_assets";

/// Collection holding at most one legacy init op.
pub const LEGACY_INIT_OP_KEY: &str = "legacy_init_op";

/// Collection holding the main op.
pub const MAIN_OP_KEY: &str = "saved_model_main_op";

/// Collection holding the train op.
pub const TRAIN_OP_KEY: &str = "saved_model_train_op";

// ============================================================================
// Parameter store
// ============================================================================

/// Saver format version written into each variant's saver descriptor.
pub const SAVER_WRITE_VERSION: u32 = 2;

/// Default upper bound on a single parameter shard (256 MiB).
pub const DEFAULT_MAX_SHARD_BYTES: usize = 256 * 1024 * 1024;

/// Relative path of the parameter store prefix inside a bundle.
#[must_use]
pub fn variables_prefix() -> String {
    format!("{VARIABLES_DIRECTORY}/{VARIABLES_FILENAME}")
}
