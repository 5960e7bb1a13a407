//! Shared types, error model, and configuration for manifestgen.
//!
//! This crate is the foundation depended on by all other manifestgen crates.
//! It provides:
//! - [`ManifestGenError`]: the unified error type
//! - Domain types ([`Options`], [`SourceLocator`], [`Manifest`])
//! - Configuration ([`AppConfig`], config loading)
//! - Path helpers ([`secure_join`], [`logical_path`])

pub mod config;
pub mod error;
pub mod paths;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_API_URL, DefaultsConfig, ReleaseConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{ManifestGenError, Result};
pub use paths::{logical_path, secure_join};
pub use types::{
    DEFAULT_BASE_URL, DEFAULT_COMPONENTS, DEFAULT_MANIFEST_FILE, DEFAULT_NAMESPACE,
    DEFAULT_REGISTRY, Manifest, Options, SourceLocator,
};
