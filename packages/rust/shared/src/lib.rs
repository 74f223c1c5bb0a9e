//! Shared types, error model, and configuration for mdenrich.
//!
//! This crate is the foundation depended on by all other mdenrich crates.
//! It provides:
//! - [`EnrichError`]: the unified error type
//! - Domain types ([`Profile`], [`CandidateAsset`], [`Selection`], [`QaResult`])
//! - Configuration ([`AppConfig`], [`QaMode`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AvailabilityConfig, CatalogConfig, DefaultsConfig, JournalConfig,
    OpenRouterConfig, PromptMode, QaMode, SelectionConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{EnrichError, Result};
pub use types::{
    AssetKind, CandidateAsset, CandidateBucket, LinkSelection, MAX_ALT_LEN, MediaKind,
    MediaSelection, Place, Profile, QaResult, Section, Selection,
};
