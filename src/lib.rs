// Haydon Cross-Reference - Core Library
// Exposes the matcher, tables and store for the CLI, API server and tests

pub mod catalog;
pub mod config;
pub mod db;
pub mod matcher;
pub mod preview;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use catalog::{
    CatalogEntry, CatalogSnapshot, ReferenceEntry,
    load_catalog_csv, load_reference_csv, read_catalog, read_references,
};
pub use config::Config;
pub use db::{
    ImportRecord,
    setup_database, replace_catalog_entries, replace_reference_entries,
    record_import, load_snapshot, count_catalog_entries, count_reference_entries, get_imports,
};
pub use matcher::{
    Candidates, LookupOutcome, MatchMode, MatchOptions, Matcher, ReferenceMatch,
    candidates, extract_core_part, lookup_order, normalize, search,
};
pub use preview::{NoPreview, PreviewSource};

#[cfg(feature = "preview")]
pub use preview::WebPreviewSource;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
