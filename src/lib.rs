//! Confined file resolution for template imports.
//!
//! An [`Importer`] turns `(imported_from, imported_path)` pairs into file
//! contents without ever reading outside one root directory: `..` traversal,
//! absolute paths and outward symlinks are refused, library paths are searched
//! in order, and results are memoized for the importer's lifetime.

pub mod boundary;
pub mod cache;
pub mod config;
pub mod errors;
pub mod importer;
pub mod logging;
pub mod resolver;
pub mod search;

pub use errors::{ImportError, ImportResult};
pub use importer::{DynImporter, FileImporter, Importer, ImporterOptions, Resolved};
