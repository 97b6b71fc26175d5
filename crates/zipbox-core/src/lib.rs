//! zipbox - ZIP archives as mutable, filesystem-backed containers
//!
//! Open an archive, extract all or part of it, add or remove members and
//! flush the result back to disk or to a stream. Standalone packing of a
//! directory tree is available through [`pack_to`] and friends.

pub mod archive;
pub mod config;
pub mod error;
pub mod security;
pub mod utils;

pub use error::{Error, Result};

// Re-export commonly used types
pub use archive::{
    pack_to, pack_to_func, pack_to_with_config, ArchiveEntry, ArchiveSession, Backing,
    EntryMetadata, EntrySource, LogVisitor, Reconciler, RepackReconciler, VisitAction, Visitor,
};
pub use config::Config;
