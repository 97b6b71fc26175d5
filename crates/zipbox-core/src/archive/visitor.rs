//! Per-entry visitor callbacks for extraction and packing

use super::EntryMetadata;
use crate::config::Config;
use crate::Result;
use std::path::Path;
use tracing::{debug, info};

/// Called once per entry before the corresponding filesystem action
///
/// During extraction `path` is the entry name; during packing it is the
/// source path on disk. Returning an error aborts the whole traversal with
/// that error.
pub trait Visitor {
    fn visit(&mut self, path: &Path, meta: &EntryMetadata) -> Result<()>;
}

impl<F> Visitor for F
where
    F: FnMut(&Path, &EntryMetadata) -> Result<()>,
{
    fn visit(&mut self, path: &Path, meta: &EntryMetadata) -> Result<()> {
        self(path, meta)
    }
}

/// Which traversal a [`LogVisitor`] reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitAction {
    Extract,
    Pack,
}

/// Default visitor: logs each entry and never aborts
#[derive(Debug, Clone, Copy)]
pub struct LogVisitor {
    verbose: bool,
    action: VisitAction,
}

impl LogVisitor {
    pub fn new(verbose: bool, action: VisitAction) -> Self {
        Self { verbose, action }
    }

    pub fn from_config(config: &Config, action: VisitAction) -> Self {
        Self::new(config.verbose, action)
    }
}

impl Visitor for LogVisitor {
    fn visit(&mut self, path: &Path, meta: &EntryMetadata) -> Result<()> {
        let what = match (self.action, meta.is_dir) {
            (VisitAction::Extract, true) => "Extracting dir",
            (VisitAction::Extract, false) => "Extracting file",
            (VisitAction::Pack, true) => "Adding dir",
            (VisitAction::Pack, false) => "Adding file",
        };

        if self.verbose {
            info!(path = %path.display(), size = meta.size, "{}", what);
        } else {
            debug!(path = %path.display(), size = meta.size, "{}", what);
        }
        Ok(())
    }
}
