//! Turning a session's logical entry list back into an archive

use super::extract::{extract_entry, ExtractOptions};
use super::pack::{pack_staged, PackOptions};
use super::{ArchiveEntry, EntrySource, LogVisitor, VisitAction};
use crate::config::Config;
use crate::security::sanitize_entry_path;
use crate::utils::base_name;
use crate::{Error, Result};
use std::fs::{self, File};
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Output sink for archives: anything that can be written and repositioned
pub trait WriteSeek: Write + Seek {}

impl<T: Write + Seek> WriteSeek for T {}

/// Strategy that writes a complete archive holding `entries`
///
/// `source` is the archive the entries' [`EntrySource::Archive`] indices
/// refer to, when the session has one open.
pub trait Reconciler {
    fn reconcile(
        &self,
        source: Option<&mut ZipArchive<File>>,
        entries: &[ArchiveEntry],
        out: &mut dyn WriteSeek,
    ) -> Result<()>;
}

/// Re-packs the whole archive through a scratch tree
///
/// Every entry is materialized under a fresh scratch directory, then the
/// tree is packed in entry order. The scratch directory is removed on every
/// exit path.
#[derive(Debug, Clone)]
pub struct RepackReconciler {
    scratch_root: PathBuf,
    scratch_prefix: String,
    verbose: bool,
    pack: PackOptions,
}

impl RepackReconciler {
    /// Reconciler for the archive at `archive_path`
    pub fn new(archive_path: &Path, config: &Config) -> Result<Self> {
        let name = base_name(archive_path);
        let scratch_prefix = if name.is_empty() {
            "zipbox-".to_string()
        } else {
            format!("zipbox-{}-", name)
        };

        Ok(Self {
            scratch_root: config.scratch_root(),
            scratch_prefix,
            verbose: config.verbose,
            pack: PackOptions::from_config(config)?,
        })
    }

    fn materialize(
        &self,
        source: &mut Option<&mut ZipArchive<File>>,
        entry: &ArchiveEntry,
        scratch: &Path,
    ) -> Result<()> {
        if entry.is_dir() {
            fs::create_dir_all(sanitize_entry_path(scratch, &entry.name)?)?;
            return Ok(());
        }

        match &entry.source {
            EntrySource::Archive(index) => {
                let archive = source.as_deref_mut().ok_or(Error::NotOpen)?;
                let mut file = archive.by_index(*index)?;
                // Recorded metadata travels on the entry, not the staged file
                extract_entry(
                    &mut file,
                    &entry.name,
                    &entry.metadata(),
                    scratch,
                    &ExtractOptions::default(),
                )?;
            }
            EntrySource::Path(path) => {
                let target = sanitize_entry_path(scratch, &entry.name)?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(path, &target)?;
                debug!(entry = %entry.name, from = ?path, "Staged file");
            }
            EntrySource::Empty => {
                return Err(Error::InvalidPath(format!(
                    "File entry {:?} has no content source",
                    entry.name
                )));
            }
        }

        Ok(())
    }
}

impl Reconciler for RepackReconciler {
    fn reconcile(
        &self,
        mut source: Option<&mut ZipArchive<File>>,
        entries: &[ArchiveEntry],
        out: &mut dyn WriteSeek,
    ) -> Result<()> {
        fs::create_dir_all(&self.scratch_root)?;
        let scratch = tempfile::Builder::new()
            .prefix(&self.scratch_prefix)
            .tempdir_in(&self.scratch_root)?;

        info!(scratch = ?scratch.path(), entries = entries.len(), "Staging archive");

        for entry in entries {
            self.materialize(&mut source, entry, scratch.path())?;
        }

        let mut visitor = LogVisitor::new(self.verbose, VisitAction::Pack);
        pack_staged(scratch.path(), entries, out, &mut visitor, &self.pack)?;

        if let Err(e) = scratch.close() {
            warn!(error = %e, "Failed to remove scratch directory");
        }
        Ok(())
    }
}
