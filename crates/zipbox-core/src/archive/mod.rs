//! Archive operations module

pub mod extract;
pub mod pack;
pub mod reconcile;
pub mod session;
pub mod visitor;

pub use extract::{extract_all_or_selected, extract_entry, ExtractOptions};
pub use pack::{pack_directory, pack_file, pack_staged, pack_tree_to_writer, PackOptions};
pub use reconcile::{Reconciler, RepackReconciler, WriteSeek};
pub use session::{ArchiveSession, Backing};
pub use visitor::{LogVisitor, VisitAction, Visitor};

use crate::config::Config;
use crate::utils::{is_dir_name, normalize_name};
use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::info;

/// Where an entry's content comes from when the archive is re-packed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntrySource {
    /// Member at this index of the archive the session currently has open
    Archive(usize),
    /// A file or directory on disk
    Path(PathBuf),
    /// A directory marker with nothing behind it
    Empty,
}

/// One logical member of an archive
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Slash-separated name; a trailing `/` marks a directory
    pub name: String,
    /// Uncompressed size in bytes (0 for directories)
    pub size: u64,
    /// Unix permission bits (if available)
    pub mode: Option<u32>,
    /// Modification time (Unix timestamp)
    pub modified: Option<i64>,
    /// Content source used by flush
    pub source: EntrySource,
}

impl ArchiveEntry {
    pub(crate) fn new(name: &str, meta: &EntryMetadata, source: EntrySource) -> Self {
        let name = normalize_name(name);
        Self {
            size: if is_dir_name(&name) { 0 } else { meta.size },
            name,
            mode: meta.mode,
            modified: meta.modified,
            source,
        }
    }

    /// Whether this entry is a directory marker
    pub fn is_dir(&self) -> bool {
        is_dir_name(&self.name)
    }

    /// Metadata as handed to visitors
    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            is_dir: self.is_dir(),
            size: self.size,
            mode: self.mode,
            modified: self.modified,
        }
    }
}

/// Metadata passed to visitors and used for member headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EntryMetadata {
    pub is_dir: bool,
    pub size: u64,
    pub mode: Option<u32>,
    pub modified: Option<i64>,
}

impl EntryMetadata {
    /// Build metadata from a filesystem stat
    pub fn from_fs(meta: &fs::Metadata) -> Self {
        Self {
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            mode: file_mode(meta),
            modified: meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
        }
    }
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_mode(_meta: &fs::Metadata) -> Option<u32> {
    None
}

/// Pack a file or directory into a new archive at `dest`
///
/// Entries are logged through the default visitor.
pub fn pack_to<P: AsRef<Path>, Q: AsRef<Path>>(
    src: P,
    dest: Q,
    include_root_dir: bool,
) -> Result<()> {
    let config = Config::default();
    let visitor = LogVisitor::from_config(&config, VisitAction::Pack);
    pack_to_with_config(src, dest, visitor, include_root_dir, &config)
}

/// Pack a file or directory into a new archive at `dest`, calling `visitor`
/// before each member is written
///
/// Every member counts, so with `include_root_dir` the first call is for
/// `src` itself, and a single-file `src` is visited once.
pub fn pack_to_func<P, Q, V>(src: P, dest: Q, visitor: V, include_root_dir: bool) -> Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    V: Visitor,
{
    pack_to_with_config(src, dest, visitor, include_root_dir, &Config::default())
}

/// Pack with an explicit configuration
///
/// The archive is written to a temporary file beside `dest` and renamed
/// over it once complete, so a failure leaves any previous `dest` intact.
pub fn pack_to_with_config<P, Q, V>(
    src: P,
    dest: Q,
    mut visitor: V,
    include_root_dir: bool,
    config: &Config,
) -> Result<()>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    V: Visitor,
{
    let src = src.as_ref();
    let dest = dest.as_ref();

    info!(src = ?src, dest = ?dest, include_root_dir, "Packing archive");

    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut staged = tempfile::Builder::new()
        .prefix(".zipbox-")
        .suffix(".tmp")
        .tempfile_in(parent)?;

    let mut options = PackOptions::from_config(config)?;
    // The staging file may sit inside the tree being packed
    if let Some(name) = staged.path().file_name().and_then(|n| n.to_str()) {
        options.exclude.push(
            glob::Pattern::new(&glob::Pattern::escape(name))
                .map_err(|e| Error::Config(e.to_string()))?,
        );
    }

    pack_tree_to_writer(src, staged.as_file_mut(), &mut visitor, include_root_dir, &options)?;
    staged.as_file().sync_all()?;

    let permission = existing_mode(dest).unwrap_or(config.default_permission);
    set_mode(staged.path(), permission)?;
    staged.persist(dest).map_err(|e| Error::Io(e.error))?;

    info!(dest = ?dest, "Archive written");
    Ok(())
}

#[cfg(unix)]
pub(crate) fn existing_mode(path: &Path) -> Option<u32> {
    fs::metadata(path).ok().as_ref().and_then(file_mode)
}

#[cfg(not(unix))]
pub(crate) fn existing_mode(_path: &Path) -> Option<u32> {
    None
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
