//! Stateful handle over one archive: extract, mutate, flush, close
//!
//! A session is either backed by an archive file or by an output stream.
//! Mutations only touch the in-memory entry list; [`ArchiveSession::flush`]
//! rebuilds the whole archive from that list through the session's
//! [`Reconciler`].

use super::extract::{extract_all_or_selected, ExtractOptions};
use super::pack::{linked_file_metadata, PackOptions};
use super::reconcile::{Reconciler, RepackReconciler, WriteSeek};
use super::{
    existing_mode, set_mode, ArchiveEntry, EntryMetadata, EntrySource, LogVisitor, VisitAction,
    Visitor,
};
use crate::config::Config;
use crate::security::validate_entry_name;
use crate::utils::{
    dir_name, from_zip_time, is_dir_name, join_name, normalize_name, path_to_name,
};
use crate::{Error, Result};
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

/// What a session writes to when it flushes
pub enum Backing {
    /// An archive file, rewritten in place with `permission` as its mode
    Path { path: PathBuf, permission: u32 },
    /// An output stream receiving the whole archive on each flush
    Stream { writer: Box<dyn WriteSeek> },
}

impl fmt::Debug for Backing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backing::Path { path, permission } => f
                .debug_struct("Path")
                .field("path", path)
                .field("permission", &format_args!("{:o}", permission))
                .finish(),
            Backing::Stream { .. } => f.debug_struct("Stream").finish_non_exhaustive(),
        }
    }
}

/// A mutable view of one ZIP archive
pub struct ArchiveSession {
    backing: Backing,
    reader: Option<ZipArchive<File>>,
    entries: Vec<ArchiveEntry>,
    changed: bool,
    closed: bool,
    config: Config,
    reconciler: Box<dyn Reconciler>,
}

impl fmt::Debug for ArchiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveSession")
            .field("backing", &self.backing)
            .field("open", &self.reader.is_some())
            .field("entries", &self.entries.len())
            .field("changed", &self.changed)
            .field("closed", &self.closed)
            .finish()
    }
}

impl ArchiveSession {
    /// Open an existing archive
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Open an existing archive with an explicit configuration
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let permission = existing_mode(&path).unwrap_or(config.default_permission);
        let mut reader = ZipArchive::new(file)?;
        let entries = read_entries(&mut reader)?;

        info!(archive = ?path, entries = entries.len(), "Opened archive");

        Ok(Self {
            reconciler: Box::new(RepackReconciler::new(&path, &config)?),
            backing: Backing::Path { path, permission },
            reader: Some(reader),
            entries,
            changed: false,
            closed: false,
            config,
        })
    }

    /// Start a new, empty archive at `path`
    ///
    /// Nothing is written until the first flush.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_config(path, Config::default())
    }

    /// Start a new, empty archive at `path` with an explicit configuration
    pub fn create_with_config<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!(archive = ?path, "Created archive session");

        Ok(Self {
            reconciler: Box::new(RepackReconciler::new(&path, &config)?),
            backing: Backing::Path {
                path,
                permission: config.default_permission,
            },
            reader: None,
            entries: Vec::new(),
            changed: true,
            closed: false,
            config,
        })
    }

    /// Start a new, empty archive written to `writer` on flush
    pub fn from_writer<W: Write + std::io::Seek + 'static>(writer: W) -> Result<Self> {
        Self::from_writer_with_config(writer, Config::default())
    }

    /// Start a new, empty stream-backed archive with an explicit configuration
    pub fn from_writer_with_config<W: Write + std::io::Seek + 'static>(
        writer: W,
        config: Config,
    ) -> Result<Self> {
        Ok(Self {
            reconciler: Box::new(RepackReconciler::new(Path::new("stream"), &config)?),
            backing: Backing::Stream {
                writer: Box::new(writer),
            },
            reader: None,
            entries: Vec::new(),
            changed: true,
            closed: false,
            config,
        })
    }

    /// Replace the strategy used to rebuild the archive on flush
    pub fn with_reconciler(mut self, reconciler: Box<dyn Reconciler>) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn backing(&self) -> &Backing {
        &self.backing
    }

    /// Archive path, if path-backed
    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Path { path, .. } => Some(path),
            Backing::Stream { .. } => None,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.backing, Backing::Stream { .. })
    }

    /// Whether the entry list differs from what is on disk
    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Logical entries, in member order
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names, limited to those starting with one of `prefixes` when
    /// any are given
    pub fn list_names(&self, prefixes: &[&str]) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.name.as_str())
            .filter(|name| prefixes.is_empty() || prefixes.iter().any(|p| name.starts_with(p)))
            .collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        Ok(())
    }

    /// Add `abs_path` as the file `name`, or rebind an existing entry of
    /// that name to it
    pub fn add_file<P: AsRef<Path>>(&mut self, name: &str, abs_path: P) -> Result<()> {
        self.ensure_usable()?;
        let abs_path = abs_path.as_ref();
        let name = normalize_name(name);
        validate_entry_name(&name)?;
        if is_dir_name(&name) {
            return Err(Error::InvalidPath(format!(
                "File entry name ends with '/': {:?}",
                name
            )));
        }

        let stat = fs::metadata(abs_path)?;
        if !stat.is_file() {
            return Err(Error::InvalidPath(format!("{:?} is not a file", abs_path)));
        }

        let entry = ArchiveEntry::new(
            &name,
            &EntryMetadata::from_fs(&stat),
            EntrySource::Path(abs_path.to_path_buf()),
        );
        self.upsert(entry);
        Ok(())
    }

    /// Add a directory marker; returns `false` if the name is taken
    pub fn add_empty_dir(&mut self, name: &str) -> Result<bool> {
        self.ensure_usable()?;
        let name = dir_name(name);
        validate_entry_name(&name)?;

        if self.position(&name).is_some() {
            return Ok(false);
        }

        let meta = EntryMetadata {
            is_dir: true,
            ..Default::default()
        };
        self.entries
            .push(ArchiveEntry::new(&name, &meta, EntrySource::Empty));
        self.changed = true;
        Ok(true)
    }

    /// Add the tree at `abs_path` under `name/`
    pub fn add_dir<P: AsRef<Path>>(&mut self, name: &str, abs_path: P) -> Result<()> {
        self.ensure_usable()?;
        let abs_path = abs_path.as_ref();
        let root = dir_name(name);
        validate_entry_name(&root)?;

        let stat = fs::metadata(abs_path)?;
        if !stat.is_dir() {
            return Err(Error::InvalidPath(format!(
                "{:?} is not a directory",
                abs_path
            )));
        }

        let options = PackOptions::from_config(&self.config)?;
        self.upsert_dir(&root, &EntryMetadata::from_fs(&stat), abs_path);

        let walker = WalkDir::new(abs_path)
            .min_depth(1)
            .follow_links(options.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !options.is_excluded(e.file_name()));

        for entry in walker {
            let entry = entry?;
            let meta = if entry.file_type().is_symlink() {
                match linked_file_metadata(entry.path()) {
                    Some(meta) => meta,
                    None => continue,
                }
            } else {
                EntryMetadata::from_fs(&entry.metadata()?)
            };

            let relative = entry.path().strip_prefix(abs_path).map_err(|_| {
                Error::InvalidPath(format!("{:?} is outside {:?}", entry.path(), abs_path))
            })?;
            let name = join_name(&root, &path_to_name(relative));

            if meta.is_dir {
                self.upsert_dir(&dir_name(&name), &meta, entry.path());
            } else {
                self.upsert(ArchiveEntry::new(
                    &name,
                    &meta,
                    EntrySource::Path(entry.path().to_path_buf()),
                ));
            }
        }

        Ok(())
    }

    fn upsert_dir(&mut self, name: &str, meta: &EntryMetadata, path: &Path) {
        if self.position(name).is_none() {
            self.entries.push(ArchiveEntry::new(
                name,
                meta,
                EntrySource::Path(path.to_path_buf()),
            ));
            self.changed = true;
        }
    }

    fn upsert(&mut self, entry: ArchiveEntry) {
        match self.position(&entry.name) {
            Some(index) => {
                debug!(entry = %entry.name, "Rebinding entry");
                self.entries[index] = entry;
            }
            None => {
                debug!(entry = %entry.name, "Adding entry");
                self.entries.push(entry);
            }
        }
        self.changed = true;
    }

    /// Remove the entry at `index`
    pub fn delete_index(&mut self, index: usize) -> Result<ArchiveEntry> {
        self.ensure_usable()?;
        if index >= self.entries.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }

        let removed = self.entries.remove(index);
        self.changed = true;
        debug!(entry = %removed.name, "Removed entry");
        Ok(removed)
    }

    /// Remove an entry by name; naming a directory also removes everything
    /// beneath it
    pub fn delete_name(&mut self, name: &str) -> Result<()> {
        self.ensure_usable()?;
        let name = normalize_name(name);
        let dir = dir_name(&name);

        let before = self.entries.len();
        self.entries
            .retain(|e| e.name != name && !e.name.starts_with(&dir));
        let removed = before - self.entries.len();

        if removed == 0 {
            return Err(Error::NotFound(format!("No entry named {:?}", name)));
        }

        self.changed = true;
        debug!(entry = %name, removed, "Removed entries");
        Ok(())
    }

    /// Extract the whole archive, or only `selected` entries, to `dest`,
    /// logging each entry
    ///
    /// Reads the archive as it is on disk; call [`flush`](Self::flush)
    /// first to include pending changes.
    pub fn extract_to<P: AsRef<Path>>(&mut self, dest: P, selected: &[&str]) -> Result<()> {
        let visitor = LogVisitor::from_config(&self.config, VisitAction::Extract);
        self.extract_to_func(dest, visitor, selected)
    }

    /// Extract with a caller-supplied visitor that may abort the extraction
    pub fn extract_to_func<P, V>(&mut self, dest: P, mut visitor: V, selected: &[&str]) -> Result<()>
    where
        P: AsRef<Path>,
        V: Visitor,
    {
        self.ensure_usable()?;
        let dest = normalize_dest(dest.as_ref());
        let reader = self.reader.as_mut().ok_or(Error::NotOpen)?;

        info!(dest = ?dest, selected = selected.len(), "Extracting archive");
        fs::create_dir_all(&dest)?;

        let options = ExtractOptions::from(&self.config);
        extract_all_or_selected(reader, &dest, &mut visitor, selected, &options)
    }

    /// Write pending changes back to the archive
    ///
    /// Does nothing when there are no changes or the session is closed. A
    /// path-backed archive is rebuilt in a temporary file beside it and
    /// renamed over it, then reopened; on error the previous archive is left
    /// as it was and the session stays dirty.
    pub fn flush(&mut self) -> Result<()> {
        if self.closed || !self.changed {
            debug!("Nothing to flush");
            return Ok(());
        }

        match &mut self.backing {
            Backing::Path { path, permission } => {
                info!(archive = ?path, entries = self.entries.len(), "Flushing archive");

                let parent = match path.parent() {
                    Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                    _ => PathBuf::from("."),
                };
                let mut staged = tempfile::Builder::new()
                    .prefix(".zipbox-")
                    .suffix(".tmp")
                    .tempfile_in(&parent)?;

                self.reconciler
                    .reconcile(self.reader.as_mut(), &self.entries, staged.as_file_mut())?;
                staged.as_file().sync_all()?;
                set_mode(staged.path(), *permission)?;
                staged.persist(&*path).map_err(|e| Error::Io(e.error))?;

                let mut reader = ZipArchive::new(File::open(&*path)?)?;
                self.entries = read_entries(&mut reader)?;
                self.reader = Some(reader);
            }
            Backing::Stream { writer } => {
                info!(entries = self.entries.len(), "Flushing archive to stream");
                self.reconciler
                    .reconcile(None, &self.entries, writer.as_mut())?;
                writer.flush()?;
            }
        }

        self.changed = false;
        Ok(())
    }

    /// Flush and release the archive
    ///
    /// If flushing fails the session stays open and dirty so the caller can
    /// retry.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        self.flush()?;
        self.reader = None;
        self.closed = true;
        debug!("Closed archive session");
        Ok(())
    }
}

impl Drop for ArchiveSession {
    fn drop(&mut self) {
        if self.changed && !self.closed {
            warn!(backing = ?self.backing, "Archive session dropped with unflushed changes");
        }
    }
}

fn read_entries(reader: &mut ZipArchive<File>) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::with_capacity(reader.len());

    for i in 0..reader.len() {
        let file = reader.by_index(i)?;
        let name = normalize_name(file.name());
        let meta = EntryMetadata {
            is_dir: file.is_dir() || is_dir_name(&name),
            size: file.size(),
            mode: file.unix_mode().map(|m| m & 0o7777),
            modified: file.last_modified().as_ref().and_then(from_zip_time),
        };
        entries.push(ArchiveEntry::new(&name, &meta, EntrySource::Archive(i)));
    }

    Ok(entries)
}

fn normalize_dest(dest: &Path) -> PathBuf {
    match dest.to_str() {
        Some(s) => PathBuf::from(normalize_name(s)),
        None => dest.to_path_buf(),
    }
}
