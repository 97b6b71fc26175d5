//! Filesystem → archive transfer

use super::{ArchiveEntry, EntryMetadata, Visitor};
use crate::config::Config;
use crate::security::sanitize_entry_path;
use crate::utils::{base_name, dir_name, join_name, path_to_name, unix_to_zip_time};
use crate::{Error, Result};
use glob::Pattern;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, Seek, Write};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Members at or above this size need ZIP64 extensions
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// Options for packing files into an archive
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Base-name patterns to skip while walking directories
    pub exclude: Vec<Pattern>,
    /// Follow symlinks (pack link targets instead of skipping links)
    pub follow_symlinks: bool,
    /// Record unix permissions
    pub preserve_permissions: bool,
    /// Record modification times
    pub preserve_timestamps: bool,
}

impl PackOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            exclude: config.exclude_patterns()?,
            follow_symlinks: config.follow_symlinks,
            preserve_permissions: config.preserve_permissions,
            preserve_timestamps: config.preserve_timestamps,
        })
    }

    /// Whether a base name matches one of the exclusion patterns
    pub fn is_excluded(&self, name: &OsStr) -> bool {
        let name = name.to_string_lossy();
        self.exclude.iter().any(|p| p.matches(&name))
    }

    fn member_options(&self, meta: &EntryMetadata) -> SimpleFileOptions {
        let mut options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(meta.size >= ZIP64_THRESHOLD);

        if self.preserve_permissions {
            if let Some(mode) = meta.mode {
                options = options.unix_permissions(mode);
            }
        }
        if self.preserve_timestamps {
            if let Some(time) = meta.modified.and_then(unix_to_zip_time) {
                options = options.last_modified_time(time);
            }
        }
        options
    }
}

/// Write one member for `src`
///
/// Directories become a zero-size `name/` member. Files are declared with
/// `meta.size` and streamed; a byte count that differs from the declared
/// size fails with [`Error::SizeMismatch`].
pub fn pack_file<W: Write + Seek>(
    src: &Path,
    recorded_name: &str,
    writer: &mut ZipWriter<W>,
    meta: &EntryMetadata,
    options: &PackOptions,
) -> Result<()> {
    if meta.is_dir {
        let name = dir_name(recorded_name);
        writer.add_directory(name.as_str(), options.member_options(meta))?;
        debug!(entry = %name, "Packed directory");
        return Ok(());
    }

    writer.start_file(recorded_name, options.member_options(meta))?;
    let mut file = File::open(src)?;
    let actual = io::copy(&mut file, writer)?;

    if actual != meta.size {
        return Err(Error::SizeMismatch {
            name: recorded_name.to_string(),
            declared: meta.size,
            actual,
        });
    }

    debug!(entry = recorded_name, bytes = actual, "Packed file");
    Ok(())
}

/// Pack the subtree below `src` under `prefix`
///
/// Children are visited in name order, parents before their contents.
/// Excluded names are skipped along with everything beneath them.
pub fn pack_directory<W: Write + Seek>(
    src: &Path,
    prefix: &str,
    writer: &mut ZipWriter<W>,
    visitor: &mut dyn Visitor,
    options: &PackOptions,
) -> Result<()> {
    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(options.follow_symlinks)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !options.is_excluded(e.file_name()));

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

        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| Error::InvalidPath(format!("{:?} is outside {:?}", entry.path(), src)))?;
        let name = join_name(prefix, &path_to_name(relative));

        visitor.visit(entry.path(), &meta)?;
        pack_file(entry.path(), &name, writer, &meta, options)?;
    }

    Ok(())
}

/// Pack a file or directory into `writer` and finish the archive
///
/// A single stat of `src` decides the mode. A file lands at the archive
/// root under its base name. A directory is packed flat, or under its own
/// base name as a root member when `include_root_dir` is set.
pub fn pack_tree_to_writer<W: Write + Seek>(
    src: &Path,
    writer: W,
    visitor: &mut dyn Visitor,
    include_root_dir: bool,
    options: &PackOptions,
) -> Result<W> {
    let stat = fs::metadata(src)?;
    let meta = EntryMetadata::from_fs(&stat);
    let mut zip = ZipWriter::new(writer);

    if meta.is_dir {
        let prefix = if include_root_dir {
            let root = root_name(src)?;
            visitor.visit(src, &meta)?;
            pack_file(src, &root, &mut zip, &meta, options)?;
            root
        } else {
            String::new()
        };
        pack_directory(src, &prefix, &mut zip, visitor, options)?;
    } else {
        visitor.visit(src, &meta)?;
        pack_file(src, &root_name(src)?, &mut zip, &meta, options)?;
    }

    Ok(zip.finish()?)
}

/// Pack a staged tree in the order of `entries`
///
/// Each entry is read from `scratch/<name>`; the entry's recorded mode
/// and mtime win over the staged file's own.
pub fn pack_staged<W: Write + Seek>(
    scratch: &Path,
    entries: &[ArchiveEntry],
    writer: W,
    visitor: &mut dyn Visitor,
    options: &PackOptions,
) -> Result<W> {
    let mut zip = ZipWriter::new(writer);

    for entry in entries {
        let src = sanitize_entry_path(scratch, &entry.name)?;
        let staged = EntryMetadata::from_fs(&fs::metadata(&src)?);
        let meta = EntryMetadata {
            is_dir: entry.is_dir(),
            size: staged.size,
            mode: entry.mode.or(staged.mode),
            modified: entry.modified.or(staged.modified),
        };

        visitor.visit(&src, &meta)?;
        pack_file(&src, &entry.name, &mut zip, &meta, options)?;
    }

    Ok(zip.finish()?)
}

/// Metadata of the file a symlink points at
///
/// Links to directories are only descended with `follow_symlinks`; those
/// and dangling links yield `None`.
pub(crate) fn linked_file_metadata(link: &Path) -> Option<EntryMetadata> {
    match fs::metadata(link) {
        Ok(target) if target.is_file() => Some(EntryMetadata::from_fs(&target)),
        Ok(_) => {
            warn!(path = ?link, "Skipping symlink to directory");
            None
        }
        Err(e) => {
            warn!(path = ?link, error = %e, "Skipping dangling symlink");
            None
        }
    }
}

fn root_name(src: &Path) -> Result<String> {
    let name = base_name(src);
    if !name.is_empty() {
        return Ok(name);
    }
    let canonical = src.canonicalize()?;
    let name = base_name(&canonical);
    if name.is_empty() {
        return Err(Error::InvalidPath(format!("{:?} has no base name", src)));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{EntrySource, LogVisitor, VisitAction};
    use std::io::{Cursor, Read};
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn names(bytes: Vec<u8>) -> Vec<String> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect()
    }

    fn quiet() -> LogVisitor {
        LogVisitor::new(false, VisitAction::Pack)
    }

    #[test]
    fn test_pack_single_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("only.txt");
        fs::write(&file, b"content").unwrap();

        let cursor = pack_tree_to_writer(
            &file,
            Cursor::new(Vec::new()),
            &mut quiet(),
            true,
            &PackOptions::default(),
        )
        .unwrap();

        assert_eq!(names(cursor.into_inner()), vec!["only.txt"]);
    }

    #[test]
    fn test_pack_directory_flattened() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(temp_dir.path().join("sub")).unwrap();
        fs::write(temp_dir.path().join("sub/b.txt"), b"world").unwrap();

        let cursor = pack_tree_to_writer(
            temp_dir.path(),
            Cursor::new(Vec::new()),
            &mut quiet(),
            false,
            &PackOptions::default(),
        )
        .unwrap();

        let mut names = names(cursor.into_inner());
        names.sort();
        assert_eq!(names, vec!["a.txt", "sub/", "sub/b.txt"]);
    }

    #[test]
    fn test_pack_excludes_patterns() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("keep.txt"), b"keep").unwrap();
        fs::create_dir(temp_dir.path().join(".git")).unwrap();
        fs::write(temp_dir.path().join(".git/HEAD"), b"ref").unwrap();

        let options = PackOptions::from_config(&Config::default()).unwrap();
        let cursor = pack_tree_to_writer(
            temp_dir.path(),
            Cursor::new(Vec::new()),
            &mut quiet(),
            false,
            &options,
        )
        .unwrap();

        assert_eq!(names(cursor.into_inner()), vec!["keep.txt"]);
    }

    #[test]
    fn test_pack_file_detects_size_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("grown.txt");
        fs::write(&file, b"longer than declared").unwrap();

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let meta = EntryMetadata {
            size: 4,
            ..Default::default()
        };
        let result = pack_file(&file, "grown.txt", &mut zip, &meta, &PackOptions::default());

        match result {
            Err(Error::SizeMismatch {
                declared, actual, ..
            }) => {
                assert_eq!(declared, 4);
                assert_eq!(actual, 20);
            }
            other => panic!("expected size mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_pack_staged_keeps_entry_order() {
        let scratch = TempDir::new().unwrap();
        fs::create_dir(scratch.path().join("sub")).unwrap();
        fs::write(scratch.path().join("sub/b.txt"), b"world").unwrap();
        fs::write(scratch.path().join("z.txt"), b"last").unwrap();

        let file_meta = |size| EntryMetadata {
            size,
            ..Default::default()
        };
        let entries = vec![
            ArchiveEntry::new("z.txt", &file_meta(4), EntrySource::Empty),
            ArchiveEntry::new("sub/", &EntryMetadata::default(), EntrySource::Empty),
            ArchiveEntry::new("sub/b.txt", &file_meta(5), EntrySource::Empty),
        ];

        let cursor = pack_staged(
            scratch.path(),
            &entries,
            Cursor::new(Vec::new()),
            &mut quiet(),
            &PackOptions::default(),
        )
        .unwrap();

        let bytes = cursor.into_inner();
        assert_eq!(names(bytes.clone()), vec!["z.txt", "sub/", "sub/b.txt"]);

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut content = String::new();
        archive
            .by_name("sub/b.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "world");
    }

    #[cfg(unix)]
    #[test]
    fn test_pack_symlinked_file_content() {
        use std::os::unix::fs::symlink;

        let temp_dir = TempDir::new().unwrap();
        let src = temp_dir.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("a.txt"), b"hello").unwrap();
        fs::write(temp_dir.path().join("target.txt"), b"linked").unwrap();
        symlink("../target.txt", src.join("link.txt")).unwrap();
        symlink("../missing.txt", src.join("broken.txt")).unwrap();

        let cursor = pack_tree_to_writer(
            &src,
            Cursor::new(Vec::new()),
            &mut quiet(),
            false,
            &PackOptions::default(),
        )
        .unwrap();

        let bytes = cursor.into_inner();
        assert_eq!(names(bytes.clone()), vec!["a.txt", "link.txt"]);

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut content = String::new();
        archive
            .by_name("link.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "linked");
    }

    #[test]
    fn test_pack_directory_in_name_order() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["m.txt", "b.txt", "z.txt", "a.txt"] {
            fs::write(temp_dir.path().join(name), name.as_bytes()).unwrap();
        }

        let cursor = pack_tree_to_writer(
            temp_dir.path(),
            Cursor::new(Vec::new()),
            &mut quiet(),
            false,
            &PackOptions::default(),
        )
        .unwrap();

        assert_eq!(
            names(cursor.into_inner()),
            vec!["a.txt", "b.txt", "m.txt", "z.txt"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_pack_records_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("run.sh");
        fs::write(&file, b"#!/bin/sh\n").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o755)).unwrap();

        let options = PackOptions::from_config(&Config::default()).unwrap();
        let cursor = pack_tree_to_writer(
            &file,
            Cursor::new(Vec::new()),
            &mut quiet(),
            false,
            &options,
        )
        .unwrap();

        let mut archive = ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap();
        let member = archive.by_index(0).unwrap();
        assert_eq!(member.unix_mode().map(|m| m & 0o777), Some(0o755));
    }
}
