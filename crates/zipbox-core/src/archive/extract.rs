//! Archive → filesystem transfer

use super::{set_mode, EntryMetadata, Visitor};
use crate::config::Config;
use crate::security::sanitize_entry_path;
use crate::utils::{from_zip_time, is_dir_name, normalize_name};
use crate::Result;
use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

/// Options for extracting entries
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Restore unix permissions recorded in the archive
    pub preserve_permissions: bool,
    /// Restore modification times recorded in the archive
    pub preserve_timestamps: bool,
}

impl From<&Config> for ExtractOptions {
    fn from(config: &Config) -> Self {
        Self {
            preserve_permissions: config.preserve_permissions,
            preserve_timestamps: config.preserve_timestamps,
        }
    }
}

/// Write one file entry under `dest_root`
///
/// Creates the parent directories, copies every byte from `reader` and
/// restores metadata as configured. Returns the written path.
pub fn extract_entry(
    reader: &mut dyn Read,
    name: &str,
    meta: &EntryMetadata,
    dest_root: &Path,
    options: &ExtractOptions,
) -> Result<PathBuf> {
    let target = sanitize_entry_path(dest_root, name)?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut output = File::create(&target)?;
    let written = io::copy(reader, &mut output)?;
    drop(output);

    debug!(entry = name, bytes = written, "Extracted entry");
    restore_metadata(&target, meta, options)?;
    Ok(target)
}

fn restore_metadata(target: &Path, meta: &EntryMetadata, options: &ExtractOptions) -> Result<()> {
    if options.preserve_permissions {
        if let Some(mode) = meta.mode.map(|m| m & 0o7777).filter(|m| *m != 0) {
            set_mode(target, mode)?;
        }
    }

    if options.preserve_timestamps {
        if let Some(mtime) = meta.modified {
            filetime::set_file_mtime(target, filetime::FileTime::from_unix_time(mtime, 0))?;
        }
    }

    Ok(())
}

/// Materialize every entry, or only the `selected` ones, under `dest_root`
///
/// Names are slash-normalized before they are compared or used. Entries
/// are processed in stored order and `visitor` runs before each one; its
/// first error aborts the extraction.
pub fn extract_all_or_selected<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    dest_root: &Path,
    visitor: &mut dyn Visitor,
    selected: &[&str],
    options: &ExtractOptions,
) -> Result<()> {
    let selected: Vec<String> = selected.iter().map(|s| normalize_name(s)).collect();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let name = normalize_name(file.name());

        if !selected.is_empty() && !selected.iter().any(|s| *s == name) {
            continue;
        }

        let meta = EntryMetadata {
            is_dir: file.is_dir() || is_dir_name(&name),
            size: file.size(),
            mode: file.unix_mode().map(|m| m & 0o7777),
            modified: file.last_modified().as_ref().and_then(from_zip_time),
        };

        visitor.visit(Path::new(&name), &meta)?;

        if meta.is_dir {
            fs::create_dir_all(sanitize_entry_path(dest_root, &name)?)?;
            continue;
        }

        extract_entry(&mut file, &name, &meta, dest_root, options)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{LogVisitor, VisitAction};
    use std::io::{Cursor, Write};
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn sample_archive() -> ZipArchive<Cursor<Vec<u8>>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("a.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"hello").unwrap();
        writer
            .add_directory("sub/", SimpleFileOptions::default())
            .unwrap();
        writer
            .start_file("sub/b.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"world").unwrap();
        let cursor = writer.finish().unwrap();
        ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap()
    }

    #[test]
    fn test_extract_entry_creates_parents() {
        let temp_dir = TempDir::new().unwrap();
        let mut content: &[u8] = b"nested";
        let meta = EntryMetadata {
            size: 6,
            ..Default::default()
        };

        let path = extract_entry(
            &mut content,
            "x/y/z.txt",
            &meta,
            temp_dir.path(),
            &ExtractOptions::default(),
        )
        .unwrap();

        assert_eq!(path, temp_dir.path().join("x/y/z.txt"));
        assert_eq!(fs::read(path).unwrap(), b"nested");
    }

    #[test]
    fn test_extract_entry_rejects_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let mut content: &[u8] = b"evil";
        let result = extract_entry(
            &mut content,
            "../evil.txt",
            &EntryMetadata::default(),
            temp_dir.path(),
            &ExtractOptions::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_extract_all() {
        let temp_dir = TempDir::new().unwrap();
        let mut archive = sample_archive();
        let mut visitor = LogVisitor::new(false, VisitAction::Extract);

        extract_all_or_selected(
            &mut archive,
            temp_dir.path(),
            &mut visitor,
            &[],
            &ExtractOptions::default(),
        )
        .unwrap();

        assert_eq!(fs::read(temp_dir.path().join("a.txt")).unwrap(), b"hello");
        assert_eq!(fs::read(temp_dir.path().join("sub/b.txt")).unwrap(), b"world");
    }

    #[test]
    fn test_extract_selected_skips_visitor_for_others() {
        let temp_dir = TempDir::new().unwrap();
        let mut archive = sample_archive();
        let mut visited = Vec::new();
        let mut visitor = |path: &Path, _meta: &EntryMetadata| -> Result<()> {
            visited.push(path.to_string_lossy().into_owned());
            Ok(())
        };

        extract_all_or_selected(
            &mut archive,
            temp_dir.path(),
            &mut visitor,
            &["sub/b.txt"],
            &ExtractOptions::default(),
        )
        .unwrap();

        assert_eq!(visited, vec!["sub/b.txt".to_string()]);
        assert!(!temp_dir.path().join("a.txt").exists());
        assert!(temp_dir.path().join("sub/b.txt").exists());
    }
}
