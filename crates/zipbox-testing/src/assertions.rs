//! Common assertions for zipbox testing

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

use crate::helpers::zip_names;

/// Asserts that two directory trees hold the same paths, file types and
/// file contents
pub fn assert_dirs_equal(dir1: &Path, dir2: &Path) -> Result<()> {
    let entries1 = collect_entries(dir1)?;
    let entries2 = collect_entries(dir2)?;

    assert_eq!(
        entries1.keys().collect::<Vec<_>>(),
        entries2.keys().collect::<Vec<_>>(),
        "Different entries in {:?} and {:?}",
        dir1,
        dir2
    );

    for (relative, content1) in &entries1 {
        assert_eq!(
            content1, &entries2[relative],
            "Content mismatch for {:?}",
            relative
        );
    }

    Ok(())
}

/// Asserts that the archive at `path` holds exactly `expected`, in order
pub fn assert_archive_names(path: &Path, expected: &[&str]) -> Result<()> {
    let names = zip_names(path)?;
    assert_eq!(names, expected, "Unexpected members in {:?}", path);
    Ok(())
}

/// Asserts that a file has specific permissions (Unix only)
#[cfg(unix)]
pub fn assert_file_permissions(path: &Path, expected: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode() & 0o777;
    assert_eq!(
        mode, expected,
        "Permission mismatch for {:?}: expected {:o}, got {:o}",
        path, expected, mode
    );
    Ok(())
}

// Relative path -> file content (None for directories)
fn collect_entries(dir: &Path) -> Result<BTreeMap<String, Option<Vec<u8>>>> {
    let mut entries = BTreeMap::new();

    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(dir)?
            .to_string_lossy()
            .replace('\\', "/");
        let content = if entry.file_type().is_file() {
            Some(std::fs::read(entry.path())?)
        } else {
            None
        };
        entries.insert(relative, content);
    }

    Ok(entries)
}
