//! Common test fixtures for zipbox testing

use crate::TestDir;
use anyhow::Result;
use std::path::PathBuf;

/// Creates the two-file sample tree under `name`:
///
/// ```text
/// name/a.txt      "hello"
/// name/sub/b.txt  "world"
/// ```
pub fn create_sample_tree(test_dir: &TestDir, name: &str) -> Result<PathBuf> {
    let root = test_dir.create_dir(name)?;
    test_dir.create_file(&format!("{}/a.txt", name), b"hello")?;
    test_dir.create_file(&format!("{}/sub/b.txt", name), b"world")?;
    Ok(root)
}

/// Creates a wider tree with nested and empty directories
pub fn create_project_tree(test_dir: &TestDir, name: &str) -> Result<PathBuf> {
    let root = create_sample_tree(test_dir, name)?;
    test_dir.create_file(&format!("{}/README.md", name), b"# Sample\n")?;
    test_dir.create_file(&format!("{}/src/main.rs", name), b"fn main() {}\n")?;
    test_dir.create_file(&format!("{}/src/modules/mod.rs", name), b"pub mod utils;\n")?;
    test_dir.create_dir(&format!("{}/empty", name))?;
    Ok(root)
}

/// Creates `count` files of `size` bytes each under `name`
pub fn create_bulk_tree(test_dir: &TestDir, name: &str, count: usize, size: usize) -> Result<PathBuf> {
    let root = test_dir.create_dir(name)?;
    let content = vec![b'x'; size];
    for i in 0..count {
        test_dir.create_file(&format!("{}/dir{}/file{}.dat", name, i % 8, i), &content)?;
    }
    Ok(root)
}
