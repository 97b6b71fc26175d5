//! Path checks that keep archive entries inside their destination root

use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};
use tracing::error;

/// Resolve a slash-normalized entry name under `base`, rejecting names that
/// could escape it.
pub fn sanitize_entry_path(base: &Path, name: &str) -> Result<PathBuf> {
    let mut result = base.to_path_buf();
    let untrusted = Path::new(name);

    for component in untrusted.components() {
        match component {
            Component::Normal(part) => {
                result.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                error!(entry = name, "Entry name contains parent directory component");
                return Err(Error::InvalidPath(format!(
                    "Path traversal attempt detected: {:?}",
                    name
                )));
            }
            Component::RootDir => {
                error!(entry = name, "Entry name is absolute");
                return Err(Error::InvalidPath(format!(
                    "Absolute path not allowed: {:?}",
                    name
                )));
            }
            Component::Prefix(_) => {
                error!(entry = name, "Entry name contains Windows prefix");
                return Err(Error::InvalidPath(format!(
                    "Windows path prefix not allowed: {:?}",
                    name
                )));
            }
        }
    }

    if result == base {
        return Err(Error::InvalidPath(format!("Empty entry name: {:?}", name)));
    }

    Ok(result)
}

/// Check that an entry name would resolve inside any destination root
pub fn validate_entry_name(name: &str) -> Result<()> {
    sanitize_entry_path(Path::new(""), name).map(|_| ())
}
