//! Helper utilities for zipbox testing

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

/// Writes a raw archive at `path`, bypassing zipbox
///
/// Members are written in the given order. `None` content makes a directory
/// member; names are stored exactly as given.
pub fn build_zip(path: &Path, members: &[(&str, Option<&[u8]>)]) -> Result<()> {
    let mut writer = ZipWriter::new(File::create(path)?);

    for (name, content) in members {
        match content {
            Some(bytes) => {
                writer.start_file(*name, SimpleFileOptions::default())?;
                writer.write_all(bytes)?;
            }
            None => {
                writer.add_directory(*name, SimpleFileOptions::default())?;
            }
        }
    }

    writer.finish()?;
    Ok(())
}

/// Member names of the archive at `path`, in stored order
pub fn zip_names(path: &Path) -> Result<Vec<String>> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index(i)?.name().to_string());
    }
    Ok(names)
}

/// Contents of the member `name` in the archive at `path`
pub fn read_member(path: &Path, name: &str) -> Result<Vec<u8>> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut file = archive
        .by_name(name)
        .with_context(|| format!("member {:?} not found in {:?}", name, path))?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    Ok(content)
}

/// Initializes a test subscriber once; honors `RUST_LOG`
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
