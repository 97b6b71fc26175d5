//! Utility functions for zipbox-core

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike};
use std::path::{Component, Path};
use std::time::{Duration, SystemTime};

/// Normalize an entry name or path string to forward slashes
pub fn normalize_name(name: &str) -> String {
    name.replace('\\', "/")
}

/// Whether a normalized entry name denotes a directory marker
pub fn is_dir_name(name: &str) -> bool {
    name.ends_with('/')
}

/// Ensure a directory name carries its trailing slash
pub fn dir_name(name: &str) -> String {
    let name = normalize_name(name);
    if is_dir_name(&name) {
        name
    } else {
        format!("{}/", name)
    }
}

/// Join an archive prefix and a child name with a single `/`
pub fn join_name(prefix: &str, child: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        child.to_string()
    } else {
        format!("{}/{}", prefix, child)
    }
}

/// Render a relative filesystem path as a slash-separated entry name
pub fn path_to_name(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Base name of a path as an entry name, falling back to the whole path
pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path_to_name(path))
}

/// Convert a filesystem timestamp to a ZIP (DOS) timestamp in local time
///
/// Returns `None` for times outside the DOS range (1980..=2107).
pub fn to_zip_time(time: SystemTime) -> Option<zip::DateTime> {
    let local: DateTime<Local> = time.into();
    zip::DateTime::from_date_and_time(
        u16::try_from(local.year()).ok()?,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}

/// Convert a Unix timestamp to a ZIP (DOS) timestamp in local time
pub fn unix_to_zip_time(secs: i64) -> Option<zip::DateTime> {
    let secs = u64::try_from(secs).ok()?;
    to_zip_time(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
}

/// Convert a ZIP (DOS) timestamp, read as local time, to a Unix timestamp
pub fn from_zip_time(dt: &zip::DateTime) -> Option<i64> {
    let naive = NaiveDate::from_ymd_opt(dt.year() as i32, dt.month() as u32, dt.day() as u32)?
        .and_hms_opt(dt.hour() as u32, dt.minute() as u32, dt.second() as u32)?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.timestamp())
}
