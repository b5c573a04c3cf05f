//! Utility functions for the CLI.

use glob::Pattern;
use indicatif::{ProgressBar, ProgressStyle};
use nestarc_core::{Entry, path};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Create a progress bar with standard styling.
pub fn create_progress_bar(len: u64, enable: bool) -> ProgressBar {
    if !enable {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    if let Ok(style) =
        ProgressStyle::default_bar().template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb
}

/// Check if a name matches the filter patterns.
/// - If include patterns are specified, the name must match at least one
/// - If exclude patterns are specified, the name must not match any
pub fn matches_filters(name: &str, include: &[String], exclude: &[String]) -> bool {
    let matches = |pattern: &String| Pattern::new(pattern).is_ok_and(|p| p.matches(name));

    if exclude.iter().any(matches) {
        return false;
    }
    include.is_empty() || include.iter().any(matches)
}

/// Filter entries based on include/exclude patterns.
pub fn filter_entries(entries: &[Entry], include: &[String], exclude: &[String]) -> Vec<Entry> {
    entries
        .iter()
        .filter(|e| matches_filters(&e.name, include, exclude))
        .cloned()
        .collect()
}

/// Seconds since the epoch, if the time was recorded.
pub fn unix_seconds(time: SystemTime) -> Option<i64> {
    if time == UNIX_EPOCH {
        return None;
    }
    time.duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_secs()).ok())
}

/// Space saved by compression, in percent.
pub fn savings(length: i64, compressed: i64) -> Option<f64> {
    (length > 0 && compressed >= 0).then(|| (1.0 - compressed as f64 / length as f64) * 100.0)
}

/// Where an entry lands below `output`. `..` segments cannot climb out.
pub fn output_path(output: &Path, name: &str) -> PathBuf {
    let mut target = output.to_path_buf();
    for segment in path::canonicalize(name).split('/') {
        if !segment.is_empty() {
            target.push(segment);
        }
    }
    target
}

/// JSON serializable entry data for listings.
#[derive(Debug, Serialize)]
pub struct EntryJson {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed_length: Option<i64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crc: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub is_dir: bool,
}

impl EntryJson {
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            name: entry.name.clone(),
            length: (entry.length >= 0).then_some(entry.length),
            compressed_length: (entry.compressed_length >= 0).then_some(entry.compressed_length),
            method: entry.method.name().to_string(),
            crc: entry.crc32,
            mtime: unix_seconds(entry.last_modified),
            comment: entry.comment.clone(),
            is_dir: entry.is_dir(),
        }
    }
}

fn size_column(value: i64) -> String {
    if value >= 0 {
        value.to_string()
    } else {
        "?".to_string()
    }
}

/// Print entries in a formatted table.
pub fn print_entries(entries: &[Entry], verbose: bool) {
    if !verbose {
        for entry in entries {
            println!("{}", entry.name);
        }
        return;
    }

    println!(
        "{:>10} {:>10} {:>6} {:>8}  Name",
        "Size", "Compressed", "Ratio", "Method",
    );
    println!("{}", "-".repeat(60));

    let mut total_size = 0i64;
    let mut total_compressed = 0i64;
    for entry in entries {
        let ratio = savings(entry.length, entry.compressed_length)
            .map(|r| format!("{:.1}%", r))
            .unwrap_or_else(|| "-".to_string());
        let type_prefix = if entry.is_dir() { "d " } else { "  " };

        println!(
            "{:>10} {:>10} {:>6} {:>8}  {}{}",
            size_column(entry.length),
            size_column(entry.compressed_length),
            ratio,
            entry.method.name(),
            type_prefix,
            entry.name
        );

        total_size += entry.length.max(0);
        total_compressed += entry.compressed_length.max(0);
    }

    println!("{}", "-".repeat(60));
    println!(
        "{:>10} {:>10} {:>6}           {} entries",
        total_size,
        total_compressed,
        savings(total_size, total_compressed)
            .map(|r| format!("{:.1}%", r))
            .unwrap_or_else(|| "-".to_string()),
        entries.len()
    );
}
