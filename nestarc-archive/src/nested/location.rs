//! Splitting locations at nested-container boundaries.
//!
//! A location such as `docs/inner.zip/sub/` crosses into `docs/inner.zip`
//! and then names `sub/` inside it. A segment is a container when every
//! format its suffixes name is registered; `logs.tar.gz` is therefore a
//! plain file unless a TAR backend is present.

use crate::registry::Registry;
use nestarc_core::entry::Entry;
use nestarc_core::error::{ArchiveError, Result};
use nestarc_core::format::Format;
use nestarc_core::path;

/// A location split into container boundaries and a trailing remainder.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NestedLocation {
    /// Entry names of each nested container, each relative to the one
    /// before it.
    pub boundaries: Vec<String>,
    /// Directory inside the innermost container, empty or ending in `/`.
    pub tail: String,
}

impl NestedLocation {
    /// Whether the location stays in the outermost container.
    pub fn is_outer(&self) -> bool {
        self.boundaries.is_empty()
    }

    /// Cache key of the first `depth` boundaries.
    pub fn key(&self, depth: usize) -> String {
        self.boundaries[..depth].join("/")
    }

    /// Prefix that makes innermost names absolute.
    pub fn prefix(&self) -> String {
        if self.boundaries.is_empty() {
            String::new()
        } else {
            format!("{}/", self.boundaries.join("/"))
        }
    }
}

/// Whether a name denotes a container the registry can open.
pub fn is_container(registry: &Registry, name: &str) -> bool {
    let formats = Format::from_file_name(name);
    !formats.is_empty() && formats.iter().all(|f| registry.is_supported(*f))
}

/// Whether an entry is a file that can be opened as a nested container.
pub fn is_container_entry(registry: &Registry, entry: &Entry) -> bool {
    entry.is_file() && is_container(registry, &entry.name)
}

/// Whether any segment of `location` other than the last is a container.
pub fn is_in_nested_container(registry: &Registry, location: &str) -> bool {
    let normalized = path::normalize(location);
    let mut segments: Vec<&str> = normalized.split('/').collect();
    segments.pop();
    segments
        .iter()
        .any(|segment| !segment.is_empty() && is_container(registry, segment))
}

/// Split a directory location (empty or ending in `/`) at container
/// boundaries.
pub fn split_location(registry: &Registry, location: &str) -> NestedLocation {
    let normalized = path::normalize(location);
    let mut split = NestedLocation::default();
    let mut pending: Vec<&str> = Vec::new();

    for segment in normalized.trim_matches('/').split('/') {
        if segment.is_empty() {
            continue;
        }
        pending.push(segment);
        if is_container(registry, segment) {
            split.boundaries.push(pending.join("/"));
            pending.clear();
        }
    }

    if !pending.is_empty() {
        split.tail = format!("{}/", pending.join("/"));
    }
    split
}

/// Check and normalize a listing location.
///
/// The root (`""`, `.`, `/`) becomes the empty string; anything else must
/// name a directory by ending in a separator.
pub fn listing_location(location: &str) -> Result<String> {
    if path::is_root_location(location) {
        return Ok(String::new());
    }
    if !path::ends_with_separator(location) {
        return Err(ArchiveError::out_of_range("location", location));
    }
    Ok(path::normalize(location).trim_start_matches('/').to_string())
}

/// The entries directly under `tail`, plus a virtual directory for every
/// deeper path that has no explicit directory entry.
pub fn children(entries: &[Entry], tail: &str) -> Vec<Entry> {
    let mut listed: Vec<Entry> = Vec::new();
    let mut virtual_dirs: Vec<String> = Vec::new();

    for entry in entries {
        let name = path::normalize(&entry.name);
        let name = name.trim_start_matches('/');
        let Some(rest) = path::strip_prefix_ignore_case(name, tail) else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        match rest.find('/') {
            Some(pos) if pos + 1 < rest.len() => {
                virtual_dirs.push(format!("{}{}/", &name[..tail.len()], &rest[..=pos]));
            }
            _ => listed.push(entry.clone()),
        }
    }

    for dir in virtual_dirs {
        let exists = listed.iter().any(|e| path::paths_equal(&e.name, &dir));
        if !exists {
            listed.push(Entry::directory(dir));
        }
    }
    listed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_container() {
        let registry = Registry::with_builtins();
        assert!(is_container(&registry, "inner.zip"));
        assert!(is_container(&registry, "dir/INNER.GZ"));
        assert!(is_container(&registry, "twice.zip.gz"));
        assert!(!is_container(&registry, "logs.tar.gz"));
        assert!(!is_container(&registry, "notes.txt"));
        assert!(!is_container(&registry, "README"));
    }

    #[test]
    fn test_is_in_nested_container() {
        let registry = Registry::with_builtins();
        assert!(is_in_nested_container(&registry, "inner.zip/file.txt"));
        assert!(is_in_nested_container(&registry, "a/inner.gz/"));
        assert!(!is_in_nested_container(&registry, "a/inner.zip"));
        assert!(!is_in_nested_container(&registry, "a/b/c.txt"));
    }

    #[test]
    fn test_split_location() {
        let registry = Registry::with_builtins();

        let split = split_location(&registry, "a/b.zip/c/d.gz/e/");
        assert_eq!(split.boundaries, vec!["a/b.zip", "c/d.gz"]);
        assert_eq!(split.tail, "e/");
        assert_eq!(split.key(1), "a/b.zip");
        assert_eq!(split.prefix(), "a/b.zip/c/d.gz/");

        let split = split_location(&registry, "");
        assert!(split.is_outer());
        assert_eq!(split.tail, "");

        let split = split_location(&registry, "docs\\more/");
        assert!(split.is_outer());
        assert_eq!(split.tail, "docs/more/");
    }

    #[test]
    fn test_listing_location() {
        assert_eq!(listing_location("").unwrap(), "");
        assert_eq!(listing_location("/").unwrap(), "");
        assert_eq!(listing_location("a\\b\\").unwrap(), "a/b/");
        assert!(matches!(
            listing_location("a/b"),
            Err(ArchiveError::ArgumentOutOfRange { .. })
        ));
    }

    #[test]
    fn test_children_synthesises_directories() {
        let entries = vec![
            Entry::file("a/b/c.rom", 4),
            Entry::file("top.txt", 1),
            Entry::directory("x/"),
            Entry::file("x/y.txt", 1),
        ];

        let mut root: Vec<String> = children(&entries, "").into_iter().map(|e| e.name).collect();
        root.sort();
        assert_eq!(root, vec!["a/", "top.txt", "x/"]);

        let level = children(&entries, "a/");
        assert_eq!(level.len(), 1);
        assert_eq!(level[0].name, "a/b/");
        assert!(level[0].is_dir());

        let level = children(&entries, "a/b/");
        assert_eq!(level[0].name, "a/b/c.rom");

        let level = children(&entries, "X/");
        assert_eq!(level[0].name, "x/y.txt");
    }
}
