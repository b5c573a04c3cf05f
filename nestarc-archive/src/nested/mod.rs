//! Navigation into containers nested inside other containers.
//!
//! Locations are `/`-separated paths relative to the outermost accessor.
//! Any segment naming a container the registry can open is crossed
//! transparently, so `bundle/inner.zip/docs/` lists `docs/` inside the ZIP
//! stored at `bundle/inner.zip`. Names in results are always absolute with
//! respect to the outermost accessor.
//!
//! A nested container is buffered in memory when both it and its parent are
//! seekable formats (ZIP inside ZIP). Otherwise the entry is extracted into
//! a private temporary directory that is deleted when the nested accessor
//! is released.
//!
//! ## Example
//!
//! ```rust
//! use flate2::{Compression, GzBuilder};
//! use nestarc_archive::nested;
//! use nestarc_archive::zip::{ZipArchive, ZipWriter};
//! use nestarc_core::traits::AccessMode;
//! use std::io::{Cursor, Write};
//!
//! let mut gz = GzBuilder::new()
//!     .filename("payload.bin")
//!     .write(Vec::new(), Compression::default());
//! gz.write_all(b"payload").unwrap();
//!
//! let mut writer = ZipWriter::new(Vec::new());
//! writer.add_file("notes.txt", b"notes").unwrap();
//! writer.add_file("inner.gz", &gz.finish().unwrap()).unwrap();
//! let bytes = writer.finish().unwrap();
//!
//! let mut outer = ZipArchive::new(Box::new(Cursor::new(bytes)), None, AccessMode::Read).unwrap();
//! let names: Vec<String> = nested::list_entries(&mut outer, "", false, true)
//!     .unwrap()
//!     .into_iter()
//!     .map(|e| e.name)
//!     .collect();
//! assert_eq!(names, ["inner.gz/payload.bin", "notes.txt"]);
//! ```

mod archive;
mod location;

pub use archive::NestedArchive;
pub use location::{
    NestedLocation, children, is_container, is_container_entry, is_in_nested_container,
    listing_location, split_location,
};

use crate::config::ArchiveConfig;
use crate::registry::{OpenRequest, Registry};
use log::{debug, warn};
use nestarc_core::entry::Entry;
use nestarc_core::error::{ArchiveError, Result};
use nestarc_core::format::Format;
use nestarc_core::path;
use nestarc_core::stream::BoxStream;
use nestarc_core::traits::{AccessMode, ArchiveAccess};
use std::collections::{HashSet, VecDeque};
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::PathBuf;

/// List the entries under `location` using the global registry.
///
/// See [`Navigator::list_entries`].
pub fn list_entries(
    accessor: &mut dyn ArchiveAccess,
    location: &str,
    include_containers: bool,
    recurse: bool,
) -> Result<Vec<Entry>> {
    let config = ArchiveConfig::default();
    Navigator::new(Registry::global(), &config).list_entries(
        accessor,
        location,
        include_containers,
        recurse,
    )
}

/// Open the nested container named by `location` using the global registry.
///
/// See [`Navigator::resolve_nested_archive`].
pub fn resolve_nested_archive(
    accessor: &mut dyn ArchiveAccess,
    location: &str,
) -> Result<(NestedArchive, String)> {
    let config = ArchiveConfig::default();
    Navigator::new(Registry::global(), &config).resolve_nested_archive(accessor, location)
}

/// Read one entry anywhere below `accessor` using the global registry.
pub fn read_nested_entry(accessor: &mut dyn ArchiveAccess, location: &str) -> Result<Vec<u8>> {
    let config = ArchiveConfig::default();
    Navigator::new(Registry::global(), &config).read_entry(accessor, location)
}

/// An opened layer; `None` marks a container that holds no entries.
struct CachedLayer {
    key: String,
    archive: Option<NestedArchive>,
}

/// Opens one nested layer at a time and keeps counts for diagnostics.
struct LayerOpener<'a> {
    registry: &'a Registry,
    config: &'a ArchiveConfig,
    layers_opened: usize,
    extractions: usize,
}

impl LayerOpener<'_> {
    /// Open the container stored at `name` in `parent`, peeling every
    /// further format its suffixes name (`x.zip.gz` opens the GZIP, then the
    /// ZIP inside it).
    ///
    /// Returns `None` when a layer holds no entries.
    fn open(
        &mut self,
        parent: &mut dyn ArchiveAccess,
        name: &str,
        location: &str,
    ) -> Result<Option<NestedArchive>> {
        let entry = parent
            .find_entry(name)?
            .filter(Entry::is_file)
            .ok_or_else(|| ArchiveError::not_found(location))?;
        let formats = Format::from_file_name(&entry.name);
        let Some((&outermost, rest)) = formats.split_first() else {
            return Err(ArchiveError::not_supported(format!(
                "{} is not a container",
                location
            )));
        };

        let Some(mut layer) = self.open_single(parent, &entry, outermost, location)? else {
            return Ok(None);
        };
        let mut stem = strip_extension(entry.file_name()).to_string();
        for &format in rest {
            let inner = pick_inner_entry(&mut layer, &stem)?
                .ok_or_else(|| ArchiveError::not_found(format!("{}/{}", location, stem)))?;
            let Some(next) = self.open_single(&mut layer, &inner, format, location)? else {
                return Ok(None);
            };
            stem = strip_extension(&stem).to_string();
            layer = next.with_parent(layer);
        }
        Ok(Some(layer))
    }

    /// Like [`LayerOpener::open`], but a container without entries is an
    /// error.
    fn open_required(
        &mut self,
        parent: &mut dyn ArchiveAccess,
        name: &str,
        location: &str,
    ) -> Result<NestedArchive> {
        self.open(parent, name, location)?.ok_or_else(|| {
            ArchiveError::invalid_data(format!("{} contains no entries", location))
        })
    }

    fn open_single(
        &mut self,
        parent: &mut dyn ArchiveAccess,
        entry: &Entry,
        format: Format,
        location: &str,
    ) -> Result<Option<NestedArchive>> {
        let extract = self.config.extract_seekable_nested
            || !parent.id().format.is_seekable()
            || !format.is_seekable();

        let (stream, root, temp_dir) = if extract {
            let dir = self.config.create_temp_dir()?;
            let target = dir.path().join(relative_path(&entry.name));
            if let Some(folder) = target.parent() {
                fs::create_dir_all(folder)?;
            }
            {
                let mut reader = parent.open_entry(entry)?;
                let mut file = File::create(&target)?;
                io::copy(&mut reader, &mut file).map_err(ArchiveError::from_io)?;
            }
            self.extractions += 1;
            debug!("extracted {} to {}", location, target.display());
            let stream: BoxStream = Box::new(File::open(&target)?);
            (stream, Some(target), Some(dir))
        } else {
            let data = parent.read_entry(entry)?;
            debug!("buffered {} ({} bytes)", location, data.len());
            let stream: BoxStream = Box::new(Cursor::new(data));
            (stream, None, None)
        };

        let request = OpenRequest {
            stream,
            root_location: root,
            mode: AccessMode::Read,
            max_gzip_members: self.config.max_gzip_members,
        };
        // Construction only reports invalid data for a container with no
        // entries; any extraction directory goes with `temp_dir`.
        let inner = match self
            .registry
            .open(format, self.config.implementation_for(format), request)
        {
            Ok(inner) => inner,
            Err(ArchiveError::InvalidData { message }) => {
                debug!("{} holds no entries: {}", location, message);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        self.layers_opened += 1;
        Ok(Some(NestedArchive::new(inner, temp_dir, location)))
    }
}

/// Walks nested containers below an outer accessor.
///
/// Nested accessors opened during one call are cached by location and all
/// released, deepest first, before the call returns.
pub struct Navigator<'a> {
    opener: LayerOpener<'a>,
    cache: Vec<CachedLayer>,
}

impl<'a> Navigator<'a> {
    /// Create a navigator over a registry and configuration.
    pub fn new(registry: &'a Registry, config: &'a ArchiveConfig) -> Self {
        Self {
            opener: LayerOpener {
                registry,
                config,
                layers_opened: 0,
                extractions: 0,
            },
            cache: Vec::new(),
        }
    }

    /// Nested accessors opened so far.
    pub fn layers_opened(&self) -> usize {
        self.opener.layers_opened
    }

    /// Entries extracted to disk so far.
    pub fn extractions(&self) -> usize {
        self.opener.extractions
    }

    /// List entries under a directory location.
    ///
    /// `location` is the root (`""`, `.` or `/`) or a path ending in a
    /// separator. Virtual directory entries are added for paths that only
    /// exist as prefixes of deeper names. With `recurse` every directory and
    /// nested container is walked breadth first. Without
    /// `include_containers` directories and nested containers are left out
    /// of the result, which is sorted by name.
    ///
    /// A nested container with no entries lists as empty. One that fails to
    /// open for any other reason fails the whole listing.
    pub fn list_entries(
        &mut self,
        accessor: &mut dyn ArchiveAccess,
        location: &str,
        include_containers: bool,
        recurse: bool,
    ) -> Result<Vec<Entry>> {
        let location = listing_location(location)?;
        let walked = self.walk(accessor, &location, recurse);
        self.release_cache();

        let mut entries = walked?;
        if !include_containers {
            let registry = self.opener.registry;
            entries.retain(|e| e.is_file() && !is_container_entry(registry, e));
        }
        entries.sort_by(|a, b| path::compare(&a.name, &b.name));
        Ok(entries)
    }

    /// Read an entry anywhere below the accessor.
    pub fn read_entry(
        &mut self,
        accessor: &mut dyn ArchiveAccess,
        location: &str,
    ) -> Result<Vec<u8>> {
        let result = self.read_located(accessor, location);
        self.release_cache();
        result
    }

    /// Read several entries while sharing the nested containers opened for
    /// them.
    ///
    /// `visit` gets each location with its contents, in order. The first
    /// error stops the walk.
    pub fn read_each<F>(
        &mut self,
        accessor: &mut dyn ArchiveAccess,
        locations: &[String],
        mut visit: F,
    ) -> Result<()>
    where
        F: FnMut(&str, Vec<u8>) -> Result<()>,
    {
        let mut result = Ok(());
        for location in locations {
            result = self
                .read_located(accessor, location)
                .and_then(|data| visit(location.as_str(), data));
            if result.is_err() {
                break;
            }
        }
        self.release_cache();
        result
    }

    fn read_located(
        &mut self,
        accessor: &mut dyn ArchiveAccess,
        location: &str,
    ) -> Result<Vec<u8>> {
        let normalized = path::normalize(location);
        let normalized = normalized.trim_start_matches('/');
        if normalized.is_empty() || normalized.ends_with('/') {
            return Err(ArchiveError::out_of_range("location", location));
        }
        let (dir, name) = match normalized.rfind('/') {
            Some(pos) => (&normalized[..=pos], &normalized[pos + 1..]),
            None => ("", normalized),
        };

        self.read_in(accessor, dir, name, location)
    }

    /// Open the nested container named by `location`.
    ///
    /// Returns the innermost container and the part of `location` left
    /// inside it. Intermediate containers are owned by the returned
    /// accessor and released with it. Nothing is cached.
    pub fn resolve_nested_archive(
        &mut self,
        accessor: &mut dyn ArchiveAccess,
        location: &str,
    ) -> Result<(NestedArchive, String)> {
        let mut normalized = path::normalize(location)
            .trim_start_matches('/')
            .to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let split = split_location(self.opener.registry, &normalized);

        let mut boundaries = split.boundaries.iter().enumerate();
        let Some((_, first)) = boundaries.next() else {
            return Err(ArchiveError::not_found(location));
        };
        let mut current = self.opener.open_required(accessor, first, &split.key(1))?;
        for (index, name) in boundaries {
            let next = self
                .opener
                .open_required(&mut current, name, &split.key(index + 1))?;
            current = next.with_parent(current);
        }
        Ok((current, split.tail))
    }

    fn walk(
        &mut self,
        accessor: &mut dyn ArchiveAccess,
        location: &str,
        recurse: bool,
    ) -> Result<Vec<Entry>> {
        let mut listed = self.list_level(accessor, location)?;
        if !recurse {
            return Ok(listed);
        }

        let mut visited: HashSet<String> = listed.iter().map(|e| visit_key(&e.name)).collect();
        let mut queue: VecDeque<Entry> = listed
            .iter()
            .filter(|e| self.is_expandable(e))
            .cloned()
            .collect();

        while let Some(entry) = queue.pop_front() {
            let child_location = if entry.is_dir() {
                entry.name.clone()
            } else {
                format!("{}/", entry.name)
            };
            for child in self.list_level(accessor, &child_location)? {
                if !visited.insert(visit_key(&child.name)) {
                    continue;
                }
                if self.is_expandable(&child) {
                    queue.push_back(child.clone());
                }
                listed.push(child);
            }
        }
        Ok(listed)
    }

    fn list_level(&mut self, accessor: &mut dyn ArchiveAccess, location: &str) -> Result<Vec<Entry>> {
        let split = split_location(self.opener.registry, location);
        if split.is_outer() {
            let entries = accessor.entries()?;
            return Ok(children(&entries, &split.tail));
        }

        let index = self.resolve_cached(accessor, &split)?;
        let entries = match self.cache[index].archive.as_mut() {
            Some(archive) => archive.entries()?,
            None => Vec::new(),
        };
        let prefix = split.prefix();
        Ok(children(&entries, &split.tail)
            .iter()
            .map(|e| e.with_prefix(&prefix))
            .collect())
    }

    fn read_in(
        &mut self,
        accessor: &mut dyn ArchiveAccess,
        dir: &str,
        name: &str,
        location: &str,
    ) -> Result<Vec<u8>> {
        let split = split_location(self.opener.registry, dir);
        let inner_name = format!("{}{}", split.tail, name);

        let target: &mut dyn ArchiveAccess = if split.is_outer() {
            accessor
        } else {
            let index = self.resolve_cached(accessor, &split)?;
            match self.cache[index].archive.as_mut() {
                Some(archive) => archive as &mut dyn ArchiveAccess,
                None => return Err(ArchiveError::not_found(location)),
            }
        };
        let entry = target
            .find_entry(&inner_name)?
            .filter(Entry::is_file)
            .ok_or_else(|| ArchiveError::not_found(location))?;
        target.read_entry(&entry)
    }

    /// Index of the cached accessor for every boundary of `split`, opening
    /// the layers not cached yet.
    fn resolve_cached(
        &mut self,
        accessor: &mut dyn ArchiveAccess,
        split: &NestedLocation,
    ) -> Result<usize> {
        let mut index = None;
        for depth in 1..=split.boundaries.len() {
            let key = split.key(depth);
            if let Some(found) = self.cache.iter().position(|c| path::paths_equal(&c.key, &key)) {
                index = Some(found);
                continue;
            }

            let name = &split.boundaries[depth - 1];
            let archive = match index {
                None => self.opener.open(accessor, name, &key)?,
                Some(parent) => match self.cache[parent].archive.as_mut() {
                    Some(parent) => self.opener.open(parent, name, &key)?,
                    None => return Err(ArchiveError::not_found(key)),
                },
            };
            self.cache.push(CachedLayer { key, archive });
            index = Some(self.cache.len() - 1);
        }
        index.ok_or_else(|| ArchiveError::not_found(split.prefix()))
    }

    fn is_expandable(&self, entry: &Entry) -> bool {
        entry.is_dir() || is_container_entry(self.opener.registry, entry)
    }

    fn release_cache(&mut self) {
        while let Some(mut layer) = self.cache.pop() {
            let Some(archive) = layer.archive.as_mut() else {
                continue;
            };
            if let Err(e) = archive.release() {
                warn!("failed to release {}: {}", layer.key, e);
            }
        }
    }
}

impl Drop for Navigator<'_> {
    fn drop(&mut self) {
        self.release_cache();
    }
}

fn visit_key(name: &str) -> String {
    path::normalize(name).to_lowercase()
}

fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if dot > 0 => &name[..dot],
        _ => name,
    }
}

/// Entry name as a relative path that cannot leave the extraction directory.
fn relative_path(name: &str) -> PathBuf {
    path::canonicalize(name)
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// The entry a peeled layer unwraps to: the file named after the outer
/// name's stem, or the only file present.
fn pick_inner_entry(layer: &mut NestedArchive, stem: &str) -> Result<Option<Entry>> {
    let files: Vec<Entry> = layer.entries()?.into_iter().filter(Entry::is_file).collect();
    if let Some(named) = files.iter().find(|e| path::paths_equal(e.file_name(), stem)) {
        return Ok(Some(named.clone()));
    }
    if files.len() == 1 {
        return Ok(files.into_iter().next());
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::{ZipArchive, ZipWriter};
    use flate2::{Compression, GzBuilder};
    use std::io::Write;

    fn gzip(name: &str, data: &[u8]) -> Vec<u8> {
        let mut encoder = GzBuilder::new()
            .filename(name)
            .write(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn zip(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Vec::new());
        for (name, data) in files {
            writer.add_file(name, data).unwrap();
        }
        writer.finish().unwrap()
    }

    fn open(bytes: Vec<u8>) -> ZipArchive {
        ZipArchive::new(Box::new(Cursor::new(bytes)), None, AccessMode::Read).unwrap()
    }

    fn names(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    fn sample() -> ZipArchive {
        let inner_gz = gzip("payload.bin", b"payload");
        open(zip(&[("notes.txt", b"notes".as_slice()), ("inner.gz", inner_gz.as_slice())]))
    }

    #[test]
    fn test_recursive_listing_crosses_gzip() {
        let registry = Registry::with_builtins();
        let root = tempfile::tempdir().unwrap();
        let config = ArchiveConfig {
            temp_root: Some(root.path().to_path_buf()),
            ..ArchiveConfig::default()
        };
        let mut outer = sample();
        let mut navigator = Navigator::new(&registry, &config);

        let entries = navigator.list_entries(&mut outer, "", false, true).unwrap();
        assert_eq!(names(&entries), ["inner.gz/payload.bin", "notes.txt"]);
        assert_eq!(navigator.extractions(), 1);
        assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);

        let entries = navigator.list_entries(&mut outer, "", true, true).unwrap();
        assert_eq!(
            names(&entries),
            ["inner.gz", "inner.gz/payload.bin", "notes.txt"]
        );
    }

    #[test]
    fn test_single_level_listing() {
        let registry = Registry::with_builtins();
        let config = ArchiveConfig::default();
        let mut outer = sample();
        let mut navigator = Navigator::new(&registry, &config);

        let entries = navigator.list_entries(&mut outer, "/", true, false).unwrap();
        assert_eq!(names(&entries), ["inner.gz", "notes.txt"]);
        assert_eq!(navigator.layers_opened(), 0);

        let entries = navigator.list_entries(&mut outer, "inner.gz/", true, false).unwrap();
        assert_eq!(names(&entries), ["inner.gz/payload.bin"]);
        assert_eq!(entries[0].length, 7);
    }

    #[test]
    fn test_virtual_directories() {
        let mut outer = open(zip(&[("a/b/c.rom", b"rom!".as_slice())]));

        let entries = list_entries(&mut outer, "", true, false).unwrap();
        assert_eq!(names(&entries), ["a/"]);
        assert!(entries[0].is_dir());

        let entries = list_entries(&mut outer, "a/", true, false).unwrap();
        assert_eq!(names(&entries), ["a/b/"]);

        let entries = list_entries(&mut outer, "", true, true).unwrap();
        assert_eq!(names(&entries), ["a/", "a/b/", "a/b/c.rom"]);

        let entries = list_entries(&mut outer, "", false, true).unwrap();
        assert_eq!(names(&entries), ["a/b/c.rom"]);
    }

    #[test]
    fn test_cache_reused_within_walk() {
        let deep = gzip("deep.txt", b"deep");
        let inner = zip(&[("sub/x.txt", b"x".as_slice()), ("deep.gz", deep.as_slice())]);
        let mut outer = open(zip(&[("inner.zip", inner.as_slice())]));

        let registry = Registry::with_builtins();
        let config = ArchiveConfig::default();
        let mut navigator = Navigator::new(&registry, &config);
        let entries = navigator.list_entries(&mut outer, "", false, true).unwrap();

        assert_eq!(
            names(&entries),
            ["inner.zip/deep.gz/deep.txt", "inner.zip/sub/x.txt"]
        );
        assert_eq!(navigator.layers_opened(), 2);
        assert_eq!(navigator.extractions(), 1);
    }

    #[test]
    fn test_multi_suffix_peels_layers() {
        let inner = zip(&[("leaf.txt", b"leaf".as_slice())]);
        let wrapped = gzip("twice.zip", &inner);
        let mut outer = open(zip(&[("twice.zip.gz", wrapped.as_slice())]));

        let registry = Registry::with_builtins();
        let config = ArchiveConfig::default();
        let mut navigator = Navigator::new(&registry, &config);
        let entries = navigator.list_entries(&mut outer, "", false, true).unwrap();
        assert_eq!(names(&entries), ["twice.zip.gz/leaf.txt"]);
        assert_eq!(navigator.layers_opened(), 2);
        assert_eq!(navigator.extractions(), 2);

        let data = navigator.read_entry(&mut outer, "twice.zip.gz/leaf.txt").unwrap();
        assert_eq!(data, b"leaf");
    }

    #[test]
    fn test_read_each_shares_extraction() {
        let registry = Registry::with_builtins();
        let config = ArchiveConfig::default();
        let first = gzip("a.txt", b"first");
        let second = gzip("b.txt", b"second");
        let mut joined = first.clone();
        joined.extend_from_slice(&second);
        let mut outer = open(zip(&[("pair.gz", joined.as_slice())]));

        let mut navigator = Navigator::new(&registry, &config);
        let locations = vec!["pair.gz/a.txt".to_string(), "pair.gz/b.txt".to_string()];
        let mut seen = Vec::new();
        navigator
            .read_each(&mut outer, &locations, |location, data| {
                seen.push((location.to_string(), data));
                Ok(())
            })
            .unwrap();

        assert_eq!(seen[0], ("pair.gz/a.txt".to_string(), b"first".to_vec()));
        assert_eq!(seen[1], ("pair.gz/b.txt".to_string(), b"second".to_vec()));
        assert_eq!(navigator.extractions(), 1);
    }

    #[test]
    fn test_read_nested_entry() {
        let mut outer = sample();
        assert_eq!(
            read_nested_entry(&mut outer, "inner.gz/payload.bin").unwrap(),
            b"payload"
        );
        assert_eq!(read_nested_entry(&mut outer, "notes.txt").unwrap(), b"notes");
        assert!(matches!(
            read_nested_entry(&mut outer, "inner.gz/missing.bin"),
            Err(ArchiveError::NotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_nested_archive() {
        let deep = gzip("deep.txt", b"deep");
        let inner = zip(&[("sub/x.txt", b"x".as_slice()), ("deep.gz", deep.as_slice())]);
        let mut outer = open(zip(&[("inner.zip", inner.as_slice())]));

        let (mut nested, tail) = resolve_nested_archive(&mut outer, "inner.zip/sub/").unwrap();
        assert!(nested.is_nested());
        assert_eq!(nested.location(), "inner.zip");
        assert_eq!(tail, "sub/");
        assert!(nested.parent().is_none());
        assert!(nested.find_entry("sub/x.txt").unwrap().is_some());

        let (mut deepest, tail) = resolve_nested_archive(&mut outer, "inner.zip/deep.gz").unwrap();
        assert_eq!(tail, "");
        assert_eq!(deepest.id().format, Format::GZip);
        assert_eq!(deepest.parent().unwrap().location(), "inner.zip");
        let temp = deepest.temp_dir().unwrap().to_path_buf();
        assert!(temp.exists());
        deepest.release().unwrap();
        assert!(!temp.exists());
    }

    #[test]
    fn test_errors() {
        let mut outer = sample();
        assert!(matches!(
            resolve_nested_archive(&mut outer, "missing.zip/"),
            Err(ArchiveError::NotFound { .. })
        ));
        assert!(matches!(
            resolve_nested_archive(&mut outer, "notes.txt/"),
            Err(ArchiveError::NotFound { .. })
        ));
        assert!(matches!(
            list_entries(&mut outer, "notes.txt", true, false),
            Err(ArchiveError::ArgumentOutOfRange { .. })
        ));
    }

    #[test]
    fn test_relative_path_stays_inside() {
        assert_eq!(relative_path("../../etc/passwd"), PathBuf::from("etc/passwd"));
        assert_eq!(relative_path("/a//b.gz"), PathBuf::from("a/b.gz"));
        assert_eq!(strip_extension("x.zip.gz"), "x.zip");
        assert_eq!(strip_extension(".hidden"), ".hidden");
    }

    #[test]
    fn test_empty_nested_zip_lists_as_empty() {
        let empty = ZipWriter::new(Vec::new()).finish().unwrap();
        assert_eq!(empty.len(), 22);
        let mut outer = open(zip(&[
            ("empty.zip", empty.as_slice()),
            ("notes.txt", b"notes".as_slice()),
        ]));

        let registry = Registry::with_builtins();
        let config = ArchiveConfig::default();
        let mut navigator = Navigator::new(&registry, &config);
        let entries = navigator.list_entries(&mut outer, "", true, true).unwrap();
        assert_eq!(names(&entries), ["empty.zip", "notes.txt"]);
        assert_eq!(navigator.layers_opened(), 0);

        assert!(navigator.list_entries(&mut outer, "empty.zip/", true, false).unwrap().is_empty());
        assert!(matches!(
            navigator.read_entry(&mut outer, "empty.zip/missing.txt"),
            Err(ArchiveError::NotFound { .. })
        ));
        assert!(matches!(
            navigator.resolve_nested_archive(&mut outer, "empty.zip"),
            Err(ArchiveError::InvalidData { .. })
        ));
    }

    #[test]
    fn test_inner_zip_with_huge_declared_length() {
        let inner = zip(&[("x.txt", b"x".as_slice())]);
        let outer_bytes = crate::test_support::raw_zip(
            "inner.zip",
            &inner,
            crate::test_support::RawCentral {
                uncompressed: 0xFFFF_FFFF,
                compressed: inner.len() as u32,
                header_offset: 0,
                zip64: &[1 << 62],
            },
        );
        let mut outer = open(outer_bytes);

        let entries = list_entries(&mut outer, "", false, true).unwrap();
        assert_eq!(names(&entries), ["inner.zip/x.txt"]);
        assert_eq!(read_nested_entry(&mut outer, "inner.zip/x.txt").unwrap(), b"x");
    }
}
