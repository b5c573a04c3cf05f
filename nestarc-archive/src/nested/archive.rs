//! Accessor for a container opened from an entry of another container.

use log::{debug, warn};
use nestarc_core::entry::Entry;
use nestarc_core::error::Result;
use nestarc_core::format::ArchiveId;
use nestarc_core::traits::{AccessMode, ArchiveAccess};
use std::io::{Read, Write};
use std::path::Path;
use tempfile::TempDir;

/// A nested container.
///
/// Wraps the accessor opened over the extracted or buffered entry data.
/// When the container was reached through another nested container, that
/// parent is owned here and released after this one. An extraction
/// directory, if any, is removed last.
pub struct NestedArchive {
    inner: Box<dyn ArchiveAccess>,
    parent: Option<Box<NestedArchive>>,
    temp_dir: Option<TempDir>,
    location: String,
}

impl NestedArchive {
    pub(crate) fn new(
        inner: Box<dyn ArchiveAccess>,
        temp_dir: Option<TempDir>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            parent: None,
            temp_dir,
            location: location.into(),
        }
    }

    pub(crate) fn with_parent(mut self, parent: NestedArchive) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    /// Location of this container, relative to the outermost one.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// The nested container this one was opened from, if any.
    pub fn parent(&self) -> Option<&NestedArchive> {
        self.parent.as_deref()
    }

    /// Directory the entry was extracted into, while it exists.
    pub fn temp_dir(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Number of nested layers this accessor keeps open, itself included.
    pub fn depth(&self) -> usize {
        1 + self.parent.as_ref().map_or(0, |p| p.depth())
    }
}

impl ArchiveAccess for NestedArchive {
    fn id(&self) -> ArchiveId {
        self.inner.id()
    }

    fn mode(&self) -> AccessMode {
        self.inner.mode()
    }

    fn root_location(&self) -> Option<&Path> {
        self.inner.root_location()
    }

    fn is_nested(&self) -> bool {
        true
    }

    fn entries(&mut self) -> Result<Vec<Entry>> {
        self.inner.entries()
    }

    fn find_entry(&mut self, name: &str) -> Result<Option<Entry>> {
        self.inner.find_entry(name)
    }

    fn open_entry(&mut self, entry: &Entry) -> Result<Box<dyn Read + '_>> {
        self.inner.open_entry(entry)
    }

    fn create_entry(&mut self, name: &str) -> Result<Entry> {
        self.inner.create_entry(name)
    }

    fn entry_writer(&mut self, entry: &Entry) -> Result<Box<dyn Write + '_>> {
        self.inner.entry_writer(entry)
    }

    fn delete_entry(&mut self, name: &str) -> Result<bool> {
        self.inner.delete_entry(name)
    }

    fn read_entry(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        self.inner.read_entry(entry)
    }

    fn release(&mut self) -> Result<()> {
        let result = self.inner.release();
        if let Some(mut parent) = self.parent.take() {
            if let Err(e) = parent.release() {
                warn!("releasing parent of {}: {}", self.location, e);
            }
        }
        if let Some(dir) = self.temp_dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!("removed {}", path.display()),
                Err(e) => warn!("failed to remove {}: {}", path.display(), e),
            }
        }
        result
    }
}

impl Drop for NestedArchive {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("failed to release nested archive {}: {}", self.location, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::{ZipArchive, ZipWriter};
    use nestarc_core::format::Format;
    use std::io::Cursor;

    fn zip_with(name: &str, data: &[u8]) -> Box<dyn ArchiveAccess> {
        let mut writer = ZipWriter::new(Vec::new());
        writer.add_file(name, data).unwrap();
        let bytes = writer.finish().unwrap();
        Box::new(ZipArchive::new(Box::new(Cursor::new(bytes)), None, AccessMode::Read).unwrap())
    }

    #[test]
    fn test_delegates_and_reports_nested() {
        let mut nested = NestedArchive::new(zip_with("a.txt", b"abc"), None, "outer.zip");
        assert!(nested.is_nested());
        assert_eq!(nested.id().format, Format::Zip);
        assert_eq!(nested.location(), "outer.zip");
        let entry = nested.find_entry("a.txt").unwrap().unwrap();
        assert_eq!(nested.read_entry(&entry).unwrap(), b"abc");
    }

    #[test]
    fn test_release_removes_temp_dir_and_parent() {
        let parent_dir = tempfile::tempdir().unwrap();
        let child_dir = tempfile::tempdir().unwrap();
        let parent_path = parent_dir.path().to_path_buf();
        let child_path = child_dir.path().to_path_buf();

        let parent = NestedArchive::new(zip_with("p.txt", b"p"), Some(parent_dir), "p.zip");
        let mut child = NestedArchive::new(zip_with("c.txt", b"c"), Some(child_dir), "p.zip/c.zip")
            .with_parent(parent);
        assert_eq!(child.depth(), 2);
        assert_eq!(child.parent().unwrap().location(), "p.zip");

        child.release().unwrap();
        assert!(!child_path.exists());
        assert!(!parent_path.exists());
        assert!(child.temp_dir().is_none());
        child.release().unwrap();
    }
}
