//! The accessor contract shared by every container backend.
//!
//! An accessor owns one open container. Entries are listed, opened, created
//! and deleted through [`ArchiveAccess`] regardless of which format or codec
//! sits behind it.

use crate::entry::Entry;
use crate::error::{ArchiveError, Result};
use crate::format::ArchiveId;
use crate::path;
use std::io::{Read, Write};
use std::path::Path;

/// How a container was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Read existing entries only.
    #[default]
    Read,
    /// Start a new, empty container.
    Create,
    /// Read, add, replace and delete entries.
    Update,
}

impl AccessMode {
    /// Whether the mode permits writing.
    pub fn is_writable(&self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// Check the entry count discovered at open time against the mode.
///
/// Reading a container with nothing in it is an error, and so is creating
/// one over existing content. Every backend calls this once while it is
/// being constructed.
pub fn validate_open(id: ArchiveId, mode: AccessMode, existing: usize) -> Result<()> {
    match mode {
        AccessMode::Read if existing == 0 => Err(ArchiveError::invalid_data(format!(
            "{} contains no entries",
            id.format
        ))),
        AccessMode::Create if existing > 0 => Err(ArchiveError::invalid_operation(format!(
            "cannot create {} over {} existing entries",
            id.format, existing
        ))),
        _ => Ok(()),
    }
}

/// Uniform access to one open container.
///
/// Implementations are single-threaded: `open_entry` moves the shared
/// stream position, so two readers from the same accessor must not be
/// interleaved.
pub trait ArchiveAccess {
    /// Format and implementation backing this accessor.
    fn id(&self) -> ArchiveId;

    /// Mode the accessor was opened with.
    fn mode(&self) -> AccessMode;

    /// File-system location of the container, if opened from a path.
    fn root_location(&self) -> Option<&Path>;

    /// Whether the container holds multiple named entries.
    fn is_archive(&self) -> bool {
        self.id().format.is_archive()
    }

    /// Whether the container compresses its payload.
    fn is_compressed(&self) -> bool {
        self.id().format.is_compressed()
    }

    /// Whether this accessor was opened from an entry of another container.
    fn is_nested(&self) -> bool {
        false
    }

    /// List all entries. May be called repeatedly.
    fn entries(&mut self) -> Result<Vec<Entry>>;

    /// Look up an entry by name.
    ///
    /// Matching ignores case and separator style. An absolute name that
    /// starts with the accessor's root location is retried relative to it.
    fn find_entry(&mut self, name: &str) -> Result<Option<Entry>> {
        let entries = self.entries()?;
        if let Some(found) = entries.iter().find(|e| path::paths_equal(&e.name, name)) {
            return Ok(Some(found.clone()));
        }

        let Some(root) = self.root_location() else {
            return Ok(None);
        };
        let normalized = path::normalize(name);
        if !normalized.starts_with('/') && !Path::new(name).is_absolute() {
            return Ok(None);
        }
        let root = path::normalize(&root.to_string_lossy());
        let root = root.trim_end_matches('/');
        let relative = path::strip_prefix_ignore_case(&normalized, root)
            .map(|rest| rest.trim_start_matches('/'));
        Ok(relative.and_then(|rel| {
            entries
                .into_iter()
                .find(|e| path::paths_equal(&e.name, rel))
        }))
    }

    /// Open an entry's data for reading.
    fn open_entry(&mut self, entry: &Entry) -> Result<Box<dyn Read + '_>>;

    /// Add a new, empty entry.
    fn create_entry(&mut self, name: &str) -> Result<Entry>;

    /// Open a writer for an entry created on this accessor.
    ///
    /// Written data replaces any previous content and is committed when
    /// the accessor is released.
    fn entry_writer(&mut self, entry: &Entry) -> Result<Box<dyn Write + '_>>;

    /// Remove an entry. Returns whether it existed.
    fn delete_entry(&mut self, name: &str) -> Result<bool>;

    /// Commit pending writes and close the owned stream.
    ///
    /// Safe to call more than once; later calls do nothing.
    fn release(&mut self) -> Result<()>;

    /// Read an entry's full contents.
    fn read_entry(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(entry.capacity_hint());
        self.open_entry(entry)?.read_to_end(&mut data)?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{Format, Implementation};
    use std::io::Cursor;
    use std::path::PathBuf;

    struct Fixed {
        root: Option<PathBuf>,
        entries: Vec<(Entry, Vec<u8>)>,
    }

    impl ArchiveAccess for Fixed {
        fn id(&self) -> ArchiveId {
            ArchiveId::new(Format::Zip, Implementation::Native)
        }

        fn mode(&self) -> AccessMode {
            AccessMode::Read
        }

        fn root_location(&self) -> Option<&Path> {
            self.root.as_deref()
        }

        fn entries(&mut self) -> Result<Vec<Entry>> {
            Ok(self.entries.iter().map(|(e, _)| e.clone()).collect())
        }

        fn open_entry(&mut self, entry: &Entry) -> Result<Box<dyn Read + '_>> {
            let (_, data) = self
                .entries
                .iter()
                .find(|(e, _)| e.name == entry.name)
                .ok_or_else(|| ArchiveError::not_found(&entry.name))?;
            Ok(Box::new(Cursor::new(data.as_slice())))
        }

        fn create_entry(&mut self, _name: &str) -> Result<Entry> {
            Err(ArchiveError::invalid_operation("read-only"))
        }

        fn entry_writer(&mut self, _entry: &Entry) -> Result<Box<dyn Write + '_>> {
            Err(ArchiveError::invalid_operation("read-only"))
        }

        fn delete_entry(&mut self, _name: &str) -> Result<bool> {
            Err(ArchiveError::invalid_operation("read-only"))
        }

        fn release(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn fixture() -> Fixed {
        Fixed {
            root: Some(PathBuf::from("/data/set.zip")),
            entries: vec![
                (Entry::file("Roms/Game.rom", 4), b"rom!".to_vec()),
                (Entry::file("notes.txt", 2), b"hi".to_vec()),
            ],
        }
    }

    #[test]
    fn test_validate_open() {
        let id = ArchiveId::new(Format::GZip, Implementation::Native);
        assert!(matches!(
            validate_open(id, AccessMode::Read, 0),
            Err(ArchiveError::InvalidData { .. })
        ));
        assert!(matches!(
            validate_open(id, AccessMode::Create, 1),
            Err(ArchiveError::InvalidOperation { .. })
        ));
        assert!(validate_open(id, AccessMode::Read, 1).is_ok());
        assert!(validate_open(id, AccessMode::Create, 0).is_ok());
        assert!(validate_open(id, AccessMode::Update, 0).is_ok());
    }

    #[test]
    fn test_find_entry_case_and_separator() {
        let mut access = fixture();
        let found = access.find_entry(r"roms\game.ROM").unwrap().unwrap();
        assert_eq!(found.name, "Roms/Game.rom");
        assert!(access.find_entry("missing.txt").unwrap().is_none());
    }

    #[test]
    fn test_find_entry_absolute_under_root() {
        let mut access = fixture();
        let found = access.find_entry("/data/set.zip/notes.txt").unwrap().unwrap();
        assert_eq!(found.name, "notes.txt");
        assert!(access.find_entry("/elsewhere/notes.txt").unwrap().is_none());
    }

    #[test]
    fn test_read_entry() {
        let mut access = fixture();
        let entry = access.find_entry("notes.txt").unwrap().unwrap();
        assert_eq!(access.read_entry(&entry).unwrap(), b"hi");
        assert!(access.is_archive());
        assert!(!access.is_nested());
    }
}
