//! Member-parser GZIP accessor.

use super::header::{GzipHeader, os};
use super::member::{GzipMember, scan_members};
use super::{StagedMember, host_name};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::DeflateEncoder;
use log::{debug, warn};
use nestarc_core::entry::Entry;
use nestarc_core::error::{ArchiveError, Result};
use nestarc_core::format::{ArchiveId, Format, Implementation};
use nestarc_core::stream::BoxStream;
use nestarc_core::traits::{AccessMode, ArchiveAccess, validate_open};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// GZIP accessor exposing each member as an entry.
///
/// `open_entry` seeks the shared stream to the member and decodes that
/// member only. At most one member can be created per accessor, and only
/// when the stream holds none.
pub struct GzipArchive {
    stream: Option<BoxStream>,
    root: Option<PathBuf>,
    mode: AccessMode,
    members: Vec<GzipMember>,
    staged: Option<StagedMember>,
    level: Compression,
}

impl GzipArchive {
    /// Open a GZIP stream, scanning at most `max_members` members
    /// (negative: all of them).
    pub fn new(
        mut stream: BoxStream,
        root: Option<PathBuf>,
        mode: AccessMode,
        max_members: i64,
    ) -> Result<Self> {
        let host = host_name(root.as_deref());
        let members = scan_members(&mut stream, host.as_deref(), max_members)?;
        debug!(
            "GZIP {} opened with {} members",
            host.as_deref().unwrap_or("<stream>"),
            members.len()
        );
        validate_open(Self::ID, mode, members.len())?;

        Ok(Self {
            stream: Some(stream),
            root,
            mode,
            members,
            staged: None,
            level: Compression::default(),
        })
    }

    const ID: ArchiveId = ArchiveId::new(Format::GZip, Implementation::Native);

    /// Set the DEFLATE level used when committing a created member.
    pub fn set_compression(&mut self, level: Compression) {
        self.level = level;
    }

    /// The members found when the stream was opened.
    pub fn members(&self) -> &[GzipMember] {
        &self.members
    }

    fn stream_mut(&mut self) -> Result<&mut BoxStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| ArchiveError::invalid_operation("GZIP accessor has been released"))
    }

    fn commit(&mut self, staged: StagedMember) -> Result<()> {
        let level = self.level;
        let stream = self.stream_mut()?;

        let header = GzipHeader::with_filename(&staged.entry.name)
            .with_mtime(staged.entry.last_modified);
        let header = GzipHeader {
            os: os::UNIX,
            xfl: xfl_for(level),
            ..header
        };

        stream.seek(SeekFrom::Start(0))?;
        header.write(stream)?;
        let mut encoder = DeflateEncoder::new(&mut *stream, level);
        encoder.write_all(&staged.data)?;
        encoder.finish()?;
        stream.write_all(&crc32fast::hash(&staged.data).to_le_bytes())?;
        stream.write_all(&(staged.data.len() as u32).to_le_bytes())?;
        stream.flush()?;

        let end = stream.stream_position()?;
        stream.set_len(end)?;
        debug!(
            "GZIP member {} committed ({} bytes)",
            staged.entry.name,
            staged.data.len()
        );
        Ok(())
    }
}

/// XFL byte matching a DEFLATE level.
fn xfl_for(level: Compression) -> u8 {
    match level.level() {
        9 => 2,
        1 => 4,
        _ => 0,
    }
}

impl ArchiveAccess for GzipArchive {
    fn id(&self) -> ArchiveId {
        Self::ID
    }

    fn mode(&self) -> AccessMode {
        self.mode
    }

    fn root_location(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn entries(&mut self) -> Result<Vec<Entry>> {
        let mut entries: Vec<Entry> = self.members.iter().map(GzipMember::to_entry).collect();
        if let Some(staged) = &self.staged {
            let mut entry = staged.entry.clone();
            entry.length = staged.data.len() as i64;
            entries.push(entry);
        }
        Ok(entries)
    }

    fn open_entry(&mut self, entry: &Entry) -> Result<Box<dyn Read + '_>> {
        if let Some(staged) = self.staged.as_ref().filter(|s| s.entry.name == entry.name) {
            return Ok(Box::new(Cursor::new(staged.data.as_slice())));
        }

        let offset = self
            .members
            .iter()
            .find(|m| m.offset == entry.offset && m.name == entry.name)
            .map(|m| m.offset)
            .ok_or_else(|| ArchiveError::not_found(&entry.name))?;

        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ArchiveError::invalid_operation("GZIP accessor has been released"))?;
        stream.seek(SeekFrom::Start(offset))?;
        Ok(Box::new(GzDecoder::new(stream)))
    }

    fn create_entry(&mut self, name: &str) -> Result<Entry> {
        let staged = StagedMember::stage(self.mode, self.members.len(), &self.staged, name)?;
        let entry = staged.entry.clone();
        self.staged = Some(staged);
        Ok(entry)
    }

    fn entry_writer(&mut self, entry: &Entry) -> Result<Box<dyn Write + '_>> {
        Ok(Box::new(StagedMember::writer_for(&mut self.staged, entry)?))
    }

    fn delete_entry(&mut self, _name: &str) -> Result<bool> {
        Err(ArchiveError::not_supported("deleting GZIP members"))
    }

    fn release(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Ok(());
        }
        let committed = match self.staged.take() {
            Some(staged) => self.commit(staged),
            None => Ok(()),
        };
        self.stream = None;
        committed
    }
}

impl Drop for GzipArchive {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("failed to release GZIP accessor: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SharedStream;
    use flate2::GzBuilder;

    fn member(name: Option<&str>, data: &[u8]) -> Vec<u8> {
        let mut builder = GzBuilder::new();
        if let Some(name) = name {
            builder = builder.filename(name);
        }
        let mut encoder = builder.write(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn open(bytes: Vec<u8>, mode: AccessMode) -> Result<GzipArchive> {
        GzipArchive::new(
            Box::new(Cursor::new(bytes)),
            Some(PathBuf::from("/data/payload.bin.gz")),
            mode,
            -1,
        )
    }

    #[test]
    fn test_single_member_defaults() {
        let mut archive = open(member(None, b"0123456789"), AccessMode::Read).unwrap();
        let entries = archive.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "payload.bin");
        assert_eq!(entries[0].length, 10);
        assert!(!entries[0].has_modified());
        assert!(!archive.is_archive());
        assert!(archive.is_compressed());
    }

    #[test]
    fn test_read_each_member() {
        let mut bytes = member(Some("a.txt"), b"first");
        bytes.extend(member(Some("b.txt"), b"second"));
        let mut archive = open(bytes, AccessMode::Read).unwrap();

        let entry = archive.find_entry("B.TXT").unwrap().unwrap();
        assert_eq!(archive.read_entry(&entry).unwrap(), b"second");
        let entry = archive.find_entry("a.txt").unwrap().unwrap();
        assert_eq!(archive.read_entry(&entry).unwrap(), b"first");
    }

    #[test]
    fn test_read_empty_is_invalid_data() {
        let err = open(Vec::new(), AccessMode::Read).err().unwrap();
        assert!(matches!(err, ArchiveError::InvalidData { .. }));
    }

    #[test]
    fn test_create_over_existing_is_invalid() {
        let err = open(member(None, b"x"), AccessMode::Create).err().unwrap();
        assert!(matches!(err, ArchiveError::InvalidOperation { .. }));
    }

    #[test]
    fn test_write_rules() {
        let mut archive = open(member(None, b"x"), AccessMode::Read).unwrap();
        assert!(matches!(
            archive.create_entry("new.txt"),
            Err(ArchiveError::InvalidOperation { .. })
        ));
        assert!(matches!(
            archive.delete_entry("payload.bin"),
            Err(ArchiveError::NotSupported { .. })
        ));

        let mut archive = open(member(None, b"x"), AccessMode::Update).unwrap();
        assert!(matches!(
            archive.create_entry("new.txt"),
            Err(ArchiveError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn test_create_and_reopen() {
        let shared = SharedStream::default();
        let mut archive = GzipArchive::new(
            Box::new(shared.clone()),
            Some(PathBuf::from("out.gz")),
            AccessMode::Create,
            -1,
        )
        .unwrap();
        let entry = archive.create_entry("dir/report.csv").unwrap();
        assert_eq!(entry.name, "report.csv");
        assert!(archive.create_entry("second.csv").is_err());
        archive
            .entry_writer(&entry)
            .unwrap()
            .write_all(b"a,b\n1,2\n")
            .unwrap();
        archive.release().unwrap();
        archive.release().unwrap();
        drop(archive);

        let bytes = SharedStream::bytes(&shared);
        let mut decoded = String::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "a,b\n1,2\n");

        let mut reopened = open(bytes, AccessMode::Read).unwrap();
        let entries = reopened.entries().unwrap();
        assert_eq!(entries[0].name, "report.csv");
        assert_eq!(entries[0].length, 8);
        assert!(entries[0].has_modified());
    }

    #[test]
    fn test_released_accessor_rejects_reads() {
        let mut archive = open(member(None, b"x"), AccessMode::Read).unwrap();
        let entry = archive.entries().unwrap().remove(0);
        archive.release().unwrap();
        assert!(matches!(
            archive.open_entry(&entry),
            Err(ArchiveError::InvalidOperation { .. })
        ));
    }
}
