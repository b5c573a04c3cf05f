//! Host-codec GZIP accessor.
//!
//! The whole file is one entry. Its name comes from the first member's
//! header, its length from the last member's ISIZE, and reading decodes
//! every member back to back.

use super::header::{GzipHeader, TRAILER_LEN};
use super::member::default_name;
use super::{StagedMember, host_name};
use encoding_rs::WINDOWS_1252;
use flate2::read::MultiGzDecoder;
use flate2::{Compression, GzBuilder};
use log::{debug, warn};
use nestarc_core::entry::{CompressionMethod, Entry};
use nestarc_core::error::{ArchiveError, Result};
use nestarc_core::format::{ArchiveId, Format, Implementation};
use nestarc_core::stream::BoxStream;
use nestarc_core::traits::{AccessMode, ArchiveAccess, validate_open};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// GZIP accessor backed directly by `flate2`'s stream types.
pub struct GzipStream {
    stream: Option<BoxStream>,
    root: Option<PathBuf>,
    mode: AccessMode,
    entry: Option<Entry>,
    staged: Option<StagedMember>,
}

impl GzipStream {
    const ID: ArchiveId = ArchiveId::new(Format::GZip, Implementation::Stream);

    /// Open a GZIP stream.
    pub fn new(mut stream: BoxStream, root: Option<PathBuf>, mode: AccessMode) -> Result<Self> {
        let host = host_name(root.as_deref());
        let entry = Self::summarize(&mut stream, host.as_deref())?;
        validate_open(Self::ID, mode, usize::from(entry.is_some()))?;

        Ok(Self {
            stream: Some(stream),
            root,
            mode,
            entry,
            staged: None,
        })
    }

    /// Describe the stream as one entry, or `None` if it does not start with
    /// a valid header.
    fn summarize(stream: &mut BoxStream, host: Option<&str>) -> Result<Option<Entry>> {
        let total = stream.length()?;
        stream.seek(SeekFrom::Start(0))?;
        let header = match GzipHeader::read(stream) {
            Ok(header) => header,
            Err(err) if err.is_structural() => {
                debug!("not a GZIP stream: {}", err);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let mut length = Entry::UNKNOWN_LENGTH;
        if total >= TRAILER_LEN {
            let mut isize = [0u8; 4];
            stream.seek(SeekFrom::End(-4))?;
            stream.read_exact(&mut isize)?;
            length = i64::from(u32::from_le_bytes(isize));
        }
        stream.seek(SeekFrom::Start(0))?;

        let name = match header.filename.as_deref() {
            Some(name) if !name.is_empty() => name
                .rsplit(['/', '\\'])
                .next()
                .unwrap_or(name)
                .to_string(),
            _ => default_name(host),
        };
        let mut entry = Entry::file(name, length)
            .with_method(CompressionMethod::Deflate)
            .with_compressed_length(i64::try_from(total).unwrap_or(Entry::UNKNOWN_LENGTH))
            .with_modified(header.last_modified());
        if let Some(comment) = header.comment {
            entry = entry.with_comment(comment);
        }
        Ok(Some(entry))
    }

    fn commit(&mut self, staged: StagedMember) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ArchiveError::invalid_operation("GZIP accessor has been released"))?;
        stream.seek(SeekFrom::Start(0))?;

        let (filename, _, _) = WINDOWS_1252.encode(&staged.entry.name);
        let mtime = staged
            .entry
            .last_modified
            .duration_since(UNIX_EPOCH)
            .map(|d| u32::try_from(d.as_secs()).unwrap_or(0))
            .unwrap_or(0);
        let mut encoder = GzBuilder::new()
            .filename(filename.into_owned())
            .mtime(mtime)
            .write(&mut *stream, Compression::default());
        encoder.write_all(&staged.data)?;
        encoder.finish()?;
        stream.flush()?;

        let end = stream.stream_position()?;
        stream.set_len(end)?;
        Ok(())
    }
}

impl ArchiveAccess for GzipStream {
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
        let mut entries: Vec<Entry> = self.entry.iter().cloned().collect();
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
        if !self.entry.as_ref().is_some_and(|e| e.name == entry.name) {
            return Err(ArchiveError::not_found(&entry.name));
        }

        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ArchiveError::invalid_operation("GZIP accessor has been released"))?;
        stream.seek(SeekFrom::Start(0))?;
        Ok(Box::new(MultiGzDecoder::new(stream)))
    }

    fn create_entry(&mut self, name: &str) -> Result<Entry> {
        let existing = usize::from(self.entry.is_some());
        let staged = StagedMember::stage(self.mode, existing, &self.staged, name)?;
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

impl Drop for GzipStream {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("failed to release GZIP stream accessor: {}", err);
        }
    }
}
