//! ZIP accessor.

use super::header::{ZipCompressionLevel, ZipReader, ZipWriter};
use log::{debug, warn};
use nestarc_core::entry::{CompressionMethod, Entry};
use nestarc_core::error::{ArchiveError, Result};
use nestarc_core::format::{ArchiveId, Format, Implementation};
use nestarc_core::path;
use nestarc_core::stream::BoxStream;
use nestarc_core::traits::{AccessMode, ArchiveAccess, validate_open};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// An entry held in memory until the archive is rewritten.
#[derive(Debug)]
struct StagedEntry {
    entry: Entry,
    data: Vec<u8>,
}

/// ZIP accessor.
///
/// In `Read` mode entries are served straight from the stream. In `Create`
/// and `Update` modes every entry is held in memory (existing ones are
/// decompressed at open) and the whole archive is written back on release.
pub struct ZipArchive {
    reader: Option<ZipReader<BoxStream>>,
    root: Option<PathBuf>,
    mode: AccessMode,
    staged: Vec<StagedEntry>,
    dirty: bool,
    level: ZipCompressionLevel,
}

impl ZipArchive {
    const ID: ArchiveId = ArchiveId::new(Format::Zip, Implementation::Native);

    /// Open a ZIP stream.
    pub fn new(stream: BoxStream, root: Option<PathBuf>, mode: AccessMode) -> Result<Self> {
        let mut reader = ZipReader::new(stream)?;
        validate_open(Self::ID, mode, reader.entries().len())?;

        let mut staged = Vec::new();
        if mode == AccessMode::Update {
            let entries = reader.entries().to_vec();
            for entry in entries {
                let data = reader.extract(&entry)?;
                staged.push(StagedEntry { entry, data });
            }
        }
        debug!(
            "ZIP {} opened ({:?}, {} entries)",
            root.as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<stream>".to_string()),
            mode,
            reader.entries().len()
        );

        Ok(Self {
            reader: Some(reader),
            root,
            mode,
            staged,
            // A created archive is written even when left empty.
            dirty: mode == AccessMode::Create,
            level: ZipCompressionLevel::default(),
        })
    }

    /// Set the compression level used when the archive is written.
    pub fn set_compression(&mut self, level: ZipCompressionLevel) {
        self.level = level;
    }

    fn require_writable(&self, operation: &str) -> Result<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(ArchiveError::invalid_operation(format!(
                "cannot {} in a ZIP opened read-only",
                operation
            )))
        }
    }

    fn staged_position(&self, name: &str) -> Option<usize> {
        self.staged
            .iter()
            .position(|s| path::paths_equal(&s.entry.name, name))
    }

    /// Rewrite the whole archive from the staged entries.
    fn commit(&mut self, stream: &mut BoxStream) -> Result<()> {
        stream.seek(SeekFrom::Start(0))?;
        let mut writer = ZipWriter::new(&mut *stream);
        writer.set_compression(self.level);
        for staged in &self.staged {
            if staged.entry.is_dir() {
                writer.add_directory(&staged.entry.name, staged.entry.last_modified)?;
            } else {
                writer.add_file_with_modified(
                    &staged.entry.name,
                    &staged.data,
                    staged.entry.last_modified,
                )?;
            }
        }
        writer.finish()?;

        let end = stream.stream_position()?;
        stream.set_len(end)?;
        debug!("ZIP rewritten with {} entries ({} bytes)", self.staged.len(), end);
        Ok(())
    }
}

/// Container-relative form of a name handed to `create_entry`.
fn entry_name(name: &str) -> String {
    path::normalize(name).trim_start_matches('/').to_string()
}

impl ArchiveAccess for ZipArchive {
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
        if self.mode.is_writable() {
            return Ok(self
                .staged
                .iter()
                .map(|s| {
                    let mut entry = s.entry.clone();
                    if entry.is_file() {
                        entry.length = s.data.len() as i64;
                    }
                    entry
                })
                .collect());
        }
        let reader = self
            .reader
            .as_ref()
            .ok_or_else(|| ArchiveError::invalid_operation("ZIP accessor has been released"))?;
        Ok(reader.entries().to_vec())
    }

    fn open_entry(&mut self, entry: &Entry) -> Result<Box<dyn Read + '_>> {
        if self.reader.is_none() {
            return Err(ArchiveError::invalid_operation(
                "ZIP accessor has been released",
            ));
        }
        if self.mode.is_writable() {
            let staged = self
                .staged
                .iter()
                .find(|s| path::paths_equal(&s.entry.name, &entry.name))
                .ok_or_else(|| ArchiveError::not_found(&entry.name))?;
            return Ok(Box::new(Cursor::new(staged.data.as_slice())));
        }
        match self.reader.as_mut() {
            Some(reader) => reader.open(entry),
            None => Err(ArchiveError::invalid_operation(
                "ZIP accessor has been released",
            )),
        }
    }

    fn read_entry(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(entry.capacity_hint());
        self.open_entry(entry)?
            .read_to_end(&mut data)
            .map_err(ArchiveError::from_io)?;
        Ok(data)
    }

    fn create_entry(&mut self, name: &str) -> Result<Entry> {
        self.require_writable("create entries")?;
        let name = entry_name(name);
        if name.is_empty() || name == "/" {
            return Err(ArchiveError::out_of_range("name", "\"\""));
        }

        let entry = if name.ends_with('/') {
            Entry::directory(name)
        } else {
            Entry::file(name, 0).with_method(CompressionMethod::Deflate)
        };
        let entry = entry.with_modified(SystemTime::now());

        match self.staged_position(&entry.name) {
            Some(index) => {
                self.staged[index] = StagedEntry {
                    entry: entry.clone(),
                    data: Vec::new(),
                }
            }
            None => self.staged.push(StagedEntry {
                entry: entry.clone(),
                data: Vec::new(),
            }),
        }
        self.dirty = true;
        Ok(entry)
    }

    fn entry_writer(&mut self, entry: &Entry) -> Result<Box<dyn Write + '_>> {
        self.require_writable("write entries")?;
        if entry.is_dir() {
            return Err(ArchiveError::invalid_operation(format!(
                "{} is a directory",
                entry.name
            )));
        }
        let index = self
            .staged_position(&entry.name)
            .ok_or_else(|| ArchiveError::not_found(&entry.name))?;
        self.dirty = true;
        let staged = &mut self.staged[index];
        staged.data.clear();
        Ok(Box::new(&mut staged.data))
    }

    fn delete_entry(&mut self, name: &str) -> Result<bool> {
        self.require_writable("delete entries")?;
        match self.staged_position(&entry_name(name)) {
            Some(index) => {
                self.staged.remove(index);
                self.dirty = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn release(&mut self) -> Result<()> {
        let Some(reader) = self.reader.take() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        let mut stream = reader.into_inner();
        let committed = self.commit(&mut stream);
        self.staged.clear();
        self.dirty = false;
        committed
    }
}

impl Drop for ZipArchive {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("failed to release ZIP accessor: {}", err);
        }
    }
}
