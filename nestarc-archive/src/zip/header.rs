//! ZIP header structures, reader and writer.

use encoding_rs::WINDOWS_1252;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use nestarc_core::entry::{CompressionMethod, Entry};
use nestarc_core::error::{ArchiveError, Result};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// ZIP local file header signature.
pub const LOCAL_FILE_HEADER_SIG: u32 = 0x04034B50;

/// ZIP central directory header signature.
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x02014B50;

/// ZIP end of central directory signature.
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x06054B50;

/// ZIP64 end of central directory signature.
pub const ZIP64_END_OF_CENTRAL_DIR_SIG: u32 = 0x06064B50;

/// ZIP64 end of central directory locator signature.
pub const ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG: u32 = 0x07064B50;

/// ZIP64 extra field header ID.
pub const ZIP64_EXTRA_FIELD_ID: u16 = 0x0001;

/// Marker value for Zip64 (0xFFFFFFFF for 32-bit fields).
pub const ZIP64_MARKER_32: u32 = 0xFFFF_FFFF;

/// Marker value for Zip64 (0xFFFF for 16-bit fields).
pub const ZIP64_MARKER_16: u16 = 0xFFFF;

/// Flag bit for data descriptor presence.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// Flag bit marking UTF-8 names and comments.
pub const FLAG_UTF8: u16 = 0x0800;

const LOCAL_HEADER_LEN: u64 = 30;
const CENTRAL_HEADER_LEN: usize = 46;
const EOCD_LEN: usize = 22;
const ZIP64_LOCATOR_LEN: u64 = 20;
const MAX_COMMENT_LEN: u64 = 65535;

fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn le_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

/// Decode a stored name: UTF-8 when flagged or valid, Latin-1 otherwise.
fn decode_text(bytes: &[u8], flags: u16) -> String {
    if flags & FLAG_UTF8 != 0 {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(bytes).0.into_owned(),
    }
}

/// Days since 1970-01-01 for a proleptic Gregorian date.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = (if year >= 0 { year } else { year - 399 }) / 400;
    let yoe = year - era * 400;
    let mp = i64::from(if month > 2 { month - 3 } else { month + 9 });
    let doy = (153 * mp + 2) / 5 + i64::from(day) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Proleptic Gregorian date for a day count since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Convert a DOS date/time pair (local time taken as UTC) to `SystemTime`.
///
/// A zero date means no timestamp was recorded and maps to the epoch.
pub fn dos_to_system_time(time: u16, date: u16) -> SystemTime {
    if date == 0 {
        return UNIX_EPOCH;
    }
    let seconds = u64::from(time & 0x1F) * 2;
    let minutes = u64::from((time >> 5) & 0x3F);
    let hours = u64::from((time >> 11) & 0x1F);
    let day = u32::from(date & 0x1F).max(1);
    let month = u32::from((date >> 5) & 0x0F).clamp(1, 12);
    let year = i64::from((date >> 9) & 0x7F) + 1980;

    let days = days_from_civil(year, month, day).max(0) as u64;
    UNIX_EPOCH + Duration::from_secs(days * 86_400 + hours * 3600 + minutes * 60 + seconds)
}

/// Convert a `SystemTime` to a DOS `(time, date)` pair.
///
/// Times before 1980 clamp to 1980-01-01 00:00:00, the earliest DOS date.
pub fn system_time_to_dos(time: SystemTime) -> (u16, u16) {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let days = (secs / 86_400) as i64;
    let (year, month, day) = civil_from_days(days);
    if year < 1980 {
        return (0, (1 << 5) | 1);
    }
    let year = year.min(1980 + 127);

    let time_of_day = secs % 86_400;
    let hours = (time_of_day / 3600) as u16;
    let minutes = ((time_of_day % 3600) / 60) as u16;
    let seconds = ((time_of_day % 60) / 2) as u16;

    let dos_time = (hours << 11) | (minutes << 5) | seconds;
    let dos_date = (((year - 1980) as u16) << 9) | ((month as u16) << 5) | day as u16;
    (dos_time, dos_date)
}

/// Values recovered from a ZIP64 extended-information extra field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Zip64Values {
    uncompressed: Option<u64>,
    compressed: Option<u64>,
    header_offset: Option<u64>,
}

/// Walk an extra block for the ZIP64 field. Only the values whose 32-bit
/// counterparts hold the marker are present, in this fixed order.
/// Add to an offset taken from the archive, rejecting overflow.
fn offset_add(base: u64, delta: u64) -> Result<u64> {
    base.checked_add(delta)
        .ok_or_else(|| ArchiveError::invalid_header("ZIP offset out of range"))
}

fn parse_zip64_extra(
    extra: &[u8],
    uncompressed: u32,
    compressed: u32,
    header_offset: u32,
) -> Zip64Values {
    let mut values = Zip64Values::default();
    let mut offset = 0;
    while offset + 4 <= extra.len() {
        let id = le_u16(extra, offset);
        let size = le_u16(extra, offset + 2) as usize;
        offset += 4;
        let end = offset + size;
        if end > extra.len() {
            break;
        }
        if id == ZIP64_EXTRA_FIELD_ID {
            let mut field = offset;
            let mut take = |present: bool| {
                if present && field + 8 <= end {
                    let value = le_u64(extra, field);
                    field += 8;
                    Some(value)
                } else {
                    None
                }
            };
            values.uncompressed = take(uncompressed == ZIP64_MARKER_32);
            values.compressed = take(compressed == ZIP64_MARKER_32);
            values.header_offset = take(header_offset == ZIP64_MARKER_32);
            break;
        }
        offset = end;
    }
    values
}

/// ZIP local file header.
#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method.
    pub method: CompressionMethod,
    /// Last modification time (DOS).
    pub mtime: u16,
    /// Last modification date (DOS).
    pub mdate: u16,
    /// CRC-32 of uncompressed data.
    pub crc32: u32,
    /// Compressed size, ZIP64 value applied.
    pub compressed_size: u64,
    /// Uncompressed size, ZIP64 value applied.
    pub uncompressed_size: u64,
    /// File name.
    pub filename: String,
    /// Offset of the header's signature.
    pub header_offset: u64,
    /// Offset to file data.
    pub data_offset: u64,
}

impl LocalFileHeader {
    /// Read a local file header at the reader's current position.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        let header_offset = reader.stream_position()?;
        let mut buf = [0u8; LOCAL_HEADER_LEN as usize];
        reader.read_exact(&mut buf)?;

        let signature = le_u32(&buf, 0);
        if signature != LOCAL_FILE_HEADER_SIG {
            return Err(ArchiveError::invalid_magic(
                LOCAL_FILE_HEADER_SIG.to_le_bytes(),
                signature.to_le_bytes(),
            ));
        }

        let flags = le_u16(&buf, 6);
        let compressed = le_u32(&buf, 18);
        let uncompressed = le_u32(&buf, 22);
        let filename_len = le_u16(&buf, 26) as usize;
        let extra_len = le_u16(&buf, 28) as usize;

        let mut filename = vec![0u8; filename_len];
        reader.read_exact(&mut filename)?;
        let mut extra = vec![0u8; extra_len];
        reader.read_exact(&mut extra)?;
        let zip64 = parse_zip64_extra(&extra, uncompressed, compressed, 0);

        Ok(Self {
            flags,
            method: CompressionMethod::from_u16(le_u16(&buf, 8)),
            mtime: le_u16(&buf, 10),
            mdate: le_u16(&buf, 12),
            crc32: le_u32(&buf, 14),
            compressed_size: zip64.compressed.unwrap_or(u64::from(compressed)),
            uncompressed_size: zip64.uncompressed.unwrap_or(u64::from(uncompressed)),
            filename: decode_text(&filename, flags),
            header_offset,
            data_offset: offset_add(
                header_offset,
                LOCAL_HEADER_LEN + (filename_len + extra_len) as u64,
            )?,
        })
    }

    /// Check if this entry has a data descriptor following the compressed data.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Convert to an entry.
    pub fn to_entry(&self) -> Entry {
        let mut entry = if self.filename.ends_with('/') {
            Entry::directory(self.filename.clone())
        } else {
            Entry::file(self.filename.clone(), self.uncompressed_size as i64)
                .with_method(self.method)
                .with_compressed_length(self.compressed_size as i64)
                .with_crc32(self.crc32)
        };
        entry = entry
            .with_modified(dos_to_system_time(self.mtime, self.mdate))
            .with_offset(self.data_offset);
        entry
    }
}

/// Reader that checks the CRC-32 of everything read once the data ends.
struct CrcCheckReader<R> {
    inner: R,
    hasher: crc32fast::Hasher,
    expected: Option<u32>,
    checked: bool,
}

impl<R: Read> Read for CrcCheckReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
        } else if !buf.is_empty() && !self.checked {
            self.checked = true;
            let computed = self.hasher.clone().finalize();
            if let Some(expected) = self.expected.filter(|&e| e != computed) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    ArchiveError::crc_mismatch(expected, computed),
                ));
            }
        }
        Ok(n)
    }
}

/// ZIP archive reader.
///
/// Entries come from the central directory. When it cannot be found the
/// local headers are walked from the start instead.
pub struct ZipReader<R: Read + Seek> {
    reader: R,
    entries: Vec<Entry>,
}

impl<R: Read + Seek> ZipReader<R> {
    /// Create a new ZIP reader. An empty stream has no entries.
    pub fn new(mut reader: R) -> Result<Self> {
        let entries = Self::read_entries(&mut reader)?;
        Ok(Self { reader, entries })
    }

    fn read_entries(reader: &mut R) -> Result<Vec<Entry>> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        if file_size == 0 {
            return Ok(Vec::new());
        }

        match Self::read_from_central_directory(reader, file_size) {
            Ok(entries) => Ok(entries),
            Err(err) if err.is_structural() => {
                log::debug!("ZIP central directory unusable ({}), scanning local headers", err);
                Self::read_from_local_headers(reader)
            }
            Err(err) => Err(err),
        }
    }

    /// Locate the end-of-central-directory record, returning
    /// `(cd_offset, total_entries)`.
    fn locate_central_directory(reader: &mut R, file_size: u64) -> Result<(u64, u64)> {
        let search_start = file_size.saturating_sub(MAX_COMMENT_LEN + EOCD_LEN as u64);
        reader.seek(SeekFrom::Start(search_start))?;
        let mut buf = vec![0u8; (file_size - search_start) as usize];
        reader.read_exact(&mut buf)?;

        let eocd_sig = END_OF_CENTRAL_DIR_SIG.to_le_bytes();
        let eocd_offset = buf
            .windows(4)
            .rposition(|w| w == eocd_sig)
            .filter(|&at| at + EOCD_LEN <= buf.len())
            .ok_or_else(|| ArchiveError::invalid_header("end of central directory not found"))?;
        let eocd = &buf[eocd_offset..];
        let eocd_pos = search_start + eocd_offset as u64;

        let total_entries = u64::from(le_u16(eocd, 10));
        let cd_offset = u64::from(le_u32(eocd, 16));

        // ZIP64 locator sits immediately before the classic record.
        if eocd_pos >= ZIP64_LOCATOR_LEN {
            reader.seek(SeekFrom::Start(eocd_pos - ZIP64_LOCATOR_LEN))?;
            let mut locator = [0u8; ZIP64_LOCATOR_LEN as usize];
            reader.read_exact(&mut locator)?;
            if le_u32(&locator, 0) == ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG {
                reader.seek(SeekFrom::Start(le_u64(&locator, 8)))?;
                let mut record = [0u8; 56];
                reader.read_exact(&mut record)?;
                if le_u32(&record, 0) != ZIP64_END_OF_CENTRAL_DIR_SIG {
                    return Err(ArchiveError::invalid_magic(
                        ZIP64_END_OF_CENTRAL_DIR_SIG.to_le_bytes(),
                        record[0..4].to_vec(),
                    ));
                }
                return Ok((le_u64(&record, 48), le_u64(&record, 32)));
            }
        }

        Ok((cd_offset, total_entries))
    }

    fn read_from_central_directory(reader: &mut R, file_size: u64) -> Result<Vec<Entry>> {
        let (cd_offset, total_entries) = Self::locate_central_directory(reader, file_size)?;
        if cd_offset > file_size {
            return Err(ArchiveError::invalid_header(
                "central directory offset past end of file",
            ));
        }

        reader.seek(SeekFrom::Start(cd_offset))?;
        let mut entries = Vec::with_capacity(total_entries.min(4096) as usize);
        for _ in 0..total_entries {
            entries.push(Self::read_central_dir_entry(reader)?);
        }
        Ok(entries)
    }

    fn read_central_dir_entry(reader: &mut R) -> Result<Entry> {
        let mut buf = [0u8; CENTRAL_HEADER_LEN];
        reader.read_exact(&mut buf)?;

        let signature = le_u32(&buf, 0);
        if signature != CENTRAL_DIR_HEADER_SIG {
            return Err(ArchiveError::invalid_magic(
                CENTRAL_DIR_HEADER_SIG.to_le_bytes(),
                signature.to_le_bytes(),
            ));
        }

        let flags = le_u16(&buf, 8);
        let method = CompressionMethod::from_u16(le_u16(&buf, 10));
        let mtime = le_u16(&buf, 12);
        let mdate = le_u16(&buf, 14);
        let crc32 = le_u32(&buf, 16);
        let compressed = le_u32(&buf, 20);
        let uncompressed = le_u32(&buf, 24);
        let filename_len = le_u16(&buf, 28) as usize;
        let extra_len = le_u16(&buf, 30) as usize;
        let comment_len = le_u16(&buf, 32) as usize;
        let header_offset = le_u32(&buf, 42);

        let mut variable = vec![0u8; filename_len + extra_len + comment_len];
        reader.read_exact(&mut variable)?;
        let filename = decode_text(&variable[..filename_len], flags);
        let extra = &variable[filename_len..filename_len + extra_len];
        let comment = decode_text(&variable[filename_len + extra_len..], flags);

        let zip64 = parse_zip64_extra(extra, uncompressed, compressed, header_offset);
        let uncompressed = zip64.uncompressed.unwrap_or(u64::from(uncompressed));
        let compressed = zip64.compressed.unwrap_or(u64::from(compressed));
        let header_offset = zip64.header_offset.unwrap_or(u64::from(header_offset));

        // The local header's extra field may differ in length from the
        // central one, so read its lengths to find the data.
        let resume = reader.stream_position()?;
        reader.seek(SeekFrom::Start(offset_add(header_offset, 26)?))?;
        let mut lens = [0u8; 4];
        reader.read_exact(&mut lens)?;
        let data_offset = offset_add(
            header_offset,
            LOCAL_HEADER_LEN + u64::from(le_u16(&lens, 0)) + u64::from(le_u16(&lens, 2)),
        )?;
        reader.seek(SeekFrom::Start(resume))?;

        let mut entry = if filename.ends_with('/') {
            Entry::directory(filename)
        } else {
            Entry::file(filename, uncompressed as i64)
                .with_method(method)
                .with_compressed_length(compressed as i64)
                .with_crc32(crc32)
        };
        entry = entry
            .with_modified(dos_to_system_time(mtime, mdate))
            .with_offset(data_offset);
        if !comment.is_empty() {
            entry = entry.with_comment(comment);
        }
        Ok(entry)
    }

    /// Walk local headers from the start of the stream.
    ///
    /// Stops at the first non-local signature, or at an entry whose sizes
    /// are deferred to a data descriptor since its data cannot be skipped.
    fn read_from_local_headers(reader: &mut R) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        reader.seek(SeekFrom::Start(0))?;

        loop {
            let header = match LocalFileHeader::read(reader) {
                Ok(header) => header,
                Err(err) if err.is_structural() => break,
                Err(err) => return Err(err),
            };
            if header.has_data_descriptor() && header.compressed_size == 0 {
                break;
            }
            let Some(next) = header.data_offset.checked_add(header.compressed_size) else {
                break;
            };
            reader.seek(SeekFrom::Start(next))?;
            entries.push(header.to_entry());
        }

        Ok(entries)
    }

    /// Get the list of entries.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Open an entry's data. The CRC-32 is checked when the data ends.
    pub fn open(&mut self, entry: &Entry) -> Result<Box<dyn Read + '_>> {
        if entry.is_dir() {
            return Ok(Box::new(io::empty()));
        }
        let compressed = u64::try_from(entry.compressed_length)
            .map_err(|_| ArchiveError::invalid_data(format!("{} has no size", entry.name)))?;

        self.reader.seek(SeekFrom::Start(entry.offset))?;
        let raw = (&mut self.reader).take(compressed);
        let data: Box<dyn Read + '_> = match entry.method {
            CompressionMethod::Stored => Box::new(raw),
            CompressionMethod::Deflate => Box::new(DeflateDecoder::new(raw)),
            other => return Err(ArchiveError::unsupported_method(other.to_string())),
        };

        Ok(Box::new(CrcCheckReader {
            inner: data,
            hasher: crc32fast::Hasher::new(),
            expected: entry.crc32,
            checked: false,
        }))
    }

    /// Extract an entry's full contents.
    pub fn extract(&mut self, entry: &Entry) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(entry.capacity_hint());
        self.open(entry)?
            .read_to_end(&mut data)
            .map_err(ArchiveError::from_io)?;
        Ok(data)
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// ZIP compression level for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZipCompressionLevel {
    /// Store without compression (method 0).
    Store,
    /// Fast compression (deflate level 1).
    Fast,
    /// Normal compression (deflate level 6).
    #[default]
    Normal,
    /// Best compression (deflate level 9).
    Best,
}

impl ZipCompressionLevel {
    /// The DEFLATE level, or `None` for stored entries.
    pub fn deflate_level(&self) -> Option<Compression> {
        match self {
            Self::Store => None,
            Self::Fast => Some(Compression::fast()),
            Self::Normal => Some(Compression::new(6)),
            Self::Best => Some(Compression::best()),
        }
    }
}

/// Central directory record kept by the writer until `finish`.
#[derive(Debug, Clone)]
struct CentralRecord {
    flags: u16,
    version_needed: u16,
    method: u16,
    mtime: u16,
    mdate: u16,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    filename: Vec<u8>,
    external_attr: u32,
    header_offset: u32,
}

impl CentralRecord {
    fn write_local<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&LOCAL_FILE_HEADER_SIG.to_le_bytes())?;
        writer.write_all(&self.version_needed.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.method.to_le_bytes())?;
        writer.write_all(&self.mtime.to_le_bytes())?;
        writer.write_all(&self.mdate.to_le_bytes())?;
        writer.write_all(&self.crc32.to_le_bytes())?;
        writer.write_all(&self.compressed_size.to_le_bytes())?;
        writer.write_all(&self.uncompressed_size.to_le_bytes())?;
        writer.write_all(&(self.filename.len() as u16).to_le_bytes())?;
        writer.write_all(&0u16.to_le_bytes())?;
        writer.write_all(&self.filename)
    }

    fn write_central<W: Write>(&self, writer: &mut W) -> io::Result<u64> {
        writer.write_all(&CENTRAL_DIR_HEADER_SIG.to_le_bytes())?;
        // Version made by: Unix, 3.0
        writer.write_all(&0x031Eu16.to_le_bytes())?;
        writer.write_all(&self.version_needed.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.method.to_le_bytes())?;
        writer.write_all(&self.mtime.to_le_bytes())?;
        writer.write_all(&self.mdate.to_le_bytes())?;
        writer.write_all(&self.crc32.to_le_bytes())?;
        writer.write_all(&self.compressed_size.to_le_bytes())?;
        writer.write_all(&self.uncompressed_size.to_le_bytes())?;
        writer.write_all(&(self.filename.len() as u16).to_le_bytes())?;
        // Extra, comment, disk start, internal attributes
        writer.write_all(&[0u8; 8])?;
        writer.write_all(&self.external_attr.to_le_bytes())?;
        writer.write_all(&self.header_offset.to_le_bytes())?;
        writer.write_all(&self.filename)?;
        Ok((CENTRAL_HEADER_LEN + self.filename.len()) as u64)
    }
}

fn fits_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .ok()
        .filter(|&v| v != ZIP64_MARKER_32)
        .ok_or_else(|| {
            ArchiveError::invalid_operation(format!("{} exceeds the 4 GiB ZIP limit", what))
        })
}

/// ZIP archive writer.
///
/// Entries are written as they are added; `finish` appends the central
/// directory. ZIP64 output is not produced, so an archive or entry that
/// would need it is rejected.
pub struct ZipWriter<W: Write> {
    writer: W,
    records: Vec<CentralRecord>,
    offset: u64,
    compression: ZipCompressionLevel,
}

impl<W: Write> ZipWriter<W> {
    /// Create a new ZIP writer with default compression.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            records: Vec::new(),
            offset: 0,
            compression: ZipCompressionLevel::default(),
        }
    }

    /// Set the compression level for subsequent files.
    pub fn set_compression(&mut self, level: ZipCompressionLevel) {
        self.compression = level;
    }

    /// Add a file stamped with the current time.
    pub fn add_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.add_file_with_modified(name, data, SystemTime::now())
    }

    /// Add a file with an explicit modification time.
    ///
    /// Deflated output that is not smaller than the input is stored instead.
    pub fn add_file_with_modified(
        &mut self,
        name: &str,
        data: &[u8],
        modified: SystemTime,
    ) -> Result<()> {
        let crc32 = crc32fast::hash(data);
        let deflated = match self.compression.deflate_level() {
            Some(level) => {
                let mut encoder = DeflateEncoder::new(Vec::new(), level);
                encoder.write_all(data)?;
                Some(encoder.finish()?).filter(|out| out.len() < data.len())
            }
            None => None,
        };
        let (method, version_needed, payload) = match &deflated {
            Some(out) => (8u16, 20u16, out.as_slice()),
            None => (0, 10, data),
        };

        let record = self.record(name, modified, 0o100644)?;
        let record = CentralRecord {
            method,
            version_needed,
            crc32,
            compressed_size: fits_u32(payload.len() as u64, name)?,
            uncompressed_size: fits_u32(data.len() as u64, name)?,
            ..record
        };
        self.emit(record, payload)
    }

    /// Add a directory entry. A trailing `/` is appended if missing.
    pub fn add_directory(&mut self, name: &str, modified: SystemTime) -> Result<()> {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{}/", name)
        };
        let record = self.record(&name, modified, 0o40755)?;
        self.emit(record, &[])
    }

    fn record(&self, name: &str, modified: SystemTime, mode: u32) -> Result<CentralRecord> {
        if name.len() > usize::from(u16::MAX) {
            return Err(ArchiveError::out_of_range("name", name));
        }
        let (mtime, mdate) = system_time_to_dos(modified);
        Ok(CentralRecord {
            flags: if name.is_ascii() { 0 } else { FLAG_UTF8 },
            version_needed: 10,
            method: 0,
            mtime,
            mdate,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            filename: name.as_bytes().to_vec(),
            external_attr: mode << 16,
            header_offset: fits_u32(self.offset, "archive")?,
        })
    }

    fn emit(&mut self, record: CentralRecord, payload: &[u8]) -> Result<()> {
        record.write_local(&mut self.writer)?;
        self.writer.write_all(payload)?;
        self.offset += LOCAL_HEADER_LEN + record.filename.len() as u64 + payload.len() as u64;
        self.records.push(record);
        Ok(())
    }

    /// Write the central directory and return the inner writer.
    pub fn finish(mut self) -> Result<W> {
        if self.records.len() >= usize::from(ZIP64_MARKER_16) {
            return Err(ArchiveError::invalid_operation(
                "too many entries for a ZIP without ZIP64",
            ));
        }
        let cd_offset = fits_u32(self.offset, "archive")?;
        let mut cd_size = 0u64;
        for record in &self.records {
            cd_size += record.write_central(&mut self.writer)?;
        }
        let cd_size = fits_u32(cd_size, "central directory")?;
        let count = self.records.len() as u16;

        self.writer.write_all(&END_OF_CENTRAL_DIR_SIG.to_le_bytes())?;
        // Disk numbers
        self.writer.write_all(&[0u8; 4])?;
        self.writer.write_all(&count.to_le_bytes())?;
        self.writer.write_all(&count.to_le_bytes())?;
        self.writer.write_all(&cd_size.to_le_bytes())?;
        self.writer.write_all(&cd_offset.to_le_bytes())?;
        // Comment length
        self.writer.write_all(&0u16.to_le_bytes())?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RawCentral, raw_zip};
    use std::io::Cursor;

    fn archive(files: &[(&str, &[u8])], level: ZipCompressionLevel) -> Vec<u8> {
        let mut writer = ZipWriter::new(Vec::new());
        writer.set_compression(level);
        for (name, data) in files {
            writer.add_file(name, data).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_dos_time_roundtrip() {
        // 2024-02-29 13:45:30 UTC
        let time = UNIX_EPOCH + Duration::from_secs(1_709_214_330);
        let (t, d) = system_time_to_dos(time);
        assert_eq!(d >> 9, 44);
        assert_eq!((d >> 5) & 0x0F, 2);
        assert_eq!(d & 0x1F, 29);
        assert_eq!(dos_to_system_time(t, d), time);
    }

    #[test]
    fn test_dos_time_edges() {
        assert_eq!(dos_to_system_time(0, 0), UNIX_EPOCH);
        assert_eq!(system_time_to_dos(UNIX_EPOCH), (0, 0x21));
        assert_eq!(
            dos_to_system_time(0, 0x21),
            UNIX_EPOCH + Duration::from_secs(315_532_800)
        );
    }

    #[test]
    fn test_civil_roundtrip() {
        for days in [-1, 0, 59, 365, 10_957, 19_782, 47_482] {
            let (y, m, d) = civil_from_days(days);
            assert_eq!(days_from_civil(y, m, d), days);
        }
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(10_957), (2000, 1, 1));
    }

    #[test]
    fn test_zip_writer_single_file() {
        let data = b"Hello, ZIP! ".repeat(20);
        let bytes = archive(&[("hello.txt", &data)], ZipCompressionLevel::Normal);

        let mut reader = ZipReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.entries().len(), 1);
        let entry = reader.entries()[0].clone();
        assert_eq!(entry.name, "hello.txt");
        assert_eq!(entry.length, data.len() as i64);
        assert_eq!(entry.method, CompressionMethod::Deflate);
        assert_eq!(reader.extract(&entry).unwrap(), data);
    }

    #[test]
    fn test_zip_writer_stored() {
        let bytes = archive(&[("raw.bin", b"abc")], ZipCompressionLevel::Store);
        let mut reader = ZipReader::new(Cursor::new(bytes)).unwrap();
        let entry = reader.entries()[0].clone();
        assert_eq!(entry.method, CompressionMethod::Stored);
        assert_eq!(entry.compressed_length, 3);
        assert_eq!(reader.extract(&entry).unwrap(), b"abc");
    }

    #[test]
    fn test_zip_writer_directory_and_utf8() {
        let mut writer = ZipWriter::new(Vec::new());
        writer.add_directory("docs", UNIX_EPOCH).unwrap();
        writer.add_file("docs/résumé.txt", b"cv").unwrap();
        let bytes = writer.finish().unwrap();

        let reader = ZipReader::new(Cursor::new(bytes)).unwrap();
        let names: Vec<_> = reader.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["docs/", "docs/résumé.txt"]);
        assert!(reader.entries()[0].is_dir());
    }

    #[test]
    fn test_crc_mismatch_detected() {
        let mut bytes = archive(&[("a.txt", b"payload")], ZipCompressionLevel::Store);
        // Stored data follows the 30-byte header and the 5-byte name.
        bytes[35] ^= 0xFF;
        let mut reader = ZipReader::new(Cursor::new(bytes)).unwrap();
        let entry = reader.entries()[0].clone();
        assert!(matches!(
            reader.extract(&entry),
            Err(ArchiveError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_local_header_fallback() {
        let bytes = archive(
            &[("one.txt", b"1"), ("two.txt", b"22")],
            ZipCompressionLevel::Store,
        );
        // Drop the central directory and end record.
        let cut = 2 * 30 + 7 + 1 + 7 + 2;
        let mut reader = ZipReader::new(Cursor::new(bytes[..cut].to_vec())).unwrap();
        assert_eq!(reader.entries().len(), 2);
        let entry = reader.entries()[1].clone();
        assert_eq!(reader.extract(&entry).unwrap(), b"22");
    }

    #[test]
    fn test_empty_stream_has_no_entries() {
        let reader = ZipReader::new(Cursor::new(Vec::new())).unwrap();
        assert!(reader.entries().is_empty());
        let reader = ZipReader::new(Cursor::new(b"not a zip".to_vec())).unwrap();
        assert!(reader.entries().is_empty());
    }

    #[test]
    fn test_zip64_extra_field_parsing() {
        let mut extra = Vec::new();
        extra.extend_from_slice(&0x5455u16.to_le_bytes());
        extra.extend_from_slice(&1u16.to_le_bytes());
        extra.push(0);
        extra.extend_from_slice(&ZIP64_EXTRA_FIELD_ID.to_le_bytes());
        extra.extend_from_slice(&16u16.to_le_bytes());
        extra.extend_from_slice(&5_000_000_000u64.to_le_bytes());
        extra.extend_from_slice(&42u64.to_le_bytes());

        let values = parse_zip64_extra(&extra, ZIP64_MARKER_32, 7, ZIP64_MARKER_32);
        assert_eq!(values.uncompressed, Some(5_000_000_000));
        assert_eq!(values.compressed, None);
        assert_eq!(values.header_offset, Some(42));

        let values = parse_zip64_extra(&extra, 1, 2, 3);
        assert_eq!(values, Zip64Values::default());
    }

    #[test]
    fn test_huge_declared_length_reads_real_data() {
        let bytes = raw_zip(
            "big.bin",
            b"only a few bytes",
            RawCentral {
                uncompressed: ZIP64_MARKER_32,
                compressed: 16,
                header_offset: 0,
                zip64: &[1 << 62],
            },
        );
        let mut reader = ZipReader::new(Cursor::new(bytes)).unwrap();
        let entry = reader.entries()[0].clone();
        assert_eq!(entry.length, 1 << 62);
        assert_eq!(reader.extract(&entry).unwrap(), b"only a few bytes");
    }

    #[test]
    fn test_overflowing_header_offset_falls_back_to_local_headers() {
        let bytes = raw_zip(
            "a.txt",
            b"payload",
            RawCentral {
                uncompressed: 7,
                compressed: 7,
                header_offset: ZIP64_MARKER_32,
                zip64: &[u64::MAX - 4],
            },
        );
        let mut reader = ZipReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.entries().len(), 1);
        let entry = reader.entries()[0].clone();
        assert_eq!(entry.name, "a.txt");
        assert_eq!(reader.extract(&entry).unwrap(), b"payload");
    }

    #[test]
    fn test_offset_add_rejects_overflow() {
        assert_eq!(offset_add(10, 20).unwrap(), 30);
        assert!(offset_add(u64::MAX - 4, 26).unwrap_err().is_structural());
    }

    #[test]
    fn test_latin1_name_decoding() {
        assert_eq!(decode_text(&[b'c', 0xE9], 0), "cé");
        assert_eq!(decode_text("cé".as_bytes(), FLAG_UTF8), "cé");
    }
}
