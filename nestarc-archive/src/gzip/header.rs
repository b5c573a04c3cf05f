//! GZIP member header parsing and writing (RFC 1952).

use encoding_rs::WINDOWS_1252;
use nestarc_core::error::{ArchiveError, Result};
use std::io::{Read, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// GZIP magic bytes.
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// GZIP compression method: DEFLATE.
pub const CM_DEFLATE: u8 = 8;

/// Size of the fixed part of a member header.
pub const FIXED_HEADER_LEN: usize = 10;

/// Size of a member trailer (CRC32 + ISIZE).
pub const TRAILER_LEN: u64 = 8;

/// GZIP header flags.
pub mod flags {
    /// Text file.
    pub const FTEXT: u8 = 0x01;
    /// Header CRC present.
    pub const FHCRC: u8 = 0x02;
    /// Extra field present.
    pub const FEXTRA: u8 = 0x04;
    /// Original filename present.
    pub const FNAME: u8 = 0x08;
    /// Comment present.
    pub const FCOMMENT: u8 = 0x10;
    /// Bits that must be zero.
    pub const RESERVED: u8 = 0xE0;
}

/// Operating system tag values.
pub mod os {
    /// FAT filesystem (MS-DOS, OS/2, NT/Win32).
    pub const FAT: u8 = 0;
    /// Unix.
    pub const UNIX: u8 = 3;
    /// NTFS (Windows NT).
    pub const NTFS: u8 = 11;
    /// Unknown.
    pub const UNKNOWN: u8 = 255;

    /// Human-readable name of an OS tag.
    pub fn name(tag: u8) -> &'static str {
        match tag {
            0 => "FAT",
            1 => "Amiga",
            2 => "VMS",
            3 => "Unix",
            4 => "VM/CMS",
            5 => "Atari TOS",
            6 => "HPFS",
            7 => "Macintosh",
            8 => "Z-System",
            9 => "CP/M",
            10 => "TOPS-20",
            11 => "NTFS",
            12 => "QDOS",
            13 => "Acorn RISCOS",
            _ => "Unknown",
        }
    }
}

/// Compression-effort hint carried in the XFL byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionEffort {
    /// No hint.
    Default,
    /// Maximum compression, slowest algorithm.
    Maximum,
    /// Fastest algorithm.
    Fastest,
    /// Value not defined by RFC 1952.
    Other(u8),
}

impl CompressionEffort {
    /// Decode an XFL byte.
    pub fn from_xfl(xfl: u8) -> Self {
        match xfl {
            0 => Self::Default,
            2 => Self::Maximum,
            4 => Self::Fastest,
            other => Self::Other(other),
        }
    }
}

/// Recognized extra-field subfield ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubfieldKind {
    /// `AP`: Apollo file type information.
    Apollo,
    /// `RA`: dictzip random-access chunk table.
    RandomAccess,
    /// `BC`: BGZF compressed block size.
    Bgzf,
    /// Anything else.
    Unknown,
}

/// One subfield of the FEXTRA block. Kept for information only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraSubfield {
    /// Two-byte subfield id.
    pub id: [u8; 2],
    /// Subfield payload.
    pub data: Vec<u8>,
}

impl ExtraSubfield {
    /// Classify the subfield id.
    pub fn kind(&self) -> SubfieldKind {
        match &self.id {
            b"AP" => SubfieldKind::Apollo,
            b"RA" => SubfieldKind::RandomAccess,
            b"BC" => SubfieldKind::Bgzf,
            _ => SubfieldKind::Unknown,
        }
    }

    /// Split an FEXTRA payload into subfields.
    ///
    /// A subfield whose declared length runs past the block ends the walk;
    /// whatever was parsed before it is kept.
    fn parse_all(block: &[u8]) -> Vec<Self> {
        let mut subfields = Vec::new();
        let mut offset = 0;
        while offset + 4 <= block.len() {
            let id = [block[offset], block[offset + 1]];
            let len = u16::from_le_bytes([block[offset + 2], block[offset + 3]]) as usize;
            offset += 4;
            if offset + len > block.len() {
                break;
            }
            subfields.push(Self {
                id,
                data: block[offset..offset + len].to_vec(),
            });
            offset += len;
        }
        subfields
    }
}

/// GZIP member header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GzipHeader {
    /// Compression method (always 8 for DEFLATE).
    pub method: u8,
    /// Flags.
    pub flags: u8,
    /// Modification time (Unix timestamp, 0 = unknown).
    pub mtime: u32,
    /// Extra flags.
    pub xfl: u8,
    /// Operating system.
    pub os: u8,
    /// Extra-field subfields (if FEXTRA flag set).
    pub extra: Vec<ExtraSubfield>,
    /// Original filename (if FNAME flag set), decoded as Latin-1.
    pub filename: Option<String>,
    /// Comment (if FCOMMENT flag set), decoded as Latin-1.
    pub comment: Option<String>,
    /// Header CRC16 (if FHCRC flag set).
    pub header_crc: Option<u16>,
}

impl Default for GzipHeader {
    fn default() -> Self {
        Self {
            method: CM_DEFLATE,
            flags: 0,
            mtime: 0,
            xfl: 0,
            os: os::UNKNOWN,
            extra: Vec::new(),
            filename: None,
            comment: None,
            header_crc: None,
        }
    }
}

impl GzipHeader {
    /// Create a new GZIP header with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a header with filename.
    pub fn with_filename(filename: &str) -> Self {
        Self {
            flags: flags::FNAME,
            filename: Some(filename.to_string()),
            ..Self::default()
        }
    }

    /// Set the modification time.
    pub fn with_mtime(mut self, time: SystemTime) -> Self {
        self.mtime = time
            .duration_since(UNIX_EPOCH)
            .map(|d| u32::try_from(d.as_secs()).unwrap_or(0))
            .unwrap_or(0);
        self
    }

    /// Set the modification time to now.
    pub fn with_mtime_now(self) -> Self {
        self.with_mtime(SystemTime::now())
    }

    /// Modification time, or the epoch when the header records none.
    pub fn last_modified(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(u64::from(self.mtime))
    }

    /// Decoded XFL hint.
    pub fn compression_effort(&self) -> CompressionEffort {
        CompressionEffort::from_xfl(self.xfl)
    }

    /// Whether the member declares itself as text.
    pub fn is_text(&self) -> bool {
        self.flags & flags::FTEXT != 0
    }

    /// Serialize the header.
    ///
    /// Optional fields are written when their flag is set. When FHCRC is set
    /// the CRC16 is computed over the bytes written before it.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.flags & flags::RESERVED != 0 {
            return Err(ArchiveError::invalid_header(format!(
                "reserved GZIP flag bits set: {:#04x}",
                self.flags
            )));
        }

        let mut out = Vec::with_capacity(FIXED_HEADER_LEN + 32);
        out.extend_from_slice(&GZIP_MAGIC);
        out.push(self.method);
        out.push(self.flags);
        out.extend_from_slice(&self.mtime.to_le_bytes());
        out.push(self.xfl);
        out.push(self.os);

        if self.flags & flags::FEXTRA != 0 {
            let mut block = Vec::new();
            for subfield in &self.extra {
                block.extend_from_slice(&subfield.id);
                block.extend_from_slice(&(subfield.data.len() as u16).to_le_bytes());
                block.extend_from_slice(&subfield.data);
            }
            let xlen = u16::try_from(block.len())
                .map_err(|_| ArchiveError::invalid_header("GZIP extra field too long"))?;
            out.extend_from_slice(&xlen.to_le_bytes());
            out.extend_from_slice(&block);
        }

        if self.flags & flags::FNAME != 0 {
            Self::push_latin1(&mut out, self.filename.as_deref().unwrap_or_default())?;
        }

        if self.flags & flags::FCOMMENT != 0 {
            Self::push_latin1(&mut out, self.comment.as_deref().unwrap_or_default())?;
        }

        if self.flags & flags::FHCRC != 0 {
            let crc16 = (crc32fast::hash(&out) & 0xFFFF) as u16;
            out.extend_from_slice(&crc16.to_le_bytes());
        }

        Ok(out)
    }

    /// Write the header to a writer, returning the number of bytes written.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let bytes = self.to_bytes()?;
        writer.write_all(&bytes)?;
        Ok(bytes.len())
    }

    /// Read a GZIP header from a reader.
    ///
    /// Fails with a structural error on bad magic, a method other than
    /// DEFLATE, reserved flag bits, or a header CRC16 that does not match.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut raw = Vec::with_capacity(FIXED_HEADER_LEN + 32);
        let mut buf = [0u8; FIXED_HEADER_LEN];
        reader.read_exact(&mut buf)?;
        raw.extend_from_slice(&buf);

        // Check magic
        if buf[0..2] != GZIP_MAGIC {
            return Err(ArchiveError::invalid_magic(
                GZIP_MAGIC.to_vec(),
                buf[0..2].to_vec(),
            ));
        }

        let method = buf[2];
        if method != CM_DEFLATE {
            return Err(ArchiveError::unsupported_method(format!(
                "GZIP method {}",
                method
            )));
        }

        let flags = buf[3];
        if flags & flags::RESERVED != 0 {
            return Err(ArchiveError::invalid_header(format!(
                "reserved GZIP flag bits set: {:#04x}",
                flags
            )));
        }

        let mtime = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let xfl = buf[8];
        let os = buf[9];

        let mut extra = Vec::new();
        let mut filename = None;
        let mut comment = None;
        let mut header_crc = None;

        // Extra field
        if flags & flags::FEXTRA != 0 {
            let mut xlen_buf = [0u8; 2];
            reader.read_exact(&mut xlen_buf)?;
            raw.extend_from_slice(&xlen_buf);
            let xlen = u16::from_le_bytes(xlen_buf) as usize;
            let mut block = vec![0u8; xlen];
            reader.read_exact(&mut block)?;
            raw.extend_from_slice(&block);
            extra = ExtraSubfield::parse_all(&block);
        }

        // Filename
        if flags & flags::FNAME != 0 {
            filename = Some(Self::read_null_terminated(reader, &mut raw)?);
        }

        // Comment
        if flags & flags::FCOMMENT != 0 {
            comment = Some(Self::read_null_terminated(reader, &mut raw)?);
        }

        // Header CRC
        if flags & flags::FHCRC != 0 {
            let mut crc_buf = [0u8; 2];
            reader.read_exact(&mut crc_buf)?;
            let stored = u16::from_le_bytes(crc_buf);
            let computed = (crc32fast::hash(&raw) & 0xFFFF) as u16;
            if stored != computed {
                return Err(ArchiveError::invalid_header(format!(
                    "GZIP header CRC16 mismatch: stored {:#06x}, computed {:#06x}",
                    stored, computed
                )));
            }
            header_crc = Some(stored);
        }

        Ok(Self {
            method,
            flags,
            mtime,
            xfl,
            os,
            extra,
            filename,
            comment,
            header_crc,
        })
    }

    /// Read a null-terminated Latin-1 string.
    fn read_null_terminated<R: Read>(reader: &mut R, raw: &mut Vec<u8>) -> Result<String> {
        let mut bytes = Vec::new();
        let mut buf = [0u8; 1];

        loop {
            reader.read_exact(&mut buf)?;
            raw.push(buf[0]);
            if buf[0] == 0 {
                break;
            }
            bytes.push(buf[0]);
        }

        let (text, _) = WINDOWS_1252.decode_without_bom_handling(&bytes);
        Ok(text.into_owned())
    }

    /// Append a Latin-1 encoded, null-terminated string.
    fn push_latin1(out: &mut Vec<u8>, text: &str) -> Result<()> {
        if text.contains('\0') {
            return Err(ArchiveError::invalid_header(
                "GZIP header strings cannot contain NUL",
            ));
        }
        let (bytes, _, _) = WINDOWS_1252.encode(text);
        out.extend_from_slice(&bytes);
        out.push(0);
        Ok(())
    }
}
