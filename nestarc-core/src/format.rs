//! Container formats, implementation kinds, and format detection.
//!
//! Formats are inferred primarily from file-name suffixes (a name may carry
//! several, e.g. `backup.tar.gz`), with magic-number detection available as a
//! fallback for files whose names say nothing.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Known container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Format {
    /// No format / unrecognized.
    None,
    /// ZIP archive (.zip).
    Zip,
    /// GZIP compressed stream (.gz).
    GZip,
    /// TAR archive (.tar).
    Tar,
    /// Bzip2 compressed stream (.bz2).
    BZip2,
}

impl Format {
    /// All concrete formats, in suffix-table order.
    pub const ALL: [Format; 4] = [Format::Zip, Format::GZip, Format::Tar, Format::BZip2];

    /// Map a file extension (without the dot, any case) to a format.
    pub fn from_extension(ext: &str) -> Self {
        if ext.eq_ignore_ascii_case("zip") {
            Self::Zip
        } else if ext.eq_ignore_ascii_case("gz") {
            Self::GZip
        } else if ext.eq_ignore_ascii_case("tar") {
            Self::Tar
        } else if ext.eq_ignore_ascii_case("bz2") {
            Self::BZip2
        } else {
            Self::None
        }
    }

    /// All formats implied by a file name's suffixes, outermost first.
    ///
    /// `logs.tar.gz` yields `[GZip, Tar]`; the walk stops at the first
    /// suffix that is not a known format, so `v1.2.zip` yields `[Zip]`.
    pub fn from_file_name(name: &str) -> Vec<Format> {
        let file_name = name
            .trim_end_matches(['/', '\\'])
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();

        let mut formats = Vec::new();
        let mut rest = file_name;
        while let Some(dot) = rest.rfind('.') {
            if dot == 0 {
                break;
            }
            let format = Self::from_extension(&rest[dot + 1..]);
            if format == Self::None {
                break;
            }
            formats.push(format);
            rest = &rest[..dot];
        }
        formats
    }

    /// The outermost format implied by a file name, or `Format::None`.
    pub fn from_path_suffix(name: &str) -> Self {
        Self::from_file_name(name)
            .first()
            .copied()
            .unwrap_or(Self::None)
    }

    /// Detect format from magic bytes.
    pub fn from_magic(magic: &[u8]) -> Self {
        if magic.len() < 2 {
            return Self::None;
        }

        // ZIP: 0x50 0x4B (PK), local header or empty-archive EOCD
        if magic.len() >= 4
            && magic.starts_with(&[0x50, 0x4B])
            && matches!(&magic[2..4], [0x03, 0x04] | [0x05, 0x06] | [0x07, 0x08])
        {
            return Self::Zip;
        }

        // GZIP: 0x1F 0x8B
        if magic.starts_with(&[0x1F, 0x8B]) {
            return Self::GZip;
        }

        // Bzip2: 0x42 0x5A 0x68 (BZh)
        if magic.len() >= 3 && magic.starts_with(b"BZh") {
            return Self::BZip2;
        }

        // TAR: "ustar" at offset 257
        if magic.len() >= 262 && &magic[257..262] == b"ustar" {
            return Self::Tar;
        }

        Self::None
    }

    /// Detect format from a reader, returning the bytes consumed.
    pub fn detect<R: Read>(reader: &mut R) -> Result<(Self, Vec<u8>)> {
        let mut magic = vec![0u8; 262]; // Enough for TAR detection
        let mut filled = 0;
        while filled < magic.len() {
            let n = reader.read(&mut magic[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        magic.truncate(filled);

        let format = Self::from_magic(&magic);
        Ok((format, magic))
    }

    /// Get the typical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::GZip => "gz",
            Self::Tar => "tar",
            Self::BZip2 => "bz2",
            Self::None => "",
        }
    }

    /// The implementation used when a caller does not ask for one.
    pub fn preferred_implementation(&self) -> Implementation {
        match self {
            Self::None => Implementation::None,
            _ => Implementation::Native,
        }
    }

    /// Whether the format holds multiple named entries.
    pub fn is_archive(&self) -> bool {
        matches!(self, Self::Zip | Self::Tar)
    }

    /// Whether the format compresses its payload.
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Zip | Self::GZip | Self::BZip2)
    }

    /// Whether entry data can be located by seeking within the container.
    ///
    /// Stream compressors have to be decoded front to back, so a container
    /// nested inside one must be materialized before it can be opened.
    pub fn is_seekable(&self) -> bool {
        matches!(self, Self::Zip | Self::Tar)
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Zip => write!(f, "ZIP"),
            Self::GZip => write!(f, "GZIP"),
            Self::Tar => write!(f, "TAR"),
            Self::BZip2 => write!(f, "Bzip2"),
        }
    }
}

/// Which concrete codec/library backs a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Implementation {
    /// No implementation.
    None,
    /// Wildcard matching any concrete implementation during lookup.
    Any,
    /// The crate's own container handling.
    Native,
    /// A thin wrapper over the host codec's stream reader/writer.
    Stream,
}

impl std::fmt::Display for Implementation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::Any => "Any",
            Self::Native => "Native",
            Self::Stream => "Stream",
        };
        f.write_str(name)
    }
}

/// Registry key: a format paired with an implementation kind.
///
/// Ordering is by format first, so all implementations of one format sort
/// together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchiveId {
    /// Container format.
    pub format: Format,
    /// Implementation kind.
    pub implementation: Implementation,
}

impl ArchiveId {
    /// Create a new identifier.
    pub const fn new(format: Format, implementation: Implementation) -> Self {
        Self {
            format,
            implementation,
        }
    }

    /// The wildcard identifier for a format.
    pub const fn any(format: Format) -> Self {
        Self::new(format, Implementation::Any)
    }
}

impl std::fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.format, self.implementation)
    }
}
