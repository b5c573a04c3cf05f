//! Archive entry metadata.
//!
//! This module defines the `Entry` struct that represents a file or directory
//! within a container. Every backend, and the nested-archive navigator when
//! it synthesizes directories or re-prefixes names, produces this same type,
//! so consuming code never has to branch on where an entry came from.

use std::time::SystemTime;

/// Compression method used for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    /// No compression (stored).
    #[default]
    Stored,
    /// DEFLATE compression (ZIP, GZIP).
    Deflate,
    /// Unknown/unsupported method.
    Unknown(u16),
}

impl CompressionMethod {
    /// Map a ZIP/GZIP method code.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::Stored,
            8 => Self::Deflate,
            _ => Self::Unknown(value),
        }
    }

    /// The on-disk method code.
    pub fn code(&self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflate => 8,
            Self::Unknown(id) => *id,
        }
    }

    /// Get the method name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stored => "Stored",
            Self::Deflate => "Deflate",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(id) => write!(f, "Unknown({})", id),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// An entry in a container.
///
/// `name` is container-relative and forward-slash separated; directory
/// names end with `/`. `length` is `-1` when the uncompressed size is not
/// known, and `last_modified` is [`std::time::UNIX_EPOCH`] when the
/// container records no timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The name/path of the entry within the container.
    pub name: String,
    /// Uncompressed size in bytes, or [`Entry::UNKNOWN_LENGTH`].
    pub length: i64,
    /// Last modification time (epoch when unknown).
    pub last_modified: SystemTime,
    /// Whether this entry is a directory.
    pub is_directory: bool,
    /// Compressed size in bytes, or [`Entry::UNKNOWN_LENGTH`].
    pub compressed_length: i64,
    /// Compression method.
    pub method: CompressionMethod,
    /// CRC-32 checksum (if available).
    pub crc32: Option<u32>,
    /// Comment (if available).
    pub comment: Option<String>,
    /// Offset in the container (format-specific, for reader use).
    pub offset: u64,
}

impl Entry {
    /// Sentinel for an unknown length.
    pub const UNKNOWN_LENGTH: i64 = -1;

    /// Upper bound on the buffer reserved from a declared length.
    pub const MAX_PREALLOC: usize = 1 << 20;

    /// Create a new file entry.
    pub fn file(name: impl Into<String>, length: i64) -> Self {
        Self {
            name: name.into(),
            length,
            last_modified: SystemTime::UNIX_EPOCH,
            is_directory: false,
            compressed_length: Self::UNKNOWN_LENGTH,
            method: CompressionMethod::Stored,
            crc32: None,
            comment: None,
            offset: 0,
        }
    }

    /// Create a new directory entry. A trailing `/` is appended if missing.
    pub fn directory(name: impl Into<String>) -> Self {
        let mut name = name.into();
        if !name.ends_with('/') {
            name.push('/');
        }
        Self {
            name,
            length: 0,
            last_modified: SystemTime::UNIX_EPOCH,
            is_directory: true,
            compressed_length: 0,
            method: CompressionMethod::Stored,
            crc32: None,
            comment: None,
            offset: 0,
        }
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.is_directory
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        !self.is_directory
    }

    /// Whether the length is known.
    pub fn has_length(&self) -> bool {
        self.length >= 0
    }

    /// Initial buffer size for reading this entry.
    ///
    /// The declared length comes from the container and is not trusted, so
    /// the hint never exceeds [`Entry::MAX_PREALLOC`].
    pub fn capacity_hint(&self) -> usize {
        usize::try_from(self.length).map_or(0, |len| len.min(Self::MAX_PREALLOC))
    }

    /// Whether the container recorded a modification time.
    pub fn has_modified(&self) -> bool {
        self.last_modified != SystemTime::UNIX_EPOCH
    }

    /// The final path segment, without a trailing `/`.
    pub fn file_name(&self) -> &str {
        let trimmed = self.name.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(pos) => &trimmed[pos + 1..],
            None => trimmed,
        }
    }

    /// Return a copy of this entry renamed under `prefix`.
    ///
    /// Used to make entries from a nested container absolute with respect to
    /// the outermost one; `prefix` is expected to end with `/` or be empty.
    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self {
            name: format!("{}{}", prefix, self.name),
            ..self.clone()
        }
    }

    /// Builder method to set compression method.
    pub fn with_method(mut self, method: CompressionMethod) -> Self {
        self.method = method;
        self
    }

    /// Builder method to set compressed length.
    pub fn with_compressed_length(mut self, length: i64) -> Self {
        self.compressed_length = length;
        self
    }

    /// Builder method to set modification time.
    pub fn with_modified(mut self, time: SystemTime) -> Self {
        self.last_modified = time;
        self
    }

    /// Builder method to set CRC-32.
    pub fn with_crc32(mut self, crc: u32) -> Self {
        self.crc32 = Some(crc);
        self
    }

    /// Builder method to set the container offset.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Builder method to set comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self::file("", Self::UNKNOWN_LENGTH)
    }
}

impl std::fmt::Display for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let type_char = if self.is_directory { 'd' } else { '-' };
        if self.has_length() {
            write!(f, "{}{:>12} {}", type_char, self.length, self.name)
        } else {
            write!(f, "{}{:>12} {}", type_char, "?", self.name)
        }
    }
}
