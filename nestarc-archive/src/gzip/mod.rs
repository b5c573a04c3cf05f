//! GZIP format support (RFC 1952).
//!
//! Two accessors share the header parser:
//!
//! - [`GzipArchive`] (`Native`) runs the member scan and exposes every member
//!   of a concatenated stream as its own entry.
//! - [`GzipStream`] (`Stream`) is a thin wrapper around the host codec that
//!   shows the whole file as one entry and decodes all members back to back.
//!
//! ## Example
//!
//! ```rust
//! use flate2::{Compression, GzBuilder};
//! use nestarc_archive::gzip;
//! use std::io::{Cursor, Write};
//!
//! let mut encoder = GzBuilder::new()
//!     .filename("hello.txt")
//!     .write(Vec::new(), Compression::default());
//! encoder.write_all(b"Hello, World!").unwrap();
//! let bytes = encoder.finish().unwrap();
//!
//! let members = gzip::scan_members(&mut Cursor::new(bytes), None, -1).unwrap();
//! assert_eq!(members[0].name, "hello.txt");
//! assert_eq!(members[0].length, Some(13));
//! ```

mod archive;
mod header;
mod member;
mod stream;

pub use archive::GzipArchive;
pub use header::{
    CM_DEFLATE, CompressionEffort, ExtraSubfield, GZIP_MAGIC, GzipHeader, SubfieldKind, flags, os,
};
pub use member::{FALLBACK_NAME, GzipMember, default_name, scan_members};
pub use stream::GzipStream;

use nestarc_core::entry::{CompressionMethod, Entry};
use nestarc_core::error::{ArchiveError, Result};
use nestarc_core::traits::AccessMode;
use std::path::Path;
use std::time::SystemTime;

/// An entry created on a GZIP accessor whose data has not been committed.
#[derive(Debug)]
pub(crate) struct StagedMember {
    pub(crate) entry: Entry,
    pub(crate) data: Vec<u8>,
}

impl StagedMember {
    /// Stage a new member after checking the accessor can take one.
    pub(crate) fn stage(
        mode: AccessMode,
        existing: usize,
        staged: &Option<StagedMember>,
        name: &str,
    ) -> Result<Self> {
        if !mode.is_writable() {
            return Err(ArchiveError::invalid_operation(
                "GZIP accessor was opened read-only",
            ));
        }
        if existing > 0 || staged.is_some() {
            return Err(ArchiveError::invalid_operation(
                "GZIP accessor already holds a member",
            ));
        }
        let name = name.trim_end_matches(['/', '\\']);
        let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
        if name.is_empty() {
            return Err(ArchiveError::out_of_range("name", "\"\""));
        }

        let entry = Entry::file(name, 0)
            .with_method(CompressionMethod::Deflate)
            .with_modified(SystemTime::now());
        Ok(Self {
            entry,
            data: Vec::new(),
        })
    }

    /// Writer over the staged data, replacing what was written before.
    pub(crate) fn writer_for<'a>(
        staged: &'a mut Option<StagedMember>,
        entry: &Entry,
    ) -> Result<&'a mut Vec<u8>> {
        match staged {
            Some(member) if member.entry.name == entry.name => {
                member.data.clear();
                Ok(&mut member.data)
            }
            _ => Err(ArchiveError::invalid_operation(format!(
                "{} was not created on this accessor",
                entry.name
            ))),
        }
    }
}

/// Host name used for default member names.
pub(crate) fn host_name(root: Option<&Path>) -> Option<String> {
    root.map(|p| p.to_string_lossy().into_owned())
}
