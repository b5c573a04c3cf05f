//! ZIP archive format support.
//!
//! This module provides reading and writing of ZIP archives as specified
//! in the PKWARE APPNOTE, and the [`ZipArchive`] accessor built on them.

mod archive;
mod header;

pub use archive::ZipArchive;
pub use header::{
    LocalFileHeader, ZipCompressionLevel, ZipReader, ZipWriter, dos_to_system_time,
    system_time_to_dos,
};

use nestarc_core::error::Result;
use std::io::{Read, Seek, Write};

/// Read a ZIP archive.
pub fn read_zip<R: Read + Seek>(reader: R) -> Result<ZipReader<R>> {
    ZipReader::new(reader)
}

/// Create a new ZIP archive writer.
pub fn write_zip<W: Write>(writer: W) -> ZipWriter<W> {
    ZipWriter::new(writer)
}
