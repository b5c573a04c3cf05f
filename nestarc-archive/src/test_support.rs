//! Helpers shared by unit tests.

use nestarc_core::stream::ByteStream;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use parking_lot::Mutex;
use std::sync::Arc;

/// In-memory stream whose bytes stay observable after an accessor drops it.
#[derive(Clone, Default)]
pub(crate) struct SharedStream(Arc<Mutex<Cursor<Vec<u8>>>>);

impl SharedStream {
    pub(crate) fn with_bytes(bytes: Vec<u8>) -> Self {
        Self(Arc::new(Mutex::new(Cursor::new(bytes))))
    }

    pub(crate) fn bytes(&self) -> Vec<u8> {
        self.0.lock().get_ref().clone()
    }
}

impl Read for SharedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.lock().read(buf)
    }
}

impl Write for SharedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SharedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.lock().seek(pos)
    }
}

impl ByteStream for SharedStream {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        ByteStream::set_len(&mut *self.0.lock(), len)
    }
}

/// Central-directory fields of a hand-built one-entry stored ZIP.
///
/// A field set to `0xFFFF_FFFF` takes its value from the ZIP64 extra
/// field, which holds `zip64` in the usual uncompressed, compressed, offset
/// order. The local header always carries the true sizes.
pub(crate) struct RawCentral<'a> {
    pub(crate) uncompressed: u32,
    pub(crate) compressed: u32,
    pub(crate) header_offset: u32,
    pub(crate) zip64: &'a [u64],
}

pub(crate) fn raw_zip(name: &str, data: &[u8], central: RawCentral<'_>) -> Vec<u8> {
    let crc = crc32fast::hash(data);
    let size = data.len() as u32;
    let mut bytes = Vec::new();

    bytes.extend_from_slice(&0x04034B50u32.to_le_bytes());
    bytes.extend_from_slice(&20u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0x21u16.to_le_bytes());
    bytes.extend_from_slice(&crc.to_le_bytes());
    bytes.extend_from_slice(&size.to_le_bytes());
    bytes.extend_from_slice(&size.to_le_bytes());
    bytes.extend_from_slice(&(name.len() as u16).to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(name.as_bytes());
    bytes.extend_from_slice(data);

    let mut extra = Vec::new();
    if !central.zip64.is_empty() {
        extra.extend_from_slice(&0x0001u16.to_le_bytes());
        extra.extend_from_slice(&((central.zip64.len() * 8) as u16).to_le_bytes());
        for value in central.zip64 {
            extra.extend_from_slice(&value.to_le_bytes());
        }
    }

    let cd_offset = bytes.len() as u32;
    bytes.extend_from_slice(&0x02014B50u32.to_le_bytes());
    bytes.extend_from_slice(&45u16.to_le_bytes());
    bytes.extend_from_slice(&45u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0x21u16.to_le_bytes());
    bytes.extend_from_slice(&crc.to_le_bytes());
    bytes.extend_from_slice(&central.compressed.to_le_bytes());
    bytes.extend_from_slice(&central.uncompressed.to_le_bytes());
    bytes.extend_from_slice(&(name.len() as u16).to_le_bytes());
    bytes.extend_from_slice(&(extra.len() as u16).to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&central.header_offset.to_le_bytes());
    bytes.extend_from_slice(name.as_bytes());
    bytes.extend_from_slice(&extra);
    let cd_size = bytes.len() as u32 - cd_offset;

    bytes.extend_from_slice(&0x06054B50u32.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&cd_size.to_le_bytes());
    bytes.extend_from_slice(&cd_offset.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes
}
