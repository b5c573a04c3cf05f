//! Owned byte-stream handles.
//!
//! Accessors own exactly one seekable handle. Dropping the box closes it.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// A seekable, readable and writable byte stream owned by an accessor.
pub trait ByteStream: Read + Write + Seek + Send {
    /// Truncate or extend the stream to `len` bytes.
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Total length of the stream. The position is preserved.
    fn length(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let len = self.seek(SeekFrom::End(0))?;
        if pos != len {
            self.seek(SeekFrom::Start(pos))?;
        }
        Ok(len)
    }
}

impl ByteStream for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }

    fn length(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl ByteStream for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds memory"))?;
        self.get_mut().resize(len, 0);
        if self.position() > len as u64 {
            self.set_position(len as u64);
        }
        Ok(())
    }

    fn length(&mut self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

/// Boxed stream handle as stored by accessors.
pub type BoxStream = Box<dyn ByteStream>;
