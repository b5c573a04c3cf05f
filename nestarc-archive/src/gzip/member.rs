//! Multi-member discovery over a GZIP stream.
//!
//! A GZIP file may be a concatenation of independently compressed members.
//! Nothing in the format records where one member ends, so the scan looks
//! for the next `1F 8B` after each header and treats the eight bytes just
//! before it as the previous member's trailer. A magic sequence that occurs
//! inside compressed data fools this heuristic; when the header parse that
//! follows fails, the scan stops and keeps what it already found.
//!
//! Trailing garbage after the last member likewise corrupts the recovered
//! CRC-32 and length of that member. Both are accepted limitations.

use super::header::{GZIP_MAGIC, GzipHeader, TRAILER_LEN};
use log::debug;
use nestarc_core::entry::{CompressionMethod, Entry};
use nestarc_core::error::Result;
use nestarc_core::path;
use std::io::{ErrorKind, Read, Seek, SeekFrom};

/// Bytes read per step while searching for the next magic sequence.
const SCAN_CHUNK: usize = 64 * 1024;

/// Name used when neither the member nor the host supplies one.
pub const FALLBACK_NAME: &str = "data";

/// One member discovered in a GZIP stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GzipMember {
    /// Parsed member header.
    pub header: GzipHeader,
    /// Stream offset of the member's magic bytes.
    pub offset: u64,
    /// Stream offset of the first compressed byte.
    pub data_offset: u64,
    /// Stream offset just past the member's trailer, when delimited.
    pub end: Option<u64>,
    /// Entry name: the embedded filename, or a name derived from the host.
    pub name: String,
    /// CRC-32 recovered from the trailer.
    pub crc32: Option<u32>,
    /// Uncompressed length modulo 2^32 recovered from the trailer.
    pub length: Option<u32>,
}

impl GzipMember {
    /// Whether the header carried its own filename.
    pub fn has_embedded_name(&self) -> bool {
        self.header
            .filename
            .as_deref()
            .is_some_and(|name| !name.is_empty())
    }

    /// Compressed payload size, when the member was delimited.
    pub fn compressed_length(&self) -> Option<u64> {
        self.end
            .and_then(|end| end.checked_sub(self.data_offset + TRAILER_LEN))
    }

    /// Convert to a generic entry.
    pub fn to_entry(&self) -> Entry {
        let length = self
            .length
            .map(i64::from)
            .unwrap_or(Entry::UNKNOWN_LENGTH);
        let compressed = self
            .compressed_length()
            .and_then(|len| i64::try_from(len).ok())
            .unwrap_or(Entry::UNKNOWN_LENGTH);

        let mut entry = Entry::file(self.name.clone(), length)
            .with_method(CompressionMethod::Deflate)
            .with_compressed_length(compressed)
            .with_modified(self.header.last_modified())
            .with_offset(self.offset);
        if let Some(crc) = self.crc32 {
            entry = entry.with_crc32(crc);
        }
        if let Some(comment) = &self.header.comment {
            entry = entry.with_comment(comment.clone());
        }
        entry
    }
}

/// Default member name for a host file: its base name with the final
/// extension removed (`logs/app.log.gz` gives `app.log`).
pub fn default_name(host: Option<&str>) -> String {
    let base = host
        .map(|h| h.trim_end_matches(['/', '\\']))
        .and_then(|h| h.rsplit(['/', '\\']).next())
        .unwrap_or_default();
    let stem = match base.rfind('.') {
        Some(dot) if dot > 0 => &base[..dot],
        _ => base,
    };
    if stem.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        stem.to_string()
    }
}

/// Discover every member of a GZIP stream.
///
/// The walk starts at offset 0 regardless of the current position, and the
/// position is restored before returning. `max_members` bounds the number
/// of members returned; a negative value scans the whole stream.
///
/// A header that fails to parse ends the walk without an error. Only I/O
/// failures other than a short read are returned.
pub fn scan_members<R: Read + Seek>(
    reader: &mut R,
    host_name: Option<&str>,
    max_members: i64,
) -> Result<Vec<GzipMember>> {
    let original = reader.stream_position()?;
    let scanned = scan_from_start(reader, max_members);
    reader.seek(SeekFrom::Start(original))?;

    let mut members = scanned?;
    assign_names(&mut members, &default_name(host_name));
    Ok(members)
}

fn scan_from_start<R: Read + Seek>(reader: &mut R, max_members: i64) -> Result<Vec<GzipMember>> {
    let total = reader.seek(SeekFrom::End(0))?;
    let mut members: Vec<GzipMember> = Vec::new();
    let mut start = 0u64;

    if max_members == 0 {
        return Ok(members);
    }

    loop {
        reader.seek(SeekFrom::Start(start))?;
        let header = match GzipHeader::read(reader) {
            Ok(header) => header,
            Err(err) if err.is_structural() => {
                if members.is_empty() {
                    debug!("no GZIP header at offset 0: {}", err);
                } else {
                    debug!(
                        "false-positive GZIP magic at offset {}, stopping after {} members: {}",
                        start,
                        members.len(),
                        err
                    );
                }
                break;
            }
            Err(err) => return Err(err),
        };
        let data_offset = reader.stream_position()?;

        members.push(GzipMember {
            header,
            offset: start,
            data_offset,
            end: None,
            name: String::new(),
            crc32: None,
            length: None,
        });

        // The search restarts right after the header, so a magic sequence
        // inside compressed data is taken as the next candidate. A trailer
        // is only read when the member is long enough to hold one.
        let next = find_magic(reader, data_offset)?;
        let boundary = next.unwrap_or(total);
        if boundary >= data_offset + TRAILER_LEN {
            let (crc32, length) = read_trailer(reader, boundary - TRAILER_LEN)?;
            if let Some(member) = members.last_mut() {
                member.crc32 = Some(crc32);
                member.length = Some(length);
                member.end = Some(boundary);
            }
        }

        let limit_reached = max_members >= 0 && members.len() as i64 >= max_members;
        match next {
            Some(offset) if !limit_reached => start = offset,
            Some(_) => {
                debug!("GZIP member limit {} reached", max_members);
                break;
            }
            None => break,
        }
    }

    Ok(members)
}

/// Position of the next magic sequence at or after `from`.
fn find_magic<R: Read + Seek>(reader: &mut R, from: u64) -> Result<Option<u64>> {
    reader.seek(SeekFrom::Start(from))?;
    let mut buf = vec![0u8; SCAN_CHUNK];
    let mut base = from;
    let mut carry: Option<u8> = None;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };

        // Magic split across two reads.
        if carry == Some(GZIP_MAGIC[0]) && buf[0] == GZIP_MAGIC[1] {
            return Ok(Some(base - 1));
        }
        if let Some(index) = buf[..n].windows(2).position(|w| w == GZIP_MAGIC) {
            return Ok(Some(base + index as u64));
        }

        carry = Some(buf[n - 1]);
        base += n as u64;
    }
}

fn read_trailer<R: Read + Seek>(reader: &mut R, at: u64) -> Result<(u32, u32)> {
    reader.seek(SeekFrom::Start(at))?;
    let mut trailer = [0u8; TRAILER_LEN as usize];
    reader.read_exact(&mut trailer)?;
    let crc32 = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let length = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);
    Ok((crc32, length))
}

/// Name members, giving nameless ones that collide with the default a
/// zero-based suffix in discovery order.
fn assign_names(members: &mut [GzipMember], default: &str) {
    for member in members.iter_mut() {
        member.name = match member.header.filename.as_deref() {
            Some(name) if !name.is_empty() => base_name(name).to_string(),
            _ => default.to_string(),
        };
    }

    let collisions = members
        .iter()
        .filter(|m| path::paths_equal(&m.name, default))
        .count();
    if collisions < 2 {
        return;
    }

    let mut index = 0;
    for member in members.iter_mut() {
        if !member.has_embedded_name() {
            member.name = format!("{}_{}", default, index);
            index += 1;
        }
    }
}

fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}
