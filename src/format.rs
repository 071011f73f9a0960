//! Byte-level encoding of the fixed demo file header, the timeline marker
//! table that follows it, and the optional SHA-256 map extension.

use std::io::{self, Read, Seek, SeekFrom, Write};

use log::warn;

use crate::constants::{
  DEMO_VERSION, HEADER_LENGTH_OFFSET, HEADER_MAP_SIZE_OFFSET, HEADER_MARKER, HEADER_SIZE, MAX_TIMELINE_MARKERS, SHA256_EXTENSION_UUID,
};
use crate::errors::{DemoError, DemoResult};

const NET_VERSION: &str = "0.6 626fce9a778df4d4";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemoHeader {
  pub version: u8,
  pub net_version: String,
  pub map_name: String,
  pub map_size: u32,
  pub map_crc: u32,
  pub type_: String,
  pub length: u32,
  pub timestamp: String,
}

fn pack_fixed_str(s: &str, len: usize) -> Vec<u8> {
  let mut buf = vec![0u8; len];
  let bytes = s.as_bytes();
  let n = bytes.len().min(len.saturating_sub(1));
  buf[..n].copy_from_slice(&bytes[..n]);
  buf
}

fn unpack_fixed_str(buf: &[u8]) -> String {
  let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
  String::from_utf8_lossy(&buf[..end]).into_owned()
}

fn timestamp_now() -> String {
  chrono::Local::now().format("%Y-%m-%d %H-%M-%S").to_string()
}

/// Writes the 176-byte fixed header. `map_size` and `length` are written as
/// zero and backfilled once they are known, via [`backfill_map_size`] and
/// [`backfill_length_and_markers`].
pub fn write_header<W: Write>(w: &mut W, map_name: &str, map_crc: u32, type_: &str) -> DemoResult<()> {
  w.write_all(&HEADER_MARKER)?;
  w.write_all(&[DEMO_VERSION])?;
  w.write_all(&pack_fixed_str(NET_VERSION, 64))?;
  w.write_all(&pack_fixed_str(map_name, 64))?;
  w.write_all(&[0u8; 4])?;
  w.write_all(&map_crc.to_be_bytes())?;
  w.write_all(&pack_fixed_str(type_, 8))?;
  w.write_all(&[0u8; 4])?;
  w.write_all(&pack_fixed_str(&timestamp_now(), 20))?;
  Ok(())
}

/// Writes the zeroed timeline marker table that immediately follows the
/// header. It is backfilled at the end of a recording via
/// [`backfill_length_and_markers`].
pub fn write_empty_marker_table<W: Write>(w: &mut W) -> DemoResult<()> {
  w.write_all(&vec![0u8; 4 + MAX_TIMELINE_MARKERS * 4])?;
  Ok(())
}

/// Rewrites the header's `map_size` field in place, restoring the writer's
/// position afterward.
pub fn backfill_map_size<W: Write + Seek>(w: &mut W, map_size: u32) -> DemoResult<()> {
  let pos = w.stream_position()?;
  w.seek(SeekFrom::Start(HEADER_MAP_SIZE_OFFSET as u64))?;
  w.write_all(&map_size.to_be_bytes())?;
  w.seek(SeekFrom::Start(pos))?;
  Ok(())
}

/// Rewrites the header's `length` field and the timeline marker table in
/// place. Called once, at the end of a recording.
pub fn backfill_length_and_markers<W: Write + Seek>(w: &mut W, length: u32, markers: &[i32]) -> DemoResult<()> {
  if markers.len() > MAX_TIMELINE_MARKERS {
    return Err(DemoError::limit_exceeded(format!("{} timeline markers exceeds the limit of {}", markers.len(), MAX_TIMELINE_MARKERS)));
  }

  w.seek(SeekFrom::Start(HEADER_LENGTH_OFFSET as u64))?;
  w.write_all(&length.to_be_bytes())?;

  w.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
  w.write_all(&(markers.len() as u32).to_be_bytes())?;
  for &marker in markers {
    w.write_all(&(marker as u32).to_be_bytes())?;
  }
  Ok(())
}

/// Reads and validates the fixed header, failing fast on a bad magic
/// marker rather than continuing to parse garbage.
pub fn read_header<R: Read>(r: &mut R) -> DemoResult<DemoHeader> {
  let mut marker = [0u8; 7];
  r.read_exact(&mut marker)?;
  if marker != HEADER_MARKER {
    return Err(DemoError::corruption("format: not a demo file (bad magic marker)"));
  }

  let mut version = [0u8; 1];
  r.read_exact(&mut version)?;

  let mut net_version_buf = [0u8; 64];
  r.read_exact(&mut net_version_buf)?;
  let mut map_name_buf = [0u8; 64];
  r.read_exact(&mut map_name_buf)?;
  let mut map_size_buf = [0u8; 4];
  r.read_exact(&mut map_size_buf)?;
  let mut map_crc_buf = [0u8; 4];
  r.read_exact(&mut map_crc_buf)?;
  let mut type_buf = [0u8; 8];
  r.read_exact(&mut type_buf)?;
  let mut length_buf = [0u8; 4];
  r.read_exact(&mut length_buf)?;
  let mut timestamp_buf = [0u8; 20];
  r.read_exact(&mut timestamp_buf)?;

  Ok(DemoHeader {
    version: version[0],
    net_version: unpack_fixed_str(&net_version_buf),
    map_name: unpack_fixed_str(&map_name_buf),
    map_size: u32::from_be_bytes(map_size_buf),
    map_crc: u32::from_be_bytes(map_crc_buf),
    type_: unpack_fixed_str(&type_buf),
    length: u32::from_be_bytes(length_buf),
    timestamp: unpack_fixed_str(&timestamp_buf),
  })
}

/// Reads the fixed-size timeline marker table, clamping a corrupted
/// marker count to the table's real capacity rather than trusting it.
pub fn read_marker_table<R: Read>(r: &mut R) -> DemoResult<Vec<i32>> {
  let mut buf = vec![0u8; 4 + MAX_TIMELINE_MARKERS * 4];
  r.read_exact(&mut buf)?;

  let mut num = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
  if num > MAX_TIMELINE_MARKERS {
    warn!("demo format: marker table reports {} markers, clamping to the maximum of {}", num, MAX_TIMELINE_MARKERS);
    num = MAX_TIMELINE_MARKERS;
  }

  let mut markers = Vec::with_capacity(num);
  for i in 0..num {
    let off = 4 + i * 4;
    markers.push(u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]) as i32);
  }
  Ok(markers)
}

/// Probes for the SHA-256 map extension immediately after the header and
/// marker table. If the next 16 bytes aren't the extension's UUID, the
/// stream is rewound so the map blob can be read from the same position.
pub fn try_read_sha256_extension<R: Read + Seek>(r: &mut R) -> DemoResult<Option<[u8; 32]>> {
  let pos = r.stream_position()?;
  let mut uuid = [0u8; 16];
  match r.read_exact(&mut uuid) {
    Ok(()) => {}
    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
      r.seek(SeekFrom::Start(pos))?;
      return Ok(None);
    }
    Err(e) => return Err(e.into()),
  }

  if uuid != SHA256_EXTENSION_UUID {
    r.seek(SeekFrom::Start(pos))?;
    return Ok(None);
  }

  let mut digest = [0u8; 32];
  r.read_exact(&mut digest)?;
  Ok(Some(digest))
}

/// Writes the SHA-256 map extension: its UUID followed by the 32-byte
/// digest.
pub fn write_sha256_extension<W: Write>(w: &mut W, digest: &[u8; 32]) -> DemoResult<()> {
  w.write_all(&SHA256_EXTENSION_UUID)?;
  w.write_all(digest)?;
  Ok(())
}
