//! Byte-level framing for the two kinds of chunk a demo stream is made of:
//! tick markers, which carry no payload, and data chunks, which carry a
//! Huffman/varint-compressed snapshot, delta, or message.

use std::io::{self, Read};

use crate::constants::{
  CHUNKMASK_SIZE, CHUNKMASK_TICK, CHUNKMASK_TYPE, CHUNKTICKFLAG_KEYFRAME, CHUNKTICKFLAG_TICK_COMPRESSED, CHUNKTYPEFLAG_TICKMARKER,
  DEMO_VERSION_TICKCOMPRESSION,
};
use crate::errors::{DemoError, DemoResult};

/// Encodes a tick marker. Falls back to the 5-byte absolute form whenever
/// there's no prior marker, the gap from it exceeds the 5-bit compact
/// range, or the tick is a keyframe boundary.
pub fn encode_tick_marker(tick: i32, is_keyframe: bool, last_tick_marker: i32) -> Vec<u8> {
  let gap = tick.wrapping_sub(last_tick_marker);
  let use_absolute = last_tick_marker == -1 || gap > CHUNKMASK_TICK as i32 || is_keyframe;

  if use_absolute {
    let mut header = CHUNKTYPEFLAG_TICKMARKER;
    if is_keyframe {
      header |= CHUNKTICKFLAG_KEYFRAME;
    }
    let mut out = Vec::with_capacity(5);
    out.push(header);
    out.extend_from_slice(&(tick as u32).to_be_bytes());
    out
  } else {
    let header = CHUNKTYPEFLAG_TICKMARKER | CHUNKTICKFLAG_TICK_COMPRESSED | (gap as u8 & CHUNKMASK_TICK);
    vec![header]
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickMarkerChunk {
  pub is_keyframe: bool,
  pub is_compact: bool,
  /// Meaningful only when `is_compact`.
  pub compact_delta: u8,
  /// Meaningful only when `!is_compact`.
  pub absolute_tick: i32,
}

/// Reads the remainder of a tick marker chunk given its already-consumed
/// header byte. `demo_version` gates whether the compact form is honored,
/// matching how older demo versions never produced it.
pub fn read_tick_marker<R: Read>(r: &mut R, header_byte: u8, demo_version: u8) -> DemoResult<TickMarkerChunk> {
  let is_keyframe = header_byte & CHUNKTICKFLAG_KEYFRAME != 0;
  let is_compact = demo_version >= DEMO_VERSION_TICKCOMPRESSION && header_byte & CHUNKTICKFLAG_TICK_COMPRESSED != 0;

  if is_compact {
    Ok(TickMarkerChunk {
      is_keyframe,
      is_compact: true,
      compact_delta: header_byte & CHUNKMASK_TICK,
      absolute_tick: 0,
    })
  } else {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(TickMarkerChunk {
      is_keyframe,
      is_compact: false,
      compact_delta: 0,
      absolute_tick: u32::from_be_bytes(buf) as i32,
    })
  }
}

/// Encodes a data chunk header: type in bits 6-5, and a size field that is
/// either literal (<30), one extra byte (<256), or two extra
/// little-endian bytes otherwise. The two-byte form is a 16-bit field, so
/// compressed chunks larger than 65535 bytes cannot be represented.
pub fn encode_data_chunk_header(type_: u8, size: usize) -> DemoResult<Vec<u8>> {
  let type_bits = (type_ & 0x3) << 5;
  if size < 30 {
    Ok(vec![type_bits | size as u8])
  } else if size < 256 {
    Ok(vec![type_bits | 30, size as u8])
  } else if size <= 0xffff {
    Ok(vec![type_bits | 31, (size & 0xff) as u8, (size >> 8) as u8])
  } else {
    Err(DemoError::limit_exceeded(format!("chunk size {} exceeds the 16-bit size field", size)))
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataChunkHeader {
  pub type_: u8,
  pub size: usize,
}

/// Reads the remainder of a data chunk header given its already-consumed
/// header byte.
pub fn read_data_chunk_header<R: Read>(r: &mut R, header_byte: u8) -> DemoResult<DataChunkHeader> {
  let type_ = (header_byte & CHUNKMASK_TYPE) >> 5;
  let mut size = (header_byte & CHUNKMASK_SIZE) as usize;

  if size == 30 {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    size = buf[0] as usize;
  } else if size == 31 {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    size = (buf[1] as usize) << 8 | buf[0] as usize;
  }

  Ok(DataChunkHeader { type_, size })
}

/// Reads the one header byte that every chunk starts with, returning `None`
/// at a clean end of stream (no partial chunk trailing).
pub fn try_read_header_byte<R: Read>(r: &mut R) -> DemoResult<Option<u8>> {
  let mut buf = [0u8; 1];
  match r.read_exact(&mut buf) {
    Ok(()) => Ok(Some(buf[0])),
    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
    Err(e) => Err(e.into()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::constants::DEMO_VERSION;
  use std::io::Cursor;

  #[test]
  fn test_absolute_tick_marker_on_first_write() {
    let bytes = encode_tick_marker(100, false, -1);
    assert_eq!(bytes.len(), 5);
    let mut cursor = Cursor::new(&bytes[1..]);
    let parsed = read_tick_marker(&mut cursor, bytes[0], DEMO_VERSION).unwrap();
    assert!(!parsed.is_compact);
    assert_eq!(parsed.absolute_tick, 100);
    assert!(!parsed.is_keyframe);
  }

  #[test]
  fn test_compact_tick_marker_at_boundary() {
    let bytes = encode_tick_marker(131, false, 100); // gap of 31, still compact
    assert_eq!(bytes.len(), 1);
    let mut cursor = Cursor::new(&[][..]);
    let parsed = read_tick_marker(&mut cursor, bytes[0], DEMO_VERSION).unwrap();
    assert!(parsed.is_compact);
    assert_eq!(parsed.compact_delta, 31);
  }

  #[test]
  fn test_gap_past_compact_range_falls_back_to_absolute() {
    let bytes = encode_tick_marker(132, false, 100); // gap of 32
    assert_eq!(bytes.len(), 5);
  }

  #[test]
  fn test_keyframe_forces_absolute_even_within_compact_range() {
    let bytes = encode_tick_marker(101, true, 100);
    assert_eq!(bytes.len(), 5);
    let mut cursor = Cursor::new(&bytes[1..]);
    let parsed = read_tick_marker(&mut cursor, bytes[0], DEMO_VERSION).unwrap();
    assert!(parsed.is_keyframe);
  }

  #[test]
  fn test_data_chunk_header_size_classes() {
    for size in [0usize, 29, 30, 255, 256, 65535] {
      let header = encode_data_chunk_header(2, size).unwrap();
      let mut cursor = Cursor::new(&header[1..]);
      let parsed = read_data_chunk_header(&mut cursor, header[0]).unwrap();
      assert_eq!(parsed.type_, 2);
      assert_eq!(parsed.size, size);
    }
  }

  #[test]
  fn test_data_chunk_header_rejects_oversized_chunk() {
    assert!(encode_data_chunk_header(2, 0x10000).is_err());
  }

  #[test]
  fn test_try_read_header_byte_reports_clean_eof() {
    let mut cursor = Cursor::new(&[][..]);
    assert_eq!(try_read_header_byte(&mut cursor).unwrap(), None);
  }
}
