//! Streaming demo reader. `open` parses the header and marker table and
//! probes for the SHA-256 extension; `next_chunk` then yields tick markers,
//! full snapshots, raw delta payloads, and messages in stream order.

use std::io::{Read, Seek, SeekFrom};

use log::trace;

use crate::chunk;
use crate::constants::{CHUNKTYPE_DELTA, CHUNKTYPE_MESSAGE, CHUNKTYPE_SNAPSHOT, CHUNKTYPEFLAG_TICKMARKER, MAX_MESSAGE_SIZE, MAX_PAYLOAD};
use crate::data_codec;
use crate::delta::{self, Delta};
use crate::errors::{DemoError, DemoResult};
use crate::format::{self, DemoHeader};
use crate::huffman::HuffmanCodec;
use crate::snapshot::Snapshot;
use crate::writer::DemoConfig;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkEvent {
  TickMarker { tick: i32, is_keyframe: bool },
  Snapshot(Snapshot),
  /// Raw (still-compressed) delta payload; pass to [`DemoReader::unpack_delta`].
  Delta(Vec<u8>),
  Message(Vec<u8>),
}

pub struct DemoReader<R: Read + Seek> {
  stream: R,
  #[allow(dead_code)]
  config: DemoConfig,
  codec: HuffmanCodec,
  header: DemoHeader,
  markers: Vec<i32>,
  sha256: Option<[u8; 32]>,
  last_snapshot: Option<Snapshot>,
  current_tick: i32,
  last_tick_marker: i32,
  awaiting_unpack_delta: bool,
}

impl<R: Read + Seek> DemoReader<R> {
  /// Validates the magic marker, parses the header and marker table,
  /// probes for the SHA-256 extension, then skips the map blob.
  pub fn open(mut stream: R, config: DemoConfig) -> DemoResult<Self> {
    let header = format::read_header(&mut stream)?;
    let markers = if header.version > 3 { format::read_marker_table(&mut stream)? } else { Vec::new() };
    let sha256 = format::try_read_sha256_extension(&mut stream)?;
    stream.seek(SeekFrom::Current(header.map_size as i64))?;

    Ok(DemoReader {
      stream,
      config,
      codec: HuffmanCodec::new(),
      header,
      markers,
      sha256,
      last_snapshot: None,
      current_tick: -1,
      last_tick_marker: -1,
      awaiting_unpack_delta: false,
    })
  }

  pub fn header(&self) -> &DemoHeader {
    &self.header
  }

  pub fn markers(&self) -> &[i32] {
    &self.markers
  }

  pub fn sha256(&self) -> Option<&[u8; 32]> {
    self.sha256.as_ref()
  }

  pub fn current_tick(&self) -> i32 {
    self.current_tick
  }

  fn read_data_payload(&mut self, header_byte: u8) -> DemoResult<(u8, Vec<u8>)> {
    let header = chunk::read_data_chunk_header(&mut self.stream, header_byte)?;
    let mut payload = vec![0u8; header.size];
    self.stream.read_exact(&mut payload)?;
    Ok((header.type_, payload))
  }

  /// Reads the next chunk, transparently skipping unrecognized data-chunk
  /// types. Returns `None` at a clean end of stream.
  pub fn next_chunk(&mut self) -> DemoResult<Option<ChunkEvent>> {
    loop {
      let header_byte = match chunk::try_read_header_byte(&mut self.stream)? {
        Some(b) => b,
        None => return Ok(None),
      };

      if header_byte & CHUNKTYPEFLAG_TICKMARKER != 0 {
        self.awaiting_unpack_delta = false;
        let marker = chunk::read_tick_marker(&mut self.stream, header_byte, self.header.version)?;
        let tick = if marker.is_compact {
          self.last_tick_marker + marker.compact_delta as i32
        } else {
          marker.absolute_tick
        };
        self.current_tick = tick;
        self.last_tick_marker = tick;
        return Ok(Some(ChunkEvent::TickMarker { tick, is_keyframe: marker.is_keyframe }));
      }

      let (type_, payload) = self.read_data_payload(header_byte)?;
      self.awaiting_unpack_delta = false;

      match type_ {
        t if t == CHUNKTYPE_SNAPSHOT => {
          let words = data_codec::decompress(&self.codec, &payload, MAX_PAYLOAD)?;
          let snap = Snapshot::from_words(&words)?;
          self.last_snapshot = Some(snap.clone());
          return Ok(Some(ChunkEvent::Snapshot(snap)));
        }
        t if t == CHUNKTYPE_DELTA => {
          self.awaiting_unpack_delta = true;
          return Ok(Some(ChunkEvent::Delta(payload)));
        }
        t if t == CHUNKTYPE_MESSAGE => {
          let bytes = data_codec::decompress_bytes(&self.codec, &payload, MAX_MESSAGE_SIZE)?;
          return Ok(Some(ChunkEvent::Message(bytes)));
        }
        other => {
          trace!("demo reader: skipping unrecognized data chunk type {}", other);
          continue;
        }
      }
    }
  }

  /// Decodes a raw delta payload returned by [`next_chunk`] and applies it
  /// against the last-read snapshot, advancing the reader's reference.
  /// Valid only immediately after `next_chunk` returned a `Delta` event.
  pub fn unpack_delta(&mut self, raw: &[u8]) -> DemoResult<Snapshot> {
    if !self.awaiting_unpack_delta {
      return Err(DemoError::invalid_state("demo reader: unpack_delta called without a pending delta chunk"));
    }
    self.awaiting_unpack_delta = false;

    let words = data_codec::decompress(&self.codec, raw, MAX_PAYLOAD)?;
    let delta = Delta::from_words(&words)?;
    let empty = Snapshot::new();
    let from = self.last_snapshot.as_ref().unwrap_or(&empty);
    let snap = delta::apply_delta(from, &delta)?;
    self.last_snapshot = Some(snap.clone());
    Ok(snap)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::protocol::NETOBJTYPE_PLAYERINFO;
  use crate::snapshot::SnapshotItem;
  use crate::writer::DemoWriter;
  use std::io::Cursor;

  fn snap_with(value: i32) -> Snapshot {
    let mut snap = Snapshot::new();
    snap.items.push(SnapshotItem::new(NETOBJTYPE_PLAYERINFO, 0, vec![value, 1, 2, 3, 4]));
    snap
  }

  fn write_demo() -> Vec<u8> {
    let cursor = Cursor::new(Vec::new());
    let mut writer = DemoWriter::begin(cursor, DemoConfig::default(), "ctf1", 0xdeadbeef, "server").unwrap();
    writer.write_map(b"map bytes").unwrap();
    writer.write_snapshot(100, &snap_with(320)).unwrap();
    writer.write_snapshot(101, &snap_with(321)).unwrap();
    writer.write_message(101, b"hello").unwrap();
    writer.add_marker(100).unwrap();
    writer.finish().unwrap().into_inner()
  }

  #[test]
  fn test_open_parses_header_and_markers() {
    let bytes = write_demo();
    let reader = DemoReader::open(Cursor::new(bytes), DemoConfig::default()).unwrap();
    assert_eq!(reader.header().map_name, "ctf1");
    assert_eq!(reader.header().map_crc, 0xdeadbeef);
    assert_eq!(reader.markers(), &[100]);
  }

  #[test]
  fn test_iterates_keyframe_then_delta_then_message() {
    let bytes = write_demo();
    let mut reader = DemoReader::open(Cursor::new(bytes), DemoConfig::default()).unwrap();

    match reader.next_chunk().unwrap().unwrap() {
      ChunkEvent::TickMarker { tick, is_keyframe } => {
        assert_eq!(tick, 100);
        assert!(is_keyframe);
      }
      other => panic!("unexpected event {:?}", other),
    }
    let keyframe = match reader.next_chunk().unwrap().unwrap() {
      ChunkEvent::Snapshot(s) => s,
      other => panic!("unexpected event {:?}", other),
    };
    assert_eq!(keyframe.find(NETOBJTYPE_PLAYERINFO, 0).unwrap().payload[0], 320);

    match reader.next_chunk().unwrap().unwrap() {
      ChunkEvent::TickMarker { tick, is_keyframe } => {
        assert_eq!(tick, 101);
        assert!(!is_keyframe);
      }
      other => panic!("unexpected event {:?}", other),
    }
    let raw_delta = match reader.next_chunk().unwrap().unwrap() {
      ChunkEvent::Delta(bytes) => bytes,
      other => panic!("unexpected event {:?}", other),
    };
    let applied = reader.unpack_delta(&raw_delta).unwrap();
    assert_eq!(applied.find(NETOBJTYPE_PLAYERINFO, 0).unwrap().payload[0], 321);

    let message = match reader.next_chunk().unwrap().unwrap() {
      ChunkEvent::Message(bytes) => bytes,
      other => panic!("unexpected event {:?}", other),
    };
    assert_eq!(&message[..5], b"hello");

    assert_eq!(reader.next_chunk().unwrap(), None);
  }

  #[test]
  fn test_unpack_delta_without_pending_delta_is_invalid_state() {
    let bytes = write_demo();
    let mut reader = DemoReader::open(Cursor::new(bytes), DemoConfig::default()).unwrap();
    assert!(reader.unpack_delta(&[]).is_err());
  }

  #[test]
  fn test_empty_demo_yields_no_chunks() {
    let cursor = Cursor::new(Vec::new());
    let mut writer = DemoWriter::begin(cursor, DemoConfig::default(), "ctf1", 0, "server").unwrap();
    writer.write_map(b"m").unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let mut reader = DemoReader::open(Cursor::new(bytes), DemoConfig::default()).unwrap();
    assert_eq!(reader.next_chunk().unwrap(), None);
  }
}
