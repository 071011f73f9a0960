//! Streaming demo writer. Callers drive a fixed state machine: `begin`,
//! `write_map`, then any interleaving of `write_snapshot`/`write_message`/
//! `add_marker`, finished by a single call to `finish`.

use std::io::{Seek, Write};

use sha2::{Digest, Sha256};

use crate::chunk;
use crate::constants::{CHUNKTYPE_DELTA, CHUNKTYPE_MESSAGE, CHUNKTYPE_SNAPSHOT, MAX_TIMELINE_MARKERS, SERVER_TICK_SPEED};
use crate::data_codec;
use crate::delta;
use crate::errors::{DemoError, DemoResult};
use crate::format;
use crate::huffman::HuffmanCodec;
use crate::snapshot::Snapshot;

/// Tuning knobs that do not affect wire semantics (DDNet 0.6 readers hard
/// code both values) but are exposed for construction-time clarity rather
/// than scattering magic numbers through call sites.
#[derive(Clone, Copy, Debug)]
pub struct DemoConfig {
  pub server_tick_rate: i32,
  pub max_timeline_markers: usize,
}

impl Default for DemoConfig {
  fn default() -> Self {
    DemoConfig {
      server_tick_rate: SERVER_TICK_SPEED,
      max_timeline_markers: MAX_TIMELINE_MARKERS,
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WriterState {
  Open,
  MapEmbedded,
  Streaming,
  Finished,
}

pub struct DemoWriter<W: Write + Seek> {
  stream: W,
  config: DemoConfig,
  codec: HuffmanCodec,
  state: WriterState,
  last_snapshot: Option<Snapshot>,
  last_keyframe_tick: i32,
  last_tick_marker: i32,
  first_tick: Option<i32>,
  markers: Vec<i32>,
}

impl<W: Write + Seek> DemoWriter<W> {
  /// Writes the header (with placeholder `map_size`/`length`) and an
  /// all-zero marker table, and transitions to `Open`.
  pub fn begin(mut stream: W, config: DemoConfig, map_name: &str, map_crc: u32, type_: &str) -> DemoResult<Self> {
    format::write_header(&mut stream, map_name, map_crc, type_)?;
    format::write_empty_marker_table(&mut stream)?;
    Ok(DemoWriter {
      stream,
      config,
      codec: HuffmanCodec::new(),
      state: WriterState::Open,
      last_snapshot: None,
      last_keyframe_tick: -1,
      last_tick_marker: -1,
      first_tick: None,
      markers: Vec::new(),
    })
  }

  fn require_state(&self, expected: WriterState) -> DemoResult<()> {
    if self.state != expected {
      return Err(DemoError::invalid_state(format!("demo writer: expected state {:?}, found {:?}", expected, self.state)));
    }
    Ok(())
  }

  /// Backfills `map_size`, then writes the SHA-256 extension and the map
  /// bytes themselves. Transitions to `MapEmbedded`.
  pub fn write_map(&mut self, map_bytes: &[u8]) -> DemoResult<()> {
    self.require_state(WriterState::Open)?;

    format::backfill_map_size(&mut self.stream, map_bytes.len() as u32)?;
    let digest: [u8; 32] = Sha256::digest(map_bytes).into();
    format::write_sha256_extension(&mut self.stream, &digest)?;
    self.stream.write_all(map_bytes)?;

    self.state = WriterState::MapEmbedded;
    Ok(())
  }

  fn streaming_state(&self) -> DemoResult<()> {
    match self.state {
      WriterState::MapEmbedded | WriterState::Streaming => Ok(()),
      _ => Err(DemoError::invalid_state(format!("demo writer: not ready to stream, found {:?}", self.state))),
    }
  }

  fn record_tick(&mut self, tick: i32) {
    if self.first_tick.is_none() {
      self.first_tick = Some(tick);
    }
    self.last_tick_marker = tick;
    self.state = WriterState::Streaming;
  }

  fn write_data_chunk(&mut self, type_: u8, payload: &[u8]) -> DemoResult<()> {
    let header = chunk::encode_data_chunk_header(type_, payload.len())?;
    self.stream.write_all(&header)?;
    self.stream.write_all(payload)?;
    Ok(())
  }

  /// Emits a tick marker followed by either a full keyframe snapshot or a
  /// delta against the previous snapshot. A zero-difference delta is
  /// suppressed, but the tick marker still fires.
  pub fn write_snapshot(&mut self, tick: i32, snap: &Snapshot) -> DemoResult<()> {
    self.streaming_state()?;

    let is_keyframe = self.last_keyframe_tick == -1 || tick - self.last_keyframe_tick > 5 * self.config.server_tick_rate;
    let marker_bytes = chunk::encode_tick_marker(tick, is_keyframe, self.last_tick_marker);
    self.stream.write_all(&marker_bytes)?;
    self.record_tick(tick);

    if is_keyframe {
      let words = snap.to_words()?;
      let compressed = data_codec::compress(&self.codec, &words);
      self.write_data_chunk(CHUNKTYPE_SNAPSHOT, &compressed)?;
      self.last_keyframe_tick = tick;
    } else {
      let empty = Snapshot::new();
      let from = self.last_snapshot.as_ref().unwrap_or(&empty);
      let d = delta::compute_delta(from, snap);
      if !d.is_empty() {
        let words = d.to_words();
        let compressed = data_codec::compress(&self.codec, &words);
        self.write_data_chunk(CHUNKTYPE_DELTA, &compressed)?;
      }
    }

    self.last_snapshot = Some(snap.clone());
    Ok(())
  }

  /// Emits a tick marker ahead of the message whenever `tick` differs from
  /// the most recently emitted marker, then emits the message data chunk.
  pub fn write_message(&mut self, tick: i32, bytes: &[u8]) -> DemoResult<()> {
    self.streaming_state()?;

    if tick != self.last_tick_marker {
      let marker_bytes = chunk::encode_tick_marker(tick, false, self.last_tick_marker);
      self.stream.write_all(&marker_bytes)?;
      self.record_tick(tick);
    }

    let compressed = data_codec::compress_bytes(&self.codec, bytes);
    self.write_data_chunk(CHUNKTYPE_MESSAGE, &compressed)
  }

  /// Records a timeline seek point. Independent of the tick-marker chunks
  /// emitted by `write_snapshot`.
  pub fn add_marker(&mut self, tick: i32) -> DemoResult<()> {
    self.streaming_state()?;
    if self.markers.len() >= self.config.max_timeline_markers {
      return Err(DemoError::limit_exceeded(format!("demo writer: already have {} timeline markers", self.config.max_timeline_markers)));
    }
    self.markers.push(tick);
    Ok(())
  }

  /// Backfills `length` and the timeline marker table. Does not close the
  /// caller's stream.
  pub fn finish(mut self) -> DemoResult<W> {
    if self.state == WriterState::Finished {
      return Err(DemoError::invalid_state("demo writer: already finished"));
    }

    let length = match self.first_tick {
      Some(first) => ((self.last_tick_marker - first) / self.config.server_tick_rate).max(0) as u32,
      None => 0,
    };
    format::backfill_length_and_markers(&mut self.stream, length, &self.markers)?;
    self.state = WriterState::Finished;
    Ok(self.stream)
  }
}
