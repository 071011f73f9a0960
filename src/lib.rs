//! Read and write DDNet 0.6 demo (replay) files: the fixed header and
//! timeline marker table, the chunked tick-marker/snapshot/delta/message
//! stream, and the snapshot/delta framing pipeline that stream is built on.

pub use delta::{Delta, DeltaUpdate};
pub use errors::{DemoError, DemoResult, ErrorKind};
pub use format::DemoHeader;
pub use message::{MessagePacker, MessageUnpacker};
pub use reader::{ChunkEvent, DemoReader};
pub use snapshot::{Snapshot, SnapshotItem};
pub use snapshot_builder::SnapshotBuilder;
pub use writer::{DemoConfig, DemoWriter};

pub mod protocol;

mod chunk;
mod constants;
mod data_codec;
mod delta;
mod errors;
mod format;
mod huffman;
mod message;
mod reader;
mod snapshot;
mod snapshot_builder;
mod varint;
mod writer;
