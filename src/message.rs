//! Small helper for building and reading the varint-and-C-string payloads
//! carried inside message chunks. Neither side of the wire format requires
//! this layout — it is the convention higher-level game messages use on
//! top of the raw bytes a message chunk transports.

use crate::errors::{DemoError, DemoResult};
use crate::varint;

/// Appends varint-packed ints and null-terminated strings into a byte
/// buffer, matching how in-game network messages are laid out.
#[derive(Debug, Default)]
pub struct MessagePacker {
  buf: Vec<u8>,
}

impl MessagePacker {
  pub fn new() -> Self {
    MessagePacker { buf: Vec::new() }
  }

  pub fn add_int(&mut self, value: i32) -> &mut Self {
    varint::pack_int(&mut self.buf, value);
    self
  }

  pub fn add_string(&mut self, s: &str) -> &mut Self {
    self.buf.extend_from_slice(s.as_bytes());
    self.buf.push(0);
    self
  }

  pub fn finish(self) -> Vec<u8> {
    self.buf
  }
}

/// Reads back a buffer built by [`MessagePacker`]: a sequence of
/// varint-packed ints and null-terminated strings, read in whatever order
/// the caller expects them.
pub struct MessageUnpacker<'a> {
  data: &'a [u8],
  pos: usize,
}

impl<'a> MessageUnpacker<'a> {
  pub fn new(data: &'a [u8]) -> Self {
    MessageUnpacker { data, pos: 0 }
  }

  pub fn read_int(&mut self) -> DemoResult<i32> {
    varint::unpack_int(self.data, &mut self.pos)
  }

  pub fn read_string(&mut self) -> DemoResult<&'a str> {
    let start = self.pos;
    let end = self.data[start..].iter().position(|&b| b == 0).ok_or_else(|| DemoError::truncated("message: unterminated string"))? + start;
    self.pos = end + 1;
    std::str::from_utf8(&self.data[start..end]).map_err(|_| DemoError::corruption("message: string is not valid utf-8"))
  }

  pub fn remaining(&self) -> usize {
    self.data.len() - self.pos
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_round_trip_ints_and_strings() {
    let mut packer = MessagePacker::new();
    packer.add_int(42).add_string("hello").add_int(-7).add_string("");
    let bytes = packer.finish();

    let mut unpacker = MessageUnpacker::new(&bytes);
    assert_eq!(unpacker.read_int().unwrap(), 42);
    assert_eq!(unpacker.read_string().unwrap(), "hello");
    assert_eq!(unpacker.read_int().unwrap(), -7);
    assert_eq!(unpacker.read_string().unwrap(), "");
    assert_eq!(unpacker.remaining(), 0);
  }

  #[test]
  fn test_unterminated_string_is_truncated_error() {
    let mut unpacker = MessageUnpacker::new(b"no terminator");
    assert!(unpacker.read_string().is_err());
  }
}
