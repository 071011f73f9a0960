//! Two-stage compression used for every chunk payload: pack a word array as
//! varints, then Huffman-compress the resulting byte stream. Raw byte
//! payloads (network messages) are first padded to a multiple of 4 bytes
//! and reinterpreted as little-endian words so they can ride the same path.

use crate::errors::DemoResult;
use crate::huffman::HuffmanCodec;
use crate::varint;

/// Varint-packs `ints` and Huffman-compresses the result.
pub fn compress(codec: &HuffmanCodec, ints: &[i32]) -> Vec<u8> {
  let packed = varint::pack_ints(ints);
  codec.compress(&packed)
}

/// Inverse of [`compress`]. The number of ints recovered is implicit in the
/// varint stream itself, not stored anywhere explicit.
pub fn decompress(codec: &HuffmanCodec, data: &[u8], max_packed_bytes: usize) -> DemoResult<Vec<i32>> {
  let packed = codec.decompress(data, max_packed_bytes)?;
  varint::unpack_all(&packed)
}

/// Splits `data` into little-endian 32-bit words, zero-padding the final
/// word if `data.len()` isn't a multiple of 4.
pub fn bytes_to_words(data: &[u8]) -> Vec<i32> {
  data
    .chunks(4)
    .map(|chunk| {
      let mut buf = [0u8; 4];
      buf[..chunk.len()].copy_from_slice(chunk);
      i32::from_le_bytes(buf)
    })
    .collect()
}

/// Inverse of [`bytes_to_words`]. Since the padding applied when a byte
/// payload isn't word-aligned is not recorded anywhere on the wire, this
/// returns the full padded length; callers whose payload is self-delimiting
/// (as DDNet network messages are) can ignore the trailing zero bytes.
pub fn words_to_bytes(words: &[i32]) -> Vec<u8> {
  let mut out = Vec::with_capacity(words.len() * 4);
  for &w in words {
    out.extend_from_slice(&w.to_le_bytes());
  }
  out
}

/// Pads `data` to a word boundary and runs it through [`compress`].
pub fn compress_bytes(codec: &HuffmanCodec, data: &[u8]) -> Vec<u8> {
  compress(codec, &bytes_to_words(data))
}

/// Inverse of [`compress_bytes`]; see [`words_to_bytes`] for the padding
/// caveat.
pub fn decompress_bytes(codec: &HuffmanCodec, data: &[u8], max_packed_bytes: usize) -> DemoResult<Vec<u8>> {
  let words = decompress(codec, data, max_packed_bytes)?;
  Ok(words_to_bytes(&words))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::constants::MAX_PAYLOAD;

  #[test]
  fn test_round_trip_empty() {
    let codec = HuffmanCodec::new();
    let compressed = compress(&codec, &[]);
    let decompressed = decompress(&codec, &compressed, MAX_PAYLOAD).unwrap();
    assert!(decompressed.is_empty());
  }

  #[test]
  fn test_round_trip_values() {
    let codec = HuffmanCodec::new();
    let ints = vec![0, 1, -1, 42, -42, i32::MAX, i32::MIN, 1 << 20, -(1 << 20)];
    let compressed = compress(&codec, &ints);
    let decompressed = decompress(&codec, &compressed, MAX_PAYLOAD).unwrap();
    assert_eq!(ints, decompressed);
  }

  #[test]
  fn test_round_trip_large_snapshot_like_buffer() {
    let codec = HuffmanCodec::new();
    let ints: Vec<i32> = (0..4000).map(|i| (i * 37) % 991 - 400).collect();
    let compressed = compress(&codec, &ints);
    let decompressed = decompress(&codec, &compressed, MAX_PAYLOAD).unwrap();
    assert_eq!(ints, decompressed);
  }

  #[test]
  fn test_bytes_round_trip_word_aligned() {
    let codec = HuffmanCodec::new();
    let data = b"0123456789abcdef".to_vec(); // 16 bytes, already aligned
    let compressed = compress_bytes(&codec, &data);
    let decompressed = decompress_bytes(&codec, &compressed, MAX_PAYLOAD).unwrap();
    assert_eq!(decompressed, data);
  }

  #[test]
  fn test_bytes_round_trip_with_padding() {
    let codec = HuffmanCodec::new();
    let data = b"hello".to_vec(); // 5 bytes, needs 3 bytes of padding
    let compressed = compress_bytes(&codec, &data);
    let decompressed = decompress_bytes(&codec, &compressed, MAX_PAYLOAD).unwrap();
    assert_eq!(&decompressed[..data.len()], &data[..]);
    assert_eq!(decompressed.len(), 8);
    assert_eq!(&decompressed[data.len()..], &[0, 0, 0]);
  }
}
