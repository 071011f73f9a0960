//! In-memory representation of a single tick's world state: an ordered list
//! of items, each identified by a `(type, id)` key and holding a fixed or
//! variable-length payload of 32-bit words.
//!
//! On the wire a snapshot is a flat word array: `[data_size, num_items,
//! offset_0, .., offset_{n-1}, key_0, payload_0.., key_1, payload_1..]`,
//! where `data_size` and the offsets are expressed in bytes and measured
//! from the start of the item data region. [`Snapshot::to_words`] and
//! [`Snapshot::from_words`] convert between that layout and the owned
//! `Vec<SnapshotItem>` form used everywhere else in this crate.

use crate::constants::{MAX_SNAPSHOT_ITEMS, MAX_SNAPSHOT_SIZE};
use crate::errors::{DemoError, DemoResult};

const ITEM_HEADER_WORDS: usize = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotItem {
  pub type_: i32,
  pub id: i32,
  pub payload: Vec<i32>,
}

impl SnapshotItem {
  pub fn new(type_: i32, id: i32, payload: Vec<i32>) -> Self {
    SnapshotItem { type_, id, payload }
  }

  pub fn key(&self) -> i32 {
    (self.type_ << 16) | (self.id & 0xffff)
  }

  fn from_key(key: i32, payload: Vec<i32>) -> Self {
    SnapshotItem {
      type_: (key >> 16) & 0xffff,
      id: key & 0xffff,
      payload,
    }
  }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
  pub items: Vec<SnapshotItem>,
}

impl Snapshot {
  pub fn new() -> Self {
    Snapshot { items: Vec::new() }
  }

  pub fn item_count(&self) -> usize {
    self.items.len()
  }

  pub fn find(&self, type_: i32, id: i32) -> Option<&SnapshotItem> {
    self.items.iter().find(|it| it.type_ == type_ && it.id == id)
  }

  /// Serializes to the flat word layout used for compression and delta
  /// computation.
  pub fn to_words(&self) -> DemoResult<Vec<i32>> {
    if self.items.len() > MAX_SNAPSHOT_ITEMS {
      return Err(DemoError::limit_exceeded(format!(
        "snapshot has {} items, limit is {}",
        self.items.len(),
        MAX_SNAPSHOT_ITEMS
      )));
    }

    let mut data = Vec::new();
    let mut offsets = Vec::with_capacity(self.items.len());
    for item in &self.items {
      offsets.push((data.len() * 4) as i32);
      data.push(item.key());
      data.extend_from_slice(&item.payload);
    }

    let data_size = (data.len() * 4) as i32;
    if data.len() * 4 > MAX_SNAPSHOT_SIZE {
      return Err(DemoError::limit_exceeded(format!(
        "snapshot data is {} bytes, limit is {}",
        data.len() * 4,
        MAX_SNAPSHOT_SIZE
      )));
    }

    let mut words = Vec::with_capacity(2 + offsets.len() + data.len());
    words.push(data_size);
    words.push(self.items.len() as i32);
    words.extend(offsets);
    words.extend(data);
    Ok(words)
  }

  /// Inverse of [`to_words`]. `offsets` are only used to locate item
  /// boundaries; the keys embedded in the data region are authoritative for
  /// item identity.
  pub fn from_words(words: &[i32]) -> DemoResult<Self> {
    if words.len() < 2 {
      return Err(DemoError::truncated("snapshot: missing header words"));
    }
    let data_size = words[0];
    let num_items = words[1] as usize;
    if data_size < 0 || num_items > MAX_SNAPSHOT_ITEMS {
      return Err(DemoError::corruption("snapshot: invalid header"));
    }

    let offsets_start = 2;
    let offsets_end = offsets_start + num_items;
    if words.len() < offsets_end {
      return Err(DemoError::truncated("snapshot: missing offset table"));
    }
    let offsets = &words[offsets_start..offsets_end];

    let data_start = offsets_end;
    let data_word_count = (data_size as usize) / 4;
    let data_end = data_start + data_word_count;
    if words.len() < data_end {
      return Err(DemoError::truncated("snapshot: missing item data"));
    }
    let data = &words[data_start..data_end];

    let mut items = Vec::with_capacity(num_items);
    for i in 0..num_items {
      let byte_off = offsets[i];
      if byte_off < 0 || byte_off % 4 != 0 {
        return Err(DemoError::corruption("snapshot: misaligned item offset"));
      }
      let word_off = (byte_off as usize) / 4;
      if word_off >= data.len() {
        return Err(DemoError::corruption("snapshot: offset out of range"));
      }

      let next_word_off = if i + 1 < num_items {
        let next_byte = offsets[i + 1];
        if next_byte < 0 || next_byte % 4 != 0 {
          return Err(DemoError::corruption("snapshot: misaligned item offset"));
        }
        (next_byte as usize) / 4
      } else {
        data.len()
      };
      if next_word_off < word_off + ITEM_HEADER_WORDS || next_word_off > data.len() {
        return Err(DemoError::corruption("snapshot: item size underflow"));
      }

      let key = data[word_off];
      let payload = data[word_off + ITEM_HEADER_WORDS..next_word_off].to_vec();
      items.push(SnapshotItem::from_key(key, payload));
    }

    Ok(Snapshot { items })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_round_trip() {
    let snap = Snapshot::new();
    let words = snap.to_words().unwrap();
    let back = Snapshot::from_words(&words).unwrap();
    assert_eq!(snap, back);
  }

  #[test]
  fn test_single_item_round_trip() {
    let mut snap = Snapshot::new();
    snap.items.push(SnapshotItem::new(4, 1, vec![10, 20, 30]));
    let words = snap.to_words().unwrap();
    let back = Snapshot::from_words(&words).unwrap();
    assert_eq!(snap, back);
  }

  #[test]
  fn test_multiple_items_round_trip() {
    let mut snap = Snapshot::new();
    snap.items.push(SnapshotItem::new(9, 0, vec![1; 15]));
    snap.items.push(SnapshotItem::new(5, 0, vec![2; 17]));
    snap.items.push(SnapshotItem::new(5, 1, vec![3; 17]));
    let words = snap.to_words().unwrap();
    let back = Snapshot::from_words(&words).unwrap();
    assert_eq!(snap, back);
    assert_eq!(back.find(5, 1).unwrap().payload, vec![3; 17]);
  }

  #[test]
  fn test_key_packing() {
    let item = SnapshotItem::new(7, 3, vec![]);
    assert_eq!(item.key(), (7 << 16) | 3);
    let back = SnapshotItem::from_key(item.key(), vec![]);
    assert_eq!(back.type_, 7);
    assert_eq!(back.id, 3);
  }

  #[test]
  fn test_truncated_words_rejected() {
    assert!(Snapshot::from_words(&[]).is_err());
    assert!(Snapshot::from_words(&[4, 1]).is_err());
  }

  #[test]
  fn test_too_many_items_rejected() {
    let mut snap = Snapshot::new();
    for i in 0..(MAX_SNAPSHOT_ITEMS + 1) {
      snap.items.push(SnapshotItem::new(1, i as i32, vec![]));
    }
    assert!(snap.to_words().is_err());
  }
}
