//! Incremental assembly of a [`Snapshot`], mirroring how a server accretes
//! one tick's worth of items before handing the result to the delta engine
//! and the compressor.
//!
//! Items whose type is a registered extended (UUID-addressed) type are
//! transparently spliced: the first time such a type is added, the builder
//! emits a hidden `NETOBJTYPE_EX` item naming its UUID under a synthetic
//! internal id counting down from [`protocol::MAX_TYPE`], and every item of
//! that type (including this first one) is then written with its wire type
//! aliased to that same internal id, keeping the caller's real item id.

use log::debug;

use crate::constants::MAX_SNAPSHOT_ITEMS;
use crate::errors::{DemoError, DemoResult};
use crate::protocol::{self, MAX_EXTENDED_ITEM_TYPES, MAX_TYPE, OFFSET_UUID};
use crate::snapshot::{Snapshot, SnapshotItem};

pub struct SnapshotBuilder {
  items: Vec<SnapshotItem>,
  extended_item_types: Vec<i32>,
}

impl SnapshotBuilder {
  pub fn new() -> Self {
    SnapshotBuilder {
      items: Vec::new(),
      extended_item_types: Vec::new(),
    }
  }

  pub fn clear(&mut self) {
    self.items.clear();
    self.extended_item_types.clear();
  }

  fn extended_item_type_index(&mut self, type_: i32) -> DemoResult<usize> {
    if let Some(index) = self.extended_item_types.iter().position(|&t| t == type_) {
      return Ok(index);
    }
    if self.extended_item_types.len() >= MAX_EXTENDED_ITEM_TYPES {
      return Err(DemoError::limit_exceeded("snapshot builder: too many distinct extended item types"));
    }
    let index = self.extended_item_types.len();
    self.extended_item_types.push(type_);

    let uuid = match protocol::uuid_for_type(type_) {
      Some(uuid) => uuid,
      None => {
        debug!("snapshot builder: type {} is not a registered extended type, using a zeroed uuid", type_);
        [0u8; 16]
      }
    };

    let internal_id = MAX_TYPE - index as i32;
    let ex_payload = protocol::uuid_to_words(&uuid).to_vec();
    if let Err(e) = self.push_item(protocol::NETOBJTYPE_EX, internal_id, ex_payload) {
      self.extended_item_types.pop();
      return Err(e);
    }

    Ok(index)
  }

  fn push_item(&mut self, type_: i32, id: i32, payload: Vec<i32>) -> DemoResult<()> {
    if self.items.len() >= MAX_SNAPSHOT_ITEMS {
      return Err(DemoError::limit_exceeded("snapshot builder: too many items"));
    }
    self.items.push(SnapshotItem::new(type_, id, payload));
    Ok(())
  }

  /// Adds one item, keyed by the caller's real `(type, id)`. For extended
  /// types the stored wire type is aliased to this demo's internal id for
  /// that type; `id` is preserved unchanged.
  pub fn add(&mut self, type_: i32, id: i32, payload: Vec<i32>) -> DemoResult<()> {
    if !(0..=0xffff).contains(&id) {
      return Err(DemoError::invalid_state(format!("item id {} out of range", id)));
    }

    if type_ < OFFSET_UUID {
      return self.push_item(type_, id, payload);
    }

    let index = self.extended_item_type_index(type_)?;
    let internal_id = MAX_TYPE - index as i32;
    self.push_item(internal_id, id, payload)
  }

  pub fn finish(self) -> Snapshot {
    Snapshot { items: self.items }
  }
}

impl Default for SnapshotBuilder {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_vanilla_items_pass_through() {
    let mut b = SnapshotBuilder::new();
    b.add(protocol::NETOBJTYPE_PLAYERINFO, 3, vec![1, 2, 3, 4, 5]).unwrap();
    let snap = b.finish();
    assert_eq!(snap.item_count(), 1);
    assert_eq!(snap.find(protocol::NETOBJTYPE_PLAYERINFO, 3).unwrap().payload, vec![1, 2, 3, 4, 5]);
  }

  #[test]
  fn test_extended_type_splices_ex_item_once() {
    let mut b = SnapshotBuilder::new();
    b.add(protocol::NETOBJTYPE_DDNETCHARACTER, 0, vec![1; 11]).unwrap();
    b.add(protocol::NETOBJTYPE_DDNETCHARACTER, 1, vec![2; 11]).unwrap();
    let snap = b.finish();

    // one EX item naming the uuid, plus the two character items, all
    // sharing the same aliased wire type
    assert_eq!(snap.item_count(), 3);
    let internal_id = MAX_TYPE;

    let ex_item = snap.find(protocol::NETOBJTYPE_EX, internal_id).unwrap();
    let expected_uuid_words = protocol::uuid_to_words(&protocol::uuid_for_type(protocol::NETOBJTYPE_DDNETCHARACTER).unwrap());
    assert_eq!(ex_item.payload, expected_uuid_words.to_vec());

    assert_eq!(snap.find(internal_id, 0).unwrap().payload, vec![1; 11]);
    assert_eq!(snap.find(internal_id, 1).unwrap().payload, vec![2; 11]);
  }

  #[test]
  fn test_two_distinct_extended_types_get_distinct_aliases() {
    let mut b = SnapshotBuilder::new();
    b.add(protocol::NETOBJTYPE_DDNETCHARACTER, 0, vec![0; 11]).unwrap();
    b.add(protocol::NETOBJTYPE_DDNETPLAYER, 0, vec![0; 1]).unwrap();
    let snap = b.finish();

    assert_eq!(snap.item_count(), 4);
    assert!(snap.find(MAX_TYPE, 0).is_some());
    assert!(snap.find(MAX_TYPE - 1, 0).is_some());
  }

  #[test]
  fn test_unregistered_extended_type_uses_zeroed_uuid() {
    let mut b = SnapshotBuilder::new();
    b.add(OFFSET_UUID + 9999, 0, vec![1, 2, 3]).unwrap();
    let snap = b.finish();

    let internal_id = MAX_TYPE;
    let ex_item = snap.find(protocol::NETOBJTYPE_EX, internal_id).unwrap();
    assert_eq!(ex_item.payload, vec![0, 0, 0, 0]);
    assert_eq!(snap.find(internal_id, 0).unwrap().payload, vec![1, 2, 3]);
  }

  #[test]
  fn test_out_of_range_id_rejected() {
    let mut b = SnapshotBuilder::new();
    assert!(b.add(protocol::NETOBJTYPE_FLAG, -1, vec![]).is_err());
    assert!(b.add(protocol::NETOBJTYPE_FLAG, 0x10000, vec![]).is_err());
  }
}
