//! Wordwise delta encoding between two snapshots: items absent from the new
//! snapshot are named by key for deletion, and items present in both are
//! diffed word-by-word using wrapping subtraction so that mostly-unchanged
//! state compresses to mostly-zero words.

use crate::errors::{DemoError, DemoResult};
use crate::protocol::known_word_size;
use crate::snapshot::{Snapshot, SnapshotItem};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeltaUpdate {
  pub type_: i32,
  pub id: i32,
  /// Wordwise diff against the matching item in the base snapshot, or the
  /// raw payload if there was no matching item.
  pub payload: Vec<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Delta {
  pub deleted_keys: Vec<i32>,
  pub updates: Vec<DeltaUpdate>,
}

fn diff_words(past: &[i32], current: &[i32]) -> Vec<i32> {
  past
    .iter()
    .zip(current.iter())
    .map(|(&p, &c)| (c as u32).wrapping_sub(p as u32) as i32)
    .collect()
}

fn undiff_words(past: &[i32], diff: &[i32]) -> Vec<i32> {
  past
    .iter()
    .zip(diff.iter())
    .map(|(&p, &d)| (p as u32).wrapping_add(d as u32) as i32)
    .collect()
}

/// Computes the delta needed to turn `from` into `to`. Items whose diff
/// against `from` is all-zero are omitted entirely, since the reader
/// reconstructs unchanged items straight from its own copy of `from`.
pub fn compute_delta(from: &Snapshot, to: &Snapshot) -> Delta {
  let mut deleted_keys = Vec::new();
  for item in &from.items {
    if to.find(item.type_, item.id).is_none() {
      deleted_keys.push(item.key());
    }
  }

  let mut updates = Vec::new();
  for item in &to.items {
    let from_item = from.find(item.type_, item.id);
    match from_item {
      Some(from_item) if from_item.payload.len() == item.payload.len() => {
        let diff = diff_words(&from_item.payload, &item.payload);
        if diff.iter().any(|&w| w != 0) {
          updates.push(DeltaUpdate { type_: item.type_, id: item.id, payload: diff });
        }
      }
      _ => {
        updates.push(DeltaUpdate { type_: item.type_, id: item.id, payload: item.payload.clone() });
      }
    }
  }

  Delta { deleted_keys, updates }
}

/// Reconstructs the snapshot that produced `delta` against `from`.
pub fn apply_delta(from: &Snapshot, delta: &Delta) -> DemoResult<Snapshot> {
  let mut items: Vec<SnapshotItem> = from
    .items
    .iter()
    .filter(|item| !delta.deleted_keys.contains(&item.key()))
    .filter(|item| !delta.updates.iter().any(|u| u.type_ == item.type_ && u.id == item.id))
    .cloned()
    .collect();

  for update in &delta.updates {
    let payload = match from.find(update.type_, update.id) {
      Some(from_item) if from_item.payload.len() == update.payload.len() => {
        undiff_words(&from_item.payload, &update.payload)
      }
      Some(_) => {
        return Err(DemoError::corruption(format!(
          "delta: item ({}, {}) size mismatch against base snapshot",
          update.type_, update.id
        )));
      }
      None => update.payload.clone(),
    };
    items.push(SnapshotItem::new(update.type_, update.id, payload));
  }

  Ok(Snapshot { items })
}

impl Delta {
  pub fn is_empty(&self) -> bool {
    self.deleted_keys.is_empty() && self.updates.is_empty()
  }

  /// Serializes to the flat word layout used on the wire: header, deleted
  /// keys, then each update's `[type, id, (size), payload...]`.
  pub fn to_words(&self) -> Vec<i32> {
    let mut words = vec![self.deleted_keys.len() as i32, self.updates.len() as i32, 0];
    words.extend_from_slice(&self.deleted_keys);
    for update in &self.updates {
      words.push(update.type_);
      words.push(update.id);
      if known_word_size(update.type_).is_none() {
        words.push(update.payload.len() as i32);
      }
      words.extend_from_slice(&update.payload);
    }
    words
  }

  /// Inverse of [`to_words`]. Fixed-size vanilla types recover their word
  /// count from [`known_word_size`] rather than an explicit size word.
  pub fn from_words(words: &[i32]) -> DemoResult<Self> {
    if words.len() < 3 {
      return Err(DemoError::truncated("delta: missing header words"));
    }
    let num_deleted = words[0] as usize;
    let num_updates = words[1] as usize;

    let mut pos = 3;
    let deleted_end = pos + num_deleted;
    if words.len() < deleted_end {
      return Err(DemoError::truncated("delta: missing deleted key list"));
    }
    let deleted_keys = words[pos..deleted_end].to_vec();
    pos = deleted_end;

    let mut updates = Vec::with_capacity(num_updates);
    for _ in 0..num_updates {
      if pos + 2 > words.len() {
        return Err(DemoError::truncated("delta: missing update header"));
      }
      let type_ = words[pos];
      let id = words[pos + 1];
      pos += 2;

      let word_count = match known_word_size(type_) {
        Some(size) => size,
        None => {
          if pos >= words.len() {
            return Err(DemoError::truncated("delta: missing update size word"));
          }
          let size = words[pos];
          pos += 1;
          if size < 0 {
            return Err(DemoError::corruption("delta: negative update size"));
          }
          size as usize
        }
      };

      let payload_end = pos + word_count;
      if words.len() < payload_end {
        return Err(DemoError::truncated("delta: missing update payload"));
      }
      updates.push(DeltaUpdate { type_, id, payload: words[pos..payload_end].to_vec() });
      pos = payload_end;
    }

    Ok(Delta { deleted_keys, updates })
  }
}
