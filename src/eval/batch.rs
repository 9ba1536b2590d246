//! Grouping of pending items into judge batches.

use super::record::Item;
use serde_json::{Map, Value, map};
use std::collections::HashSet;
use tracing::warn;

/// Items submitted to the judge together. Never persisted.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Zero-based position of this batch within the run.
    pub index: usize,
    pub items: Vec<Item>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Lazily yields batches of up to `batch_size` pending items, in input order.
///
/// An item is pending when it carries every required field and its id is not
/// in `already_scored`. Construct a new builder to restart with a fresh id set.
pub struct BatchBuilder<'a> {
    entries: map::Iter<'a>,
    already_scored: &'a HashSet<String>,
    batch_size: usize,
    next_index: usize,
    skipped: usize,
    resumed: usize,
}

/// Batches of pending items from `items`, skipping ids in `already_scored_ids`.
///
/// `already_scored_ids` should only hold ids whose stored record has a judge
/// verdict, so that previously failed items are retried.
pub fn next_batches<'a>(
    items: &'a Map<String, Value>,
    already_scored_ids: &'a HashSet<String>,
    batch_size: usize,
) -> BatchBuilder<'a> {
    BatchBuilder {
        entries: items.iter(),
        already_scored: already_scored_ids,
        batch_size: batch_size.max(1),
        next_index: 0,
        skipped: 0,
        resumed: 0,
    }
}

impl BatchBuilder<'_> {
    /// Items dropped so far because a required field was missing.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Items passed over so far because they already have a verdict.
    pub fn resumed(&self) -> usize {
        self.resumed
    }
}

impl Iterator for BatchBuilder<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        let mut items = Vec::with_capacity(self.batch_size);

        while items.len() < self.batch_size {
            let Some((id, value)) = self.entries.next() else {
                break;
            };

            match Item::from_value(id, value) {
                Ok(_) if self.already_scored.contains(id) => self.resumed += 1,
                Ok(item) => items.push(item),
                Err(e) => {
                    warn!(id = %id, error = %e, "skipping incomplete item");
                    self.skipped += 1;
                }
            }
        }

        if items.is_empty() {
            return None;
        }

        let batch = Batch {
            index: self.next_index,
            items,
        };
        self.next_index += 1;
        Some(batch)
    }
}
