//! # Smart Diff
//!
//! Decides whether a freshly fetched page is observably the same as the one
//! already on screen. Items are matched by their unique key, never by
//! position or pointer. Matched items whose values differ get the candidate's
//! fields assigned onto them in place through their
//! [`SharedItem`](crate::model::SharedItem) handle, so a page that only
//! changed field values never needs to be re-emitted. Fields the candidate
//! lacks keep their held values.

use crate::key_path::KeyPath;
use crate::model::{Page, ResourceModel};
use serde_json::Value;

/// Result of comparing a candidate page with the visible one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOutcome {
    /// The candidate must be emitted.
    Changed,
    /// The previous page stays visible. Field changes, if any, were merged into it.
    Unchanged,
}

fn key_of<T: ResourceModel>(item: &T, unique: &KeyPath) -> Option<Value> {
    let serialized = serde_json::to_value(item).ok()?;
    unique.resolve(&serialized).cloned()
}

/// Copies the top-level fields of `fresh` onto `held`.
///
/// Non-object values, or a merge the model cannot deserialize, fall back to `fresh`.
fn assign<T: ResourceModel>(held: &T, fresh: T) -> T {
    let (Ok(Value::Object(mut merged)), Ok(Value::Object(fields))) =
        (serde_json::to_value(held), serde_json::to_value(&fresh))
    else {
        return fresh;
    };
    merged.extend(fields);
    serde_json::from_value(Value::Object(merged)).unwrap_or(fresh)
}

/// Compares `candidate` with `previous`, merging changed items into `previous`.
///
/// Merges done before a mismatch is found are kept even when the outcome is
/// [`DiffOutcome::Changed`].
pub fn merge_into<T: ResourceModel>(
    previous: &Page<T>,
    candidate: &Page<T>,
    unique: &KeyPath,
) -> DiffOutcome {
    if previous.len() != candidate.len() {
        return DiffOutcome::Changed;
    }
    if let (Some(old), Some(new)) = (&previous.pagination, &candidate.pagination) {
        if old.current_page != new.current_page {
            return DiffOutcome::Changed;
        }
    }

    let candidate_keys: Vec<Option<Value>> = candidate
        .items
        .iter()
        .map(|item| key_of(&*item.read(), unique))
        .collect();

    for held in &previous.items {
        let Some(key) = key_of(&*held.read(), unique) else {
            return DiffOutcome::Changed;
        };
        let Some(index) = candidate_keys
            .iter()
            .position(|candidate_key| candidate_key.as_ref() == Some(&key))
        else {
            return DiffOutcome::Changed;
        };

        let fresh = candidate.items[index].get();
        let merged = {
            let current = held.read();
            (*current != fresh).then(|| assign(&*current, fresh))
        };
        if let Some(merged) = merged {
            held.replace(merged);
        }
    }

    DiffOutcome::Unchanged
}
