//! # Data Model
//!
//! The values that flow out of a resource: pages of shared items, single
//! items, and the [`Snapshot`] a stream currently holds.
//!
//! Items inside a [`Page`] are held through [`SharedItem`] handles. When a
//! refresh returns the same items with a few changed fields, the pipeline
//! writes the new values *into* the existing handles instead of emitting a new
//! page, so anything holding a handle sees the change while the page itself
//! keeps its identity.

use crate::error::ResourceError;
use crate::pagination::PageMeta;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

/// Anything a resource can decode its items into.
///
/// Implemented for every serde type that is also comparable, so plain
/// `serde_json::Value` works as an untyped model.
pub trait ResourceModel:
    Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> ResourceModel for T where
    T: Clone + PartialEq + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// A shared, in-place mutable item.
///
/// Cloning the handle shares the item; [`SharedItem::ptr_eq`] tells whether
/// two handles are the same item.
#[derive(Debug, Default)]
pub struct SharedItem<T>(Arc<RwLock<T>>);

impl<T> SharedItem<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrites the item in place and returns the previous value.
    pub fn replace(&self, value: T) -> T {
        let mut guard = self.0.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, value)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: Clone> SharedItem<T> {
    /// A copy of the current value.
    pub fn get(&self) -> T {
        self.read().clone()
    }
}

impl<T> Clone for SharedItem<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> From<T> for SharedItem<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// A page of a collection.
#[derive(Debug)]
pub struct Page<T> {
    pub items: Vec<SharedItem<T>>,
    pub pagination: Option<PageMeta>,
    /// Whatever else the server sent beside the items.
    pub meta: Value,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, pagination: Option<PageMeta>) -> Self {
        Self {
            items: items.into_iter().map(SharedItem::new).collect(),
            pagination,
            meta: Value::Null,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Clone> Page<T> {
    /// Copies of the current item values, in order.
    pub fn values(&self) -> Vec<T> {
        self.items.iter().map(SharedItem::get).collect()
    }
}

impl<T> Clone for Page<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
            pagination: self.pagination,
            meta: self.meta.clone(),
        }
    }
}

/// A single fetched item.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleItem<T> {
    pub data: T,
    pub meta: Value,
}

/// What a stream currently holds.
#[derive(Debug, Clone)]
pub enum Snapshot<V> {
    /// Nothing fetched yet.
    Pending,
    Ready(V),
    /// The last fetch failed; the next trigger retries.
    Failed(ResourceError),
}

impl<V> Snapshot<V> {
    pub fn ready(&self) -> Option<&V> {
        match self {
            Snapshot::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Snapshot::Pending)
    }
}
