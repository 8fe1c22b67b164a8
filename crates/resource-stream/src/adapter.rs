//! # Adapter Pipeline
//!
//! Per-field bidirectional transforms. An [`Adapter`] registered on a
//! [`KeyPath`] rewrites that field on the way out (`up`, applied to request
//! bodies) and on the way in (`down`, applied to every item of a response).
//!
//! Both directions are total: a path that resolves to nothing is skipped.
//! Entries run in registration order, but an adapter must not rely on another
//! adapter's output from the same pass.
//!
//! ```rust
//! use resource_stream::adapter::{Adapter, AdapterRegistry, CrudMethod};
//! use serde_json::json;
//!
//! let mut adapters = AdapterRegistry::default();
//! adapters
//!     .register(
//!         "price",
//!         Adapter::new()
//!             .up(|v, _, _| json!(v.as_f64().unwrap_or_default() / 100.0))
//!             .down(|v, _| json!(v.as_f64().unwrap_or_default() * 100.0)),
//!     )
//!     .unwrap();
//!
//! let mut body = json!({"price": 1250.0});
//! adapters.apply_up(&mut body, CrudMethod::Create);
//! assert_eq!(body, json!({"price": 12.5}));
//! ```

use crate::error::ConfigurationError;
use crate::key_path::KeyPath;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// The CRUD operation an outbound body belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrudMethod {
    Get,
    Create,
    Update,
    Delete,
}

/// Outbound transform: `(field value, whole body, method) -> new value`.
pub type UpFn = Arc<dyn Fn(&Value, &Value, CrudMethod) -> Value + Send + Sync>;

/// Inbound transform: `(field value, whole item) -> new value`.
pub type DownFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

/// Where an inbound transform writes its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownWrite {
    /// Overwrite the field.
    #[default]
    Replace,
    /// Keep the raw field and write the result beside it under `"<key>[adapted]"`.
    Annotate,
}

/// Suffix appended to a field name by [`DownWrite::Annotate`].
pub const ADAPTED_SUFFIX: &str = "[adapted]";

/// A bidirectional transform for one field.
#[derive(Clone, Default)]
pub struct Adapter {
    up: Option<UpFn>,
    down: Option<DownFn>,
    write: DownWrite,
}

impl Adapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn up(
        mut self,
        f: impl Fn(&Value, &Value, CrudMethod) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.up = Some(Arc::new(f));
        self
    }

    pub fn down(mut self, f: impl Fn(&Value, &Value) -> Value + Send + Sync + 'static) -> Self {
        self.down = Some(Arc::new(f));
        self
    }

    /// Write inbound results under a suffixed key instead of replacing the field.
    pub fn annotate(mut self) -> Self {
        self.write = DownWrite::Annotate;
        self
    }
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("up", &self.up.is_some())
            .field("down", &self.down.is_some())
            .field("write", &self.write)
            .finish()
    }
}

/// Adapters of one resource, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct AdapterRegistry {
    entries: Vec<(KeyPath, Adapter)>,
}

impl AdapterRegistry {
    /// Registers `adapter` on `path`, replacing any adapter already on that path.
    ///
    /// The path is parsed here so a malformed path fails at setup time.
    pub fn register(&mut self, path: &str, adapter: Adapter) -> Result<(), ConfigurationError> {
        let path = KeyPath::parse(path)?;
        match self.entries.iter_mut().find(|(existing, _)| *existing == path) {
            Some((_, slot)) => *slot = adapter,
            None => self.entries.push((path, adapter)),
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies every `down` transform to an inbound item.
    pub fn apply_down(&self, item: &mut Value) {
        for (path, adapter) in &self.entries {
            let Some(down) = &adapter.down else {
                continue;
            };
            let Some(current) = path.resolve(item) else {
                trace!(%path, "Down adapter skipped, field absent");
                continue;
            };
            let adapted = down(current, item);

            match adapter.write {
                DownWrite::Replace => {
                    if let Some(slot) = path.resolve_mut(item) {
                        *slot = adapted;
                    }
                }
                DownWrite::Annotate => {
                    if let Some(Value::Object(container)) = path.parent_mut(item) {
                        container.insert(format!("{}{ADAPTED_SUFFIX}", path.last()), adapted);
                    }
                }
            }
        }
    }

    /// Applies every `up` transform to an outbound body.
    pub fn apply_up(&self, body: &mut Value, method: CrudMethod) {
        for (path, adapter) in &self.entries {
            let Some(up) = &adapter.up else {
                continue;
            };
            let Some(current) = path.resolve(body) else {
                trace!(%path, ?method, "Up adapter skipped, field absent");
                continue;
            };
            let adapted = up(current, body, method);
            if let Some(slot) = path.resolve_mut(body) {
                *slot = adapted;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn halving_price() -> AdapterRegistry {
        let mut adapters = AdapterRegistry::default();
        adapters
            .register(
                "price",
                Adapter::new()
                    .up(|v, _, _| json!(v.as_i64().unwrap_or_default() / 2))
                    .down(|v, _| json!(v.as_i64().unwrap_or_default() * 2)),
            )
            .unwrap();
        adapters
    }

    #[test]
    fn test_up_then_down_round_trips() {
        let adapters = halving_price();
        let mut payload = json!({"price": 4});

        adapters.apply_up(&mut payload, CrudMethod::Update);
        assert_eq!(payload, json!({"price": 2}));

        adapters.apply_down(&mut payload);
        assert_eq!(payload, json!({"price": 4}));
    }

    #[test]
    fn test_absent_fields_are_skipped() {
        let adapters = halving_price();
        let mut payload = json!({"name": "widget"});
        adapters.apply_up(&mut payload, CrudMethod::Create);
        adapters.apply_down(&mut payload);
        assert_eq!(payload, json!({"name": "widget"}));
    }

    #[test]
    fn test_annotate_keeps_raw_field() {
        let mut adapters = AdapterRegistry::default();
        adapters
            .register(
                "author[name]",
                Adapter::new()
                    .down(|v, _| json!(v.as_str().unwrap_or_default().to_uppercase()))
                    .annotate(),
            )
            .unwrap();

        let mut item = json!({"author": {"name": "ada"}});
        adapters.apply_down(&mut item);
        assert_eq!(item, json!({"author": {"name": "ada", "name[adapted]": "ADA"}}));
    }

    #[test]
    fn test_up_receives_method_and_whole_body() {
        let mut adapters = AdapterRegistry::default();
        adapters
            .register(
                "slug",
                Adapter::new().up(|v, body, method| match method {
                    CrudMethod::Create => {
                        let kind = body["kind"].as_str().unwrap_or("");
                        json!(format!("{kind}-{}", v.as_str().unwrap_or("")))
                    }
                    _ => v.clone(),
                }),
            )
            .unwrap();

        let mut created = json!({"kind": "post", "slug": "hello"});
        adapters.apply_up(&mut created, CrudMethod::Create);
        assert_eq!(created["slug"], "post-hello");

        let mut updated = json!({"kind": "post", "slug": "hello"});
        adapters.apply_up(&mut updated, CrudMethod::Update);
        assert_eq!(updated["slug"], "hello");
    }

    #[test]
    fn test_register_rejects_bad_path_and_replaces_duplicates() {
        let mut adapters = AdapterRegistry::default();
        assert!(adapters.register("price[", Adapter::new()).is_err());

        adapters.register("price", Adapter::new()).unwrap();
        adapters.register("price", Adapter::new().annotate()).unwrap();
        assert_eq!(adapters.len(), 1);
    }
}
