//! # Resources
//!
//! A [`Resource`] is the declarative description of one REST collection plus
//! the operations on it. It is configured once through [`ResourceBuilder`]
//! and is immutable afterwards; the handle itself is cheap to clone.
//!
//! ```rust,no_run
//! use resource_stream::adapter::Adapter;
//! use resource_stream::mock::MockTransport;
//! use resource_stream::resource::Resource;
//! use serde_json::{json, Value};
//!
//! # fn build() -> Result<(), resource_stream::error::ConfigurationError> {
//! let mock = MockTransport::new();
//! let posts = Resource::<Value>::builder("posts")
//!     .prefix("admin")
//!     .filter_by("published", json!(true))
//!     .adapter(
//!         "price",
//!         Adapter::new().down(|v, _| json!(v.as_i64().unwrap_or_default() as f64 / 100.0)),
//!     )?
//!     .build(mock.transport());
//! # let _ = posts;
//! # Ok(())
//! # }
//! ```
//!
//! ## Request paths
//!
//! | operation | method | path |
//! |-----------|--------|------|
//! | `fetch_collection` | GET | `{prefix}{scope}{name}` |
//! | `fetch_item` | GET | `{prefix}{scope}{name}/{id}` |
//! | `create` | POST | `{prefix}{scope}{name}` |
//! | `update` | PATCH | `{prefix}{scope}{name}/{id}` |
//! | `delete` | DELETE | `{prefix}{scope}{name}/{id}` |
//! | `toggle` | PATCH | `{prefix}{scope}{name}/{id}/toggle` |
//!
//! `scope` is empty unless the resource was initialized as the child of a
//! parent resource, in which case it is `{parent_name}/{parent_id}/`.

use crate::adapter::{Adapter, AdapterRegistry, CrudMethod};
use crate::envelope::{normalize_item, normalize_page};
use crate::error::{ConfigurationError, ResourceError, Result};
use crate::key_path::KeyPath;
use crate::model::{Page, ResourceModel, SharedItem, SingleItem};
use crate::transport::{ApiRequest, HttpMethod, Transport};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, instrument};

/// Per-item transform applied after decoding.
pub type TransformFn<T> = Arc<dyn Fn(T) -> T + Send + Sync>;

/// Manual refresh signal shared by every pipeline that observes it.
#[derive(Debug, Clone)]
pub struct Refresher {
    signal: Arc<watch::Sender<u64>>,
}

impl Refresher {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(0);
        Self {
            signal: Arc::new(signal),
        }
    }

    /// Re-runs every pipeline observing this refresher.
    pub fn refresh(&self) {
        self.signal.send_modify(|count| *count = count.wrapping_add(1));
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.signal.subscribe()
    }

    pub fn same_as(&self, other: &Refresher) -> bool {
        Arc::ptr_eq(&self.signal, &other.signal)
    }
}

impl Default for Refresher {
    fn default() -> Self {
        Self::new()
    }
}

/// The last single item a resource fetched through its item stream.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedItem<T> {
    /// Identifier the item was fetched with.
    pub id: String,
    pub item: SingleItem<T>,
}

/// A non-owning view of a parent resource, used to scope a child.
#[derive(Debug, Clone)]
pub struct ParentScope {
    name: String,
    ids: watch::Receiver<Option<String>>,
}

impl ParentScope {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parent's current identifier, marking it as seen.
    pub(crate) fn current_id(&mut self) -> Option<String> {
        self.ids.borrow_and_update().clone()
    }

    pub(crate) fn ids_mut(&mut self) -> &mut watch::Receiver<Option<String>> {
        &mut self.ids
    }

    /// `{parent_name}/{parent_id}/` once the parent has an identifier.
    pub(crate) fn prefix(&mut self) -> Option<String> {
        let id = self.current_id()?;
        Some(format!("{}/{id}/", self.name))
    }
}

/// A resource whose refresh signal can be taken over by another resource.
pub trait Supervised: Send + Sync {
    fn name(&self) -> &str;

    /// Replaces this resource's refresher. Fails once its streams exist.
    fn adopt_refresher(&self, refresher: Refresher) -> Result<()>;
}

pub(crate) struct ResourceConfig<T> {
    pub(crate) name: String,
    pub(crate) server: Option<String>,
    pub(crate) version: Option<String>,
    pub(crate) prefix: String,
    pub(crate) accessor: Option<String>,
    pub(crate) filters: Map<String, Value>,
    pub(crate) adapters: AdapterRegistry,
    pub(crate) transformer: Option<TransformFn<T>>,
    pub(crate) unique_key: KeyPath,
}

pub struct ResourceBuilder<T> {
    config: ResourceConfig<T>,
}

impl<T: ResourceModel> ResourceBuilder<T> {
    fn new(name: impl Into<String>) -> Self {
        Self {
            config: ResourceConfig {
                name: name.into(),
                server: None,
                version: None,
                prefix: String::new(),
                accessor: None,
                filters: Map::new(),
                adapters: AdapterRegistry::default(),
                transformer: None,
                unique_key: KeyPath::default(),
            },
        }
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.config.server = Some(server.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = Some(version.into());
        self
    }

    /// Path segment placed before the resource name (`admin` gives `admin/posts`).
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_matches('/');
        self.config.prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}/")
        };
        self
    }

    /// Key holding the items in a collection response that does not use `data`.
    pub fn accessor(mut self, accessor: impl Into<String>) -> Self {
        self.config.accessor = Some(accessor.into());
        self
    }

    /// Adds a filter sent with every fetch. A later value for the same field wins.
    pub fn filter_by(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.filters.insert(field.into(), value.into());
        self
    }

    pub fn adapter(mut self, path: &str, adapter: Adapter) -> Result<Self, ConfigurationError> {
        self.config.adapters.register(path, adapter)?;
        Ok(self)
    }

    pub fn transformer(mut self, transform: impl Fn(T) -> T + Send + Sync + 'static) -> Self {
        self.config.transformer = Some(Arc::new(transform));
        self
    }

    /// Key path identifying an item across fetches (default `id`).
    pub fn unique_key(mut self, path: &str) -> Result<Self, ConfigurationError> {
        self.config.unique_key = KeyPath::parse(path)?;
        Ok(self)
    }

    pub fn build(self, transport: Arc<dyn Transport>) -> Resource<T> {
        let (cached, _) = watch::channel(None);
        let (parent_ids, _) = watch::channel(None);
        Resource {
            inner: Arc::new(ResourceInner {
                config: self.config,
                transport,
                refresher: Mutex::new(Refresher::new()),
                scope: Mutex::new(String::new()),
                cached,
                parent_ids,
                initialized: AtomicBool::new(false),
            }),
        }
    }
}

struct ResourceInner<T> {
    config: ResourceConfig<T>,
    transport: Arc<dyn Transport>,
    refresher: Mutex<Refresher>,
    /// Parent scope resolved by the pipelines, reused by CRUD calls.
    scope: Mutex<String>,
    cached: watch::Sender<Option<CachedItem<T>>>,
    parent_ids: watch::Sender<Option<String>>,
    initialized: AtomicBool,
}

/// A configured resource. Clones share configuration, cache and refresher.
pub struct Resource<T> {
    inner: Arc<ResourceInner<T>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.inner.config.name)
            .field("prefix", &self.inner.config.prefix)
            .field("adapters", &self.inner.config.adapters.len())
            .finish()
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn id_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl<T: ResourceModel> Resource<T> {
    pub fn builder(name: impl Into<String>) -> ResourceBuilder<T> {
        ResourceBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn unique_key(&self) -> &KeyPath {
        &self.inner.config.unique_key
    }

    pub(crate) fn scope(&self) -> String {
        lock(&self.inner.scope).clone()
    }

    pub(crate) fn set_scope(&self, scope: &str) {
        let mut current = lock(&self.inner.scope);
        if *current != scope {
            *current = scope.to_string();
        }
    }

    fn request(&self, method: HttpMethod, scope: &str, path: String, body: Value) -> ApiRequest {
        let config = &self.inner.config;
        ApiRequest {
            method,
            server: config.server.clone(),
            version: config.version.clone(),
            path_prefix: format!("{}{scope}", config.prefix),
            path,
            body,
        }
    }

    fn item_path(&self, id: &str) -> String {
        format!("{}/{id}", self.inner.config.name)
    }

    fn decode(&self, mut raw: Value) -> Result<T> {
        let config = &self.inner.config;
        config.adapters.apply_down(&mut raw);
        let item: T = serde_json::from_value(raw).map_err(|e| ResourceError::Decode {
            resource: config.name.clone(),
            message: e.to_string(),
        })?;
        Ok(match &config.transformer {
            Some(transform) => transform(item),
            None => item,
        })
    }

    fn outbound(&self, body: Value, method: CrudMethod) -> Value {
        let mut body = match body {
            Value::Null => Value::Object(Map::new()),
            body => body,
        };
        self.inner.config.adapters.apply_up(&mut body, method);
        body
    }

    /// Fetches one page of the collection. `filters` override the configured ones.
    #[instrument(skip(self, filters), fields(resource = %self.inner.config.name))]
    pub async fn fetch_collection(&self, filters: Map<String, Value>) -> Result<Page<T>> {
        let scope = self.scope();
        self.fetch_page(&scope, filters).await
    }

    pub(crate) async fn fetch_page(
        &self,
        scope: &str,
        filters: Map<String, Value>,
    ) -> Result<Page<T>> {
        let config = &self.inner.config;
        let mut merged = config.filters.clone();
        merged.extend(filters);
        let body = self.outbound(Value::Object(merged), CrudMethod::Get);

        let request = self.request(HttpMethod::Get, scope, config.name.clone(), body);
        debug!(path = %request.full_path(), body = %request.body, "Fetching collection");
        let payload = self.inner.transport.request(request).await?;

        let normalized = normalize_page(payload, config.accessor.as_deref(), &config.name);
        let items = normalized
            .items
            .into_iter()
            .map(|raw| self.decode(raw).map(SharedItem::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            pagination: normalized.pagination,
            meta: normalized.meta,
        })
    }

    /// Fetches a single item with the configured filters.
    #[instrument(skip(self, id), fields(resource = %self.inner.config.name, id = %id))]
    pub async fn fetch_item(&self, id: impl fmt::Display + Send) -> Result<SingleItem<T>> {
        let scope = self.scope();
        self.fetch_single(&scope, &id.to_string()).await
    }

    pub(crate) async fn fetch_single(&self, scope: &str, id: &str) -> Result<SingleItem<T>> {
        let body = self.outbound(Value::Object(self.inner.config.filters.clone()), CrudMethod::Get);
        let request = self.request(HttpMethod::Get, scope, self.item_path(id), body);
        debug!(path = %request.full_path(), "Fetching item");
        let payload = self.inner.transport.request(request).await?;

        let normalized = normalize_item(payload);
        Ok(SingleItem {
            data: self.decode(normalized.data)?,
            meta: normalized.meta,
        })
    }

    async fn send(&self, method: HttpMethod, path: String, body: Value) -> Result<Value> {
        let request = self.request(method, &self.scope(), path, body);
        debug!(%method, path = %request.full_path(), "Sending request");
        Ok(self.inner.transport.request(request).await?)
    }

    /// Creates an item. Streams are not refreshed.
    #[instrument(skip(self, body), fields(resource = %self.inner.config.name))]
    pub async fn create(&self, body: Value) -> Result<Value> {
        let body = self.outbound(body, CrudMethod::Create);
        self.send(HttpMethod::Post, self.inner.config.name.clone(), body)
            .await
    }

    #[instrument(skip(self, id, body), fields(resource = %self.inner.config.name, id = %id))]
    pub async fn update(&self, id: impl fmt::Display + Send, body: Value) -> Result<Value> {
        let body = self.outbound(body, CrudMethod::Update);
        self.send(HttpMethod::Patch, self.item_path(&id.to_string()), body)
            .await
    }

    #[instrument(skip(self, id, body), fields(resource = %self.inner.config.name, id = %id))]
    pub async fn delete(&self, id: impl fmt::Display + Send, body: Value) -> Result<Value> {
        let body = self.outbound(body, CrudMethod::Delete);
        self.send(HttpMethod::Delete, self.item_path(&id.to_string()), body)
            .await
    }

    /// `PATCH {name}/{id}/toggle`.
    #[instrument(skip(self, id, body), fields(resource = %self.inner.config.name, id = %id))]
    pub async fn toggle(&self, id: impl fmt::Display + Send, body: Value) -> Result<Value> {
        let body = self.outbound(body, CrudMethod::Update);
        let path = format!("{}/toggle", self.item_path(&id.to_string()));
        self.send(HttpMethod::Patch, path, body).await
    }

    pub fn refresher(&self) -> Refresher {
        lock(&self.inner.refresher).clone()
    }

    pub(crate) fn set_refresher(&self, refresher: Refresher) {
        *lock(&self.inner.refresher) = refresher;
    }

    /// Re-runs this resource's pipelines and those of supervised resources.
    pub fn refresh(&self) {
        self.refresher().refresh();
    }

    pub fn cached_item(&self) -> Option<CachedItem<T>> {
        self.inner.cached.borrow().clone()
    }

    pub fn watch_cached(&self) -> watch::Receiver<Option<CachedItem<T>>> {
        self.inner.cached.subscribe()
    }

    /// Caches `item` and scopes children by its value at `unique`.
    pub(crate) fn publish_cached(&self, id: String, item: SingleItem<T>, unique: &KeyPath) {
        let parent_id = serde_json::to_value(&item.data)
            .ok()
            .and_then(|data| unique.resolve(&data).map(id_text))
            .unwrap_or_else(|| id.clone());

        self.inner.cached.send_replace(Some(CachedItem { id, item }));
        self.inner.parent_ids.send_if_modified(|current| {
            if current.as_deref() == Some(parent_id.as_str()) {
                return false;
            }
            *current = Some(parent_id);
            true
        });
    }

    /// A scope handle for children of this resource.
    pub fn as_parent(&self) -> ParentScope {
        ParentScope {
            name: self.inner.config.name.clone(),
            ids: self.inner.parent_ids.subscribe(),
        }
    }

    /// Makes every dependent follow this resource's refresh signal.
    pub fn supervise_refreshers(&self, dependents: &[&dyn Supervised]) -> Result<()> {
        let refresher = self.refresher();
        for dependent in dependents {
            dependent.adopt_refresher(refresher.clone())?;
            debug!(
                supervisor = %self.inner.config.name,
                dependent = dependent.name(),
                "Refresher adopted"
            );
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    /// Claims the single initialization of this resource.
    pub(crate) fn mark_initialized(&self) -> Result<()> {
        if self.inner.initialized.swap(true, Ordering::AcqRel) {
            return Err(ResourceError::AlreadyInitialized(
                self.inner.config.name.clone(),
            ));
        }
        Ok(())
    }
}

impl<T: ResourceModel> Supervised for Resource<T> {
    fn name(&self) -> &str {
        &self.inner.config.name
    }

    fn adopt_refresher(&self, refresher: Refresher) -> Result<()> {
        if self.is_initialized() {
            return Err(ResourceError::AlreadyInitialized(
                self.inner.config.name.clone(),
            ));
        }
        self.set_refresher(refresher);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use serde::Deserialize;
    use serde_json::json;

    fn cents_posts(mock: &MockTransport) -> Resource<Value> {
        Resource::<Value>::builder("posts")
            .prefix("/admin/")
            .filter_by("published", false)
            .adapter(
                "price",
                Adapter::new()
                    .up(|v, _, _| json!(v.as_i64().unwrap_or_default() * 100))
                    .down(|v, _| json!(v.as_i64().unwrap_or_default() / 100)),
            )
            .unwrap()
            .build(mock.transport())
    }

    #[tokio::test]
    async fn test_fetch_collection_merges_filters_and_adapts() {
        let mock = MockTransport::new();
        mock.expect_get("admin/posts")
            .with_body(json!({"published": true, "price": 200}))
            .return_ok(json!({"data": [{"id": 1, "price": 250}]}));
        let posts = cents_posts(&mock);

        let mut filters = Map::new();
        filters.insert("published".into(), json!(true));
        filters.insert("price".into(), json!(2));
        let page = posts.fetch_collection(filters).await.unwrap();

        assert_eq!(page.values(), vec![json!({"id": 1, "price": 2})]);
        mock.verify();
    }

    #[tokio::test]
    async fn test_fetch_item_sends_base_filters() {
        let mock = MockTransport::new();
        mock.expect_get("admin/posts/9")
            .with_body(json!({"published": false}))
            .return_ok(json!({"data": {"id": 9, "price": 100}, "meta": {"v": 1}}));
        let posts = cents_posts(&mock);

        let item = posts.fetch_item(9).await.unwrap();
        assert_eq!(item.data, json!({"id": 9, "price": 1}));
        assert_eq!(item.meta, json!({"v": 1}));
        mock.verify();
    }

    #[tokio::test]
    async fn test_crud_paths_and_methods() {
        let mock = MockTransport::new();
        mock.expect_request(HttpMethod::Post, "posts")
            .with_body(json!({"title": "x"}))
            .return_ok(json!({"id": 3}));
        mock.expect_request(HttpMethod::Patch, "posts/3")
            .return_ok(json!({}));
        mock.expect_request(HttpMethod::Patch, "posts/3/toggle")
            .with_body(json!({}))
            .return_ok(json!({}));
        mock.expect_request(HttpMethod::Delete, "posts/3")
            .return_ok(Value::Null);
        let posts = Resource::<Value>::builder("posts").build(mock.transport());

        assert_eq!(posts.create(json!({"title": "x"})).await.unwrap(), json!({"id": 3}));
        posts.update(3, json!({"title": "y"})).await.unwrap();
        posts.toggle(3, Value::Null).await.unwrap();
        posts.delete(3, Value::Null).await.unwrap();
        mock.verify();
    }

    #[tokio::test]
    async fn test_decode_failure_names_resource() {
        #[derive(Debug, Clone, PartialEq, serde::Serialize, Deserialize)]
        struct Post {
            id: u64,
            title: String,
        }

        let mock = MockTransport::new();
        mock.expect_get("posts/1").return_ok(json!({"id": "one"}));
        let posts = Resource::<Post>::builder("posts").build(mock.transport());

        let error = posts.fetch_item(1).await.unwrap_err();
        assert!(matches!(error, ResourceError::Decode { ref resource, .. } if resource == "posts"));
    }

    #[tokio::test]
    async fn test_transformer_runs_after_adapters() {
        let mock = MockTransport::new();
        mock.expect_get("posts").return_ok(json!([{"id": 1, "price": 500}]));
        let posts = Resource::<Value>::builder("posts")
            .adapter(
                "price",
                Adapter::new().down(|v, _| json!(v.as_i64().unwrap_or_default() / 100)),
            )
            .unwrap()
            .transformer(|mut post| {
                post["label"] = json!(format!("${}", post["price"]));
                post
            })
            .build(mock.transport());

        let page = posts.fetch_collection(Map::new()).await.unwrap();
        assert_eq!(page.values()[0]["label"], "$5");
    }

    #[test]
    fn test_supervision_stops_after_initialization() {
        let mock = MockTransport::new();
        let posts = Resource::<Value>::builder("posts").build(mock.transport());
        let comments = Resource::<Value>::builder("comments").build(mock.transport());
        let tags = Resource::<Value>::builder("tags").build(mock.transport());

        posts.supervise_refreshers(&[&comments]).unwrap();
        assert!(comments.refresher().same_as(&posts.refresher()));

        tags.mark_initialized().unwrap();
        assert_eq!(
            posts.supervise_refreshers(&[&tags]),
            Err(ResourceError::AlreadyInitialized("tags".to_string()))
        );
        assert!(tags.mark_initialized().is_err());
    }

    #[test]
    fn test_builder_rejects_bad_unique_key() {
        let mock = MockTransport::new();
        assert!(Resource::<Value>::builder("posts").unique_key("a[").is_err());
        let posts = Resource::<Value>::builder("posts")
            .unique_key("ref[code]")
            .unwrap()
            .build(mock.transport());
        assert_eq!(posts.unique_key().to_string(), "ref[code]");
    }
}
