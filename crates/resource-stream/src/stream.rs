//! # Resource Streams
//!
//! [`Resource::initialize`] turns a configured resource into two live streams:
//! the paginated collection and the single item selected by the route.
//!
//! Each stream is produced by its own pipeline task, spawned the first time
//! the stream is requested. A pipeline owns all of its state (the pagination
//! cursor and the page currently on screen) and processes one event at a time:
//!
//! | event | collection | item |
//! |-------|------------|------|
//! | refresher fired | replace | refetch |
//! | query parameters changed | replace | |
//! | route parameters changed | | refetch |
//! | parent identifier changed | replace | refetch |
//! | [`ResourceStreams::load_more`] | append | |
//!
//! A replace arriving while a fetch is in flight abandons that fetch: only the
//! newest request can ever reach the stream. Appends arriving while a fetch is
//! in flight are ignored.
//!
//! ## Collection emission
//!
//! A successful collection response goes through the pagination cursor
//! (replace, append, or out of range) and is then compared with the visible
//! page by [`merge_into`]. If only field values changed, they are written into
//! the visible items and nothing is emitted.
//!
//! ## Failures
//!
//! A failed fetch replaces the snapshot with [`Snapshot::Failed`]. The pipeline
//! keeps running and the next trigger retries.

use crate::diff::{merge_into, DiffOutcome};
use crate::error::{ResourceError, Result, TransportError};
use crate::key_path::KeyPath;
use crate::model::{Page, ResourceModel, SingleItem, Snapshot};
use crate::navigation::{Params, Route};
use crate::pagination::{Completion, PagerState, PaginationCursor};
use crate::resource::{ParentScope, Refresher, Resource};
use futures::future::BoxFuture;
use futures::Stream;
use serde_json::{Map, Value};
use std::future::pending;
use std::sync::{Mutex, OnceLock, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Query parameter carrying the requested page.
pub const PAGE_PARAMETER: &str = "page";

const LOAD_MORE_BUFFER: usize = 16;

/// Options for [`Resource::initialize`].
#[derive(Debug, Clone)]
pub struct InitOptions {
    pub route: Option<Route>,
    /// Refresh signal to use instead of the resource's own.
    pub refresher: Option<Refresher>,
    /// Query parameters forwarded to the server; `None` or an empty list forwards all of them.
    pub filters: Option<Vec<String>>,
    /// Route parameter holding the item identifier.
    pub id_parameter: String,
    /// Overrides the resource's unique key for diffing and parent scoping.
    pub unique_key: Option<String>,
    pub load_more: bool,
    pub parent: Option<ParentScope>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            route: None,
            refresher: None,
            filters: None,
            id_parameter: "id".to_string(),
            unique_key: None,
            load_more: false,
            parent: None,
        }
    }
}

impl InitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, route: Route) -> Self {
        self.route = Some(route);
        self
    }

    pub fn refresher(mut self, refresher: Refresher) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn allow_filters<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn id_parameter(mut self, name: impl Into<String>) -> Self {
        self.id_parameter = name.into();
        self
    }

    pub fn unique_key(mut self, path: impl Into<String>) -> Self {
        self.unique_key = Some(path.into());
        self
    }

    pub fn load_more(mut self) -> Self {
        self.load_more = true;
        self
    }

    pub fn parent(mut self, parent: ParentScope) -> Self {
        self.parent = Some(parent);
        self
    }
}

/// Progress of the collection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStatus {
    pub state: PagerState,
    /// Finished fetch cycles: emitted, suppressed, out of range or failed.
    pub cycles: u64,
}

/// Subscriber side of a pipeline output.
#[derive(Debug, Clone)]
pub struct ResourceStream<V> {
    receiver: watch::Receiver<Snapshot<V>>,
}

impl<V: Clone + Send + Sync + 'static> ResourceStream<V> {
    /// The current snapshot, without waiting.
    pub fn latest(&self) -> Snapshot<V> {
        self.receiver.borrow().clone()
    }

    /// Waits for the next emission. `None` once the pipeline has stopped.
    pub async fn next(&mut self) -> Option<Snapshot<V>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Waits until the stream holds a value or an error.
    pub async fn ready(&mut self) -> Result<V> {
        loop {
            let current = self.receiver.borrow_and_update().clone();
            match current {
                Snapshot::Ready(value) => return Ok(value),
                Snapshot::Failed(error) => return Err(error),
                Snapshot::Pending => {}
            }
            self.receiver
                .changed()
                .await
                .map_err(|_| ResourceError::from(TransportError::Closed))?;
        }
    }

    /// Whether an emission arrived that this subscriber has not seen.
    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }

    /// A new subscriber; it starts from the most recent value.
    pub fn subscribe(&self) -> Self {
        let mut receiver = self.receiver.clone();
        receiver.mark_unchanged();
        Self { receiver }
    }

    /// Every future emission as a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Snapshot<V>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            let snapshot = stream.next().await?;
            Some((snapshot, stream))
        })
    }
}

struct CollectionHandle<T> {
    output: watch::Receiver<Snapshot<Page<T>>>,
    status: watch::Receiver<PipelineStatus>,
    load_more: mpsc::Sender<()>,
}

/// The live streams of an initialized resource.
///
/// Dropping it stops both pipelines; [`ResourceStreams::shutdown`] also
/// waits for them to finish.
pub struct ResourceStreams<T> {
    resource: Resource<T>,
    options: InitOptions,
    unique: KeyPath,
    stop: watch::Sender<bool>,
    collection: OnceLock<CollectionHandle<T>>,
    item: OnceLock<watch::Receiver<Snapshot<SingleItem<T>>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: ResourceModel> Resource<T> {
    /// Creates the streams of this resource. Allowed once per resource.
    pub fn initialize(&self, options: InitOptions) -> Result<ResourceStreams<T>> {
        let unique = match options.unique_key.as_deref() {
            Some(path) => KeyPath::parse(path)?,
            None => self.unique_key().clone(),
        };
        self.mark_initialized()?;
        if let Some(refresher) = &options.refresher {
            self.set_refresher(refresher.clone());
        }
        info!(resource = self.name(), load_more = options.load_more, "Resource initialized");

        let (stop, _) = watch::channel(false);
        Ok(ResourceStreams {
            resource: self.clone(),
            options,
            unique,
            stop,
            collection: OnceLock::new(),
            item: OnceLock::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }
}

impl<T: ResourceModel> ResourceStreams<T> {
    pub fn resource(&self) -> &Resource<T> {
        &self.resource
    }

    fn track(&self, task: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    fn collection_handle(&self) -> &CollectionHandle<T> {
        self.collection.get_or_init(|| {
            let (output_tx, output) = watch::channel(Snapshot::Pending);
            let (status_tx, status) = watch::channel(PipelineStatus::default());
            let (load_more, load_more_rx) = mpsc::channel(LOAD_MORE_BUFFER);

            let pipeline = CollectionPipeline {
                resource: self.resource.clone(),
                refresh: Some(self.resource.refresher().subscribe()),
                query: self.options.route.as_ref().map(Route::query_receiver),
                parent: self.options.parent.clone(),
                load_more: load_more_rx,
                stop: self.stop.subscribe(),
                allowlist: self.options.filters.clone(),
                unique: self.unique.clone(),
                cursor: PaginationCursor::new(self.options.load_more),
                visible: None,
                output: output_tx,
                status: status_tx,
                generation: 0,
            };
            self.track(tokio::spawn(pipeline.run()));

            CollectionHandle {
                output,
                status,
                load_more,
            }
        })
    }

    /// The paginated collection. Starts the collection pipeline on first call.
    pub fn collection(&self) -> ResourceStream<Page<T>> {
        ResourceStream {
            receiver: self.collection_handle().output.clone(),
        }
    }

    /// The item selected by the route. Starts the item pipeline on first call.
    pub fn item(&self) -> ResourceStream<SingleItem<T>> {
        let receiver = self.item.get_or_init(|| {
            let (output_tx, output) = watch::channel(Snapshot::Pending);
            let pipeline = ItemPipeline {
                resource: self.resource.clone(),
                refresh: Some(self.resource.refresher().subscribe()),
                params: self.options.route.as_ref().map(Route::params_receiver),
                parent: self.options.parent.clone(),
                stop: self.stop.subscribe(),
                id_parameter: self.options.id_parameter.clone(),
                unique: self.unique.clone(),
                output: output_tx,
                generation: 0,
            };
            self.track(tokio::spawn(pipeline.run()));
            output
        });
        ResourceStream {
            receiver: receiver.clone(),
        }
    }

    /// Requests the next page in load-more mode.
    ///
    /// Ignored outside load-more mode, on the last page and while a fetch is
    /// in flight.
    pub fn load_more(&self) {
        if self.collection_handle().load_more.try_send(()).is_err() {
            debug!(resource = self.resource.name(), "Load-more request dropped");
        }
    }

    pub fn status(&self) -> watch::Receiver<PipelineStatus> {
        self.collection_handle().status.clone()
    }

    pub fn refresh(&self) {
        self.resource.refresh();
    }

    /// Stops both pipelines and waits for them to finish.
    pub async fn shutdown(self) {
        info!(resource = self.resource.name(), "Shutting down resource streams");
        self.stop.send_replace(true);
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(resource = self.resource.name(), error = %e, "Pipeline task failed");
            }
        }
    }
}

impl<T> Drop for ResourceStreams<T> {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}

// =============================================================================
// PIPELINES
// =============================================================================

/// Resolves when `receiver` changes; never resolves once its sender is gone.
async fn changed<V>(receiver: &mut Option<watch::Receiver<V>>) {
    match receiver {
        Some(inner) => {
            if inner.changed().await.is_ok() {
                return;
            }
            *receiver = None;
            pending::<()>().await
        }
        None => pending().await,
    }
}

async fn parent_changed(parent: &mut Option<ParentScope>) {
    match parent {
        Some(scope) => {
            if scope.ids_mut().changed().await.is_err() {
                pending::<()>().await;
            }
        }
        None => pending().await,
    }
}

async fn in_flight<V>(fetch: &mut Option<BoxFuture<'static, V>>) -> V {
    match fetch {
        Some(fetch) => fetch.await,
        None => pending().await,
    }
}

/// The parent scope prefix, `Some("")` without a parent, `None` while the
/// parent has no identifier yet.
fn resolve_scope(parent: &mut Option<ParentScope>) -> Option<String> {
    match parent {
        Some(scope) => scope.prefix(),
        None => Some(String::new()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Replace,
    Append,
}

type Fetch<V> = BoxFuture<'static, (u64, Result<V>)>;

struct CollectionPipeline<T> {
    resource: Resource<T>,
    refresh: Option<watch::Receiver<u64>>,
    query: Option<watch::Receiver<Params>>,
    parent: Option<ParentScope>,
    load_more: mpsc::Receiver<()>,
    stop: watch::Receiver<bool>,
    allowlist: Option<Vec<String>>,
    unique: KeyPath,
    cursor: PaginationCursor,
    visible: Option<Page<T>>,
    output: watch::Sender<Snapshot<Page<T>>>,
    status: watch::Sender<PipelineStatus>,
    generation: u64,
}

impl<T: ResourceModel> CollectionPipeline<T> {
    async fn run(mut self) {
        let name = self.resource.name().to_string();
        info!(resource = %name, "Collection pipeline started");

        let mut fetch: Option<Fetch<Page<T>>> = self.start(Trigger::Replace);
        let mut load_more_open = true;

        loop {
            tokio::select! {
                _ = self.stop.changed() => break,
                _ = changed(&mut self.refresh) => {
                    debug!(resource = %name, "Refresh triggered");
                    fetch = self.start(Trigger::Replace).or(fetch);
                }
                _ = changed(&mut self.query) => {
                    debug!(resource = %name, "Query parameters changed");
                    fetch = self.start(Trigger::Replace).or(fetch);
                }
                _ = parent_changed(&mut self.parent) => {
                    debug!(resource = %name, "Parent changed");
                    fetch = self.start(Trigger::Replace).or(fetch);
                }
                request = self.load_more.recv(), if load_more_open => {
                    if request.is_none() {
                        load_more_open = false;
                        continue;
                    }
                    if fetch.is_some() {
                        debug!(resource = %name, "Load-more ignored while fetching");
                        continue;
                    }
                    fetch = self.start(Trigger::Append);
                }
                (generation, result) = in_flight(&mut fetch) => {
                    fetch = None;
                    if generation == self.generation {
                        self.finish(result);
                    }
                }
            }
        }

        info!(resource = %name, "Collection pipeline stopped");
    }

    fn publish_status(&self, cycles: u64) {
        let state = self.cursor.state();
        self.status.send_if_modified(|status| {
            let next = PipelineStatus { state, cycles };
            if *status == next {
                return false;
            }
            *status = next;
            true
        });
    }

    fn cycles(&self) -> u64 {
        self.status.borrow().cycles
    }

    /// Starts a fetch for `trigger`, or returns `None` when nothing must be fetched.
    fn start(&mut self, trigger: Trigger) -> Option<Fetch<Page<T>>> {
        let Some(scope) = resolve_scope(&mut self.parent) else {
            debug!(resource = self.resource.name(), "Waiting for parent identifier");
            return None;
        };

        let page = match trigger {
            Trigger::Replace => self.cursor.begin_replace(),
            Trigger::Append => match self.cursor.begin_append() {
                Some(page) => Some(page),
                None => {
                    debug!(resource = self.resource.name(), "No further page to load");
                    return None;
                }
            },
        };
        self.publish_status(self.cycles());

        let query = self
            .query
            .as_mut()
            .map(|query| query.borrow_and_update().clone())
            .unwrap_or_default();
        // An empty allowlist forwards everything, like no allowlist.
        let allowlist = self.allowlist.as_ref().filter(|allowed| !allowed.is_empty());
        let mut filters: Map<String, Value> = query
            .into_iter()
            .filter(|(key, _)| allowlist.map_or(true, |allowed| allowed.iter().any(|a| a == key)))
            .map(|(key, value)| (key, Value::String(value)))
            .collect();
        if let Some(page) = page {
            filters.insert(PAGE_PARAMETER.to_string(), Value::from(page));
        }

        self.generation += 1;
        let generation = self.generation;
        debug!(
            resource = self.resource.name(),
            generation,
            ?page,
            ?trigger,
            "Fetching collection page"
        );

        self.resource.set_scope(&scope);
        let resource = self.resource.clone();
        Some(Box::pin(async move {
            (generation, resource.fetch_page(&scope, filters).await)
        }))
    }

    /// Applies a finished fetch. The status is published before the emission,
    /// so an observer of the emission always sees the matching status.
    fn finish(&mut self, result: Result<Page<T>>) {
        let cycles = self.cycles() + 1;
        let emission = self.settle(result);
        self.publish_status(cycles);
        if let Some(snapshot) = emission {
            self.output.send_replace(snapshot);
        }
    }

    fn settle(&mut self, result: Result<Page<T>>) -> Option<Snapshot<Page<T>>> {
        let name = self.resource.name();

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!(resource = name, error = %e, "Collection fetch failed");
                self.cursor.fail();
                return Some(Snapshot::Failed(e));
            }
        };

        let candidate = match self.cursor.complete(page.pagination) {
            Completion::Replace => page,
            Completion::Append => match &self.visible {
                Some(visible) => {
                    let mut items = visible.items.clone();
                    items.extend(page.items);
                    Page {
                        items,
                        pagination: page.pagination,
                        meta: page.meta,
                    }
                }
                None => page,
            },
            Completion::OutOfRange => {
                debug!(resource = name, "Page out of range, nothing appended");
                return None;
            }
        };

        let showing = matches!(*self.output.borrow(), Snapshot::Ready(_));
        if let Some(visible) = &self.visible {
            if merge_into(visible, &candidate, &self.unique) == DiffOutcome::Unchanged {
                if showing {
                    debug!(resource = name, "Page unchanged, emission suppressed");
                    return None;
                }
                return Some(Snapshot::Ready(visible.clone()));
            }
        }

        info!(resource = name, items = candidate.len(), "Emitting page");
        self.visible = Some(candidate.clone());
        Some(Snapshot::Ready(candidate))
    }
}

struct ItemPipeline<T> {
    resource: Resource<T>,
    refresh: Option<watch::Receiver<u64>>,
    params: Option<watch::Receiver<Params>>,
    parent: Option<ParentScope>,
    stop: watch::Receiver<bool>,
    id_parameter: String,
    unique: KeyPath,
    output: watch::Sender<Snapshot<SingleItem<T>>>,
    generation: u64,
}

impl<T: ResourceModel> ItemPipeline<T> {
    async fn run(mut self) {
        let name = self.resource.name().to_string();
        info!(resource = %name, "Item pipeline started");

        let mut fetch = self.start();

        loop {
            tokio::select! {
                _ = self.stop.changed() => break,
                _ = changed(&mut self.refresh) => {
                    fetch = self.start().or(fetch);
                }
                _ = changed(&mut self.params) => {
                    debug!(resource = %name, "Route parameters changed");
                    fetch = self.start().or(fetch);
                }
                _ = parent_changed(&mut self.parent) => {
                    fetch = self.start().or(fetch);
                }
                (generation, result) = in_flight(&mut fetch) => {
                    fetch = None;
                    if generation == self.generation {
                        self.finish(result);
                    }
                }
            }
        }

        info!(resource = %name, "Item pipeline stopped");
    }

    fn start(&mut self) -> Option<Fetch<(String, SingleItem<T>)>> {
        let scope = resolve_scope(&mut self.parent)?;
        let params = self
            .params
            .as_mut()
            .map(|params| params.borrow_and_update().clone())
            .unwrap_or_default();
        let Some(id) = params.get(&self.id_parameter).cloned() else {
            warn!(
                resource = self.resource.name(),
                parameter = %self.id_parameter,
                "Route parameter missing, item not fetched"
            );
            return None;
        };

        self.generation += 1;
        let generation = self.generation;
        debug!(resource = self.resource.name(), generation, %id, "Fetching item");

        self.resource.set_scope(&scope);
        let resource = self.resource.clone();
        Some(Box::pin(async move {
            let result = resource.fetch_single(&scope, &id).await;
            (generation, result.map(|item| (id, item)))
        }))
    }

    fn finish(&mut self, result: Result<(String, SingleItem<T>)>) {
        match result {
            Ok((id, item)) => {
                info!(resource = self.resource.name(), %id, "Emitting item");
                self.resource.publish_cached(id, item.clone(), &self.unique);
                self.output.send_replace(Snapshot::Ready(item));
            }
            Err(e) => {
                warn!(resource = self.resource.name(), error = %e, "Item fetch failed");
                self.output.send_replace(Snapshot::Failed(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use serde_json::json;

    #[tokio::test]
    async fn test_second_initialize_is_rejected() {
        let mock = MockTransport::new();
        let posts = Resource::<Value>::builder("posts").build(mock.transport());
        let _streams = posts.initialize(InitOptions::new()).unwrap();
        assert!(matches!(
            posts.initialize(InitOptions::new()),
            Err(ResourceError::AlreadyInitialized(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_unique_key_override_does_not_consume_initialization() {
        let mock = MockTransport::new();
        let posts = Resource::<Value>::builder("posts").build(mock.transport());
        assert!(matches!(
            posts.initialize(InitOptions::new().unique_key("a[")),
            Err(ResourceError::Configuration(_))
        ));
        assert!(posts.initialize(InitOptions::new()).is_ok());
    }

    #[tokio::test]
    async fn test_pipelines_are_lazy() {
        let mock = MockTransport::new();
        mock.expect_get("posts").return_ok(json!([{"id": 1}]));
        let posts = Resource::<Value>::builder("posts").build(mock.transport());
        let streams = posts.initialize(InitOptions::new()).unwrap();

        tokio::task::yield_now().await;
        assert!(mock.requests().is_empty());

        let mut collection = streams.collection();
        let page = collection.ready().await.unwrap();
        assert_eq!(page.values(), vec![json!({"id": 1})]);
        streams.shutdown().await;
        mock.verify();
    }

    #[tokio::test]
    async fn test_item_without_identifier_is_not_fetched() {
        let mock = MockTransport::new();
        let posts = Resource::<Value>::builder("posts").build(mock.transport());
        let streams = posts.initialize(InitOptions::new()).unwrap();

        let item = streams.item();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(item.latest().is_pending());
        assert!(mock.requests().is_empty());
        streams.shutdown().await;
    }

    #[tokio::test]
    async fn test_into_stream_yields_emissions() {
        use futures::StreamExt;

        let mock = MockTransport::new();
        mock.expect_get("posts").return_ok(json!([{"id": 1}]));
        let posts = Resource::<Value>::builder("posts").build(mock.transport());
        let streams = posts.initialize(InitOptions::new()).unwrap();

        let mut emissions = Box::pin(streams.collection().into_stream());
        let first = emissions.next().await.unwrap();
        assert_eq!(first.ready().map(Page::len), Some(1));
        streams.shutdown().await;
    }
}
