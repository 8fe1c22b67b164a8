//! # Resource Stream
//!
//! A reactive data-access layer for REST collections. You describe a
//! resource once (endpoint name, filters, field adapters, pagination mode,
//! parent/child nesting) and get back live streams of pages and items that
//! follow navigation state and refresh signals. Consumers only subscribe.
//!
//! ## Architecture Overview
//!
//! ```text
//!  refresher / route / parent / load_more
//!                  │
//!                  ▼
//!       ┌─────────────────────┐   ApiRequest   ┌───────────┐
//!       │  pipeline task      │ ─────────────▶ │ Transport │
//!       │  (one per stream)   │ ◀───────────── │           │
//!       └─────────────────────┘   JSON payload └───────────┘
//!                  │
//!   envelope → adapters (down) → decode → transform
//!                  │
//!   pagination cursor → load-more accumulation → smart diff
//!                  │
//!                  ▼
//!        ResourceStream<Page<T>> / ResourceStream<SingleItem<T>>
//! ```
//!
//! | Layer | Module | Role |
//! |-------|--------|------|
//! | Description | [`resource`] | Builder, CRUD operations, refresher, parent scope |
//! | Streams | [`stream`] | `initialize`, the collection and item pipelines |
//! | Shaping | [`envelope`], [`adapter`], [`pagination`], [`diff`] | Payload normalisation, field transforms, paging, emission suppression |
//! | Plumbing | [`key_path`], [`model`], [`navigation`], [`transport`], [`config`] | Paths, data types, route state, the network seam |
//!
//! ## Quick Start
//!
//! ```rust
//! use resource_stream::mock::MockTransport;
//! use resource_stream::navigation::route;
//! use resource_stream::{InitOptions, Resource};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockTransport::new();
//!     mock.expect_get("posts").return_ok(json!({
//!         "data": [{"id": 1, "title": "Hello"}],
//!         "meta": {"pagination": {"per_page": 10, "current_page": 1, "total": 1}}
//!     }));
//!
//!     let posts = Resource::<Value>::builder("posts").build(mock.transport());
//!     let (_controller, route) = route();
//!     let streams = posts.initialize(InitOptions::new().route(route)).unwrap();
//!
//!     let page = streams.collection().ready().await.unwrap();
//!     assert_eq!(page.values()[0]["title"], "Hello");
//!
//!     streams.shutdown().await;
//!     mock.verify();
//! }
//! ```
//!
//! ## Concurrency Model
//!
//! - Each stream is produced by one Tokio task that handles its triggers sequentially
//! - Pipeline state (cursor, visible page) is owned by its task, never shared
//! - Only the newest request of a pipeline can reach its stream
//! - Streams are `watch` channels: late subscribers see the latest snapshot
//!
//! ## Testing
//!
//! [`mock::MockTransport`] scripts server responses with an expectation
//! queue; [`mock::create_mock_transport`] hands each request to the test.
//! See the [`mock`] module for patterns.

pub mod adapter;
pub mod config;
pub mod diff;
pub mod envelope;
pub mod error;
pub mod key_path;
pub mod mock;
pub mod model;
pub mod navigation;
pub mod pagination;
pub mod resource;
pub mod stream;
pub mod tracing;
pub mod transport;

// Re-export core types for convenience
pub use adapter::{Adapter, CrudMethod};
pub use error::{ConfigurationError, ResourceError, TransportError};
pub use key_path::KeyPath;
pub use model::{Page, ResourceModel, SharedItem, SingleItem, Snapshot};
pub use pagination::PageMeta;
pub use resource::{Refresher, Resource, Supervised};
pub use stream::{InitOptions, PipelineStatus, ResourceStream, ResourceStreams};
pub use transport::{ApiRequest, HttpMethod, Transport};
