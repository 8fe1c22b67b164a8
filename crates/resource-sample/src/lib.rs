//! # Resource Stream Blog Sample
//!
//! A blog client built on `resource-stream`, talking to an in-memory REST
//! backend that runs as an actor. This library exposes the modules of the
//! demo binary for integration testing.
//!
//! - **[backend]**: The actor serving `posts` and nested `comments`, and the
//!   [`BackendClient`](backend::BackendClient) transport.
//! - **[model]**: [`Post`](model::Post) and [`Comment`](model::Comment).
//! - **[resources]**: How each resource is configured (adapters, filters).
//! - **[lifecycle]**: [`BlogSystem`](lifecycle::BlogSystem), startup and shutdown.

pub mod backend;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod resources;
