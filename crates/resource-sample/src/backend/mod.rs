//! # In-Memory Blog Backend
//!
//! A small REST server written as an actor. [`BackendActor`] owns every
//! collection and serves requests one at a time from its channel, so the
//! store needs no locking. [`BackendClient`] is the other half: it implements
//! [`Transport`](resource_stream::Transport), which lets the blog resources
//! talk to the actor exactly as they would talk to a remote API.
//!
//! ## Routes
//!
//! Collections are keyed by their full path, so nested collections such as
//! `posts/7/comments` are independent of `posts`.
//!
//! | Method | Path | Effect |
//! |--------|------|--------|
//! | GET | `{collection}` | Page of records; `page`, `per_page` and equality filters from the query |
//! | POST | `{collection}` | Create, assigning the next id |
//! | GET | `{collection}/{id}` | Find one record |
//! | PATCH / PUT | `{collection}/{id}` | Merge the body into the record |
//! | DELETE | `{collection}/{id}` | Remove the record |
//! | PATCH | `{collection}/{id}/toggle` | Flip a boolean field (`field` in the body, `active` by default) |
//!
//! Lists answer with the `data` + `meta.pagination` envelope; single records
//! with `{"data": record}`. Unknown records are `404`, an invalid bearer
//! token is `401`.
//!
//! ## Usage
//!
//! ```rust
//! use resource_sample::backend;
//! use resource_sample::lifecycle::default_config;
//! use resource_stream::{ApiRequest, Transport};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (actor, client) = backend::new(default_config().unwrap());
//!     let handle = tokio::spawn(actor.run());
//!
//!     client.seed("posts", vec![json!({"title": "Hello"})]).await.unwrap();
//!     let page = client.request(ApiRequest::get("posts")).await.unwrap();
//!     assert_eq!(page["data"][0]["id"], 1);
//!
//!     client.shutdown().await.unwrap();
//!     handle.await.unwrap();
//! }
//! ```

mod client;
mod message;

pub use client::*;
pub use message::*;

use resource_stream::config::ApiConfig;
use resource_stream::{HttpMethod, TransportError};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Page size used when a list request does not name one.
pub const DEFAULT_PER_PAGE: u64 = 10;

/// Field flipped by `toggle` when the body does not name one.
pub const DEFAULT_TOGGLE_FIELD: &str = "active";

const BUFFER_SIZE: usize = 32;

/// Creates the backend actor and its client.
pub fn new(config: ApiConfig) -> (BackendActor, BackendClient) {
    let (sender, receiver) = mpsc::channel(BUFFER_SIZE);
    let token = config.token.clone();
    let actor = BackendActor {
        receiver,
        collections: BTreeMap::new(),
        token,
    };
    (actor, BackendClient::new(sender, Arc::new(config)))
}

#[derive(Debug, Default)]
struct Collection {
    records: Vec<Value>,
    next_id: u64,
}

impl Collection {
    fn insert(&mut self, mut record: Map<String, Value>) -> Value {
        let id = match record.get("id").and_then(Value::as_u64) {
            Some(id) => id,
            None => {
                let id = self.next_id.max(1);
                record.insert("id".to_string(), json!(id));
                id
            }
        };
        self.next_id = self.next_id.max(id.saturating_add(1));
        let record = Value::Object(record);
        self.records.push(record.clone());
        record
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.get("id").is_some_and(|value| text(value) == id))
    }
}

/// What a request path points at.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Collection(String),
    Item(String, String),
    Toggle(String, String),
}

impl Target {
    fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let count = segments.len();
        if count == 0 {
            return None;
        }
        if count >= 3 && count % 2 == 1 && segments[count - 1] == "toggle" {
            return Some(Target::Toggle(
                segments[..count - 2].join("/"),
                segments[count - 2].to_string(),
            ));
        }
        if count % 2 == 1 {
            Some(Target::Collection(segments.join("/")))
        } else {
            Some(Target::Item(
                segments[..count - 1].join("/"),
                segments[count - 1].to_string(),
            ))
        }
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn not_found(what: impl std::fmt::Display) -> TransportError {
    TransportError::Status {
        status: 404,
        message: format!("{what} not found"),
    }
}

fn unprocessable(message: impl Into<String>) -> TransportError {
    TransportError::Status {
        status: 422,
        message: message.into(),
    }
}

/// The server half of the backend. Run it with [`BackendActor::run`].
pub struct BackendActor {
    receiver: mpsc::Receiver<BackendRequest>,
    collections: BTreeMap<String, Collection>,
    token: Option<String>,
}

impl BackendActor {
    /// Serves requests until a `Shutdown` arrives or every client is gone.
    pub async fn run(mut self) {
        info!("Backend started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                BackendRequest::Call { call, respond_to } => {
                    let _ = respond_to.send(self.handle(call));
                }
                BackendRequest::Seed {
                    collection,
                    records,
                    respond_to,
                } => {
                    let _ = respond_to.send(self.seed(&collection, records));
                }
                BackendRequest::Shutdown => {
                    info!("Backend received shutdown");
                    break;
                }
            }
        }

        info!(collections = self.collections.len(), "Backend stopped");
    }

    fn seed(&mut self, collection: &str, records: Vec<Value>) -> Result<usize, TransportError> {
        let store = self.collections.entry(collection.to_string()).or_default();
        let mut count = 0;
        for record in records {
            let Value::Object(record) = record else {
                return Err(unprocessable(format!("seed for {collection} is not an object")));
            };
            store.insert(record);
            count += 1;
        }
        info!(collection, count, size = store.records.len(), "Seeded");
        Ok(count)
    }

    fn authorize(&self, call: &BackendCall) -> Result<(), TransportError> {
        let Some(token) = &self.token else {
            return Ok(());
        };
        match call.header("Authorization") {
            Some(header) if header.strip_prefix("Bearer ") == Some(token.as_str()) => Ok(()),
            _ => Err(TransportError::Status {
                status: 401,
                message: "invalid bearer token".to_string(),
            }),
        }
    }

    fn handle(&mut self, mut call: BackendCall) -> Result<Value, TransportError> {
        let method = call.effective_method();
        let path = call.path.clone();
        debug!(%method, %path, query = ?call.query, "Call");

        let result = self
            .authorize(&call)
            .and_then(|()| self.dispatch(method, call));
        if let Err(e) = &result {
            warn!(%method, %path, error = %e, "Call failed");
        }
        result
    }

    fn dispatch(&mut self, method: HttpMethod, call: BackendCall) -> Result<Value, TransportError> {
        let target = Target::parse(&call.path).ok_or_else(|| not_found("root"))?;
        match (method, target) {
            (HttpMethod::Get, Target::Collection(key)) => Ok(self.list(&key, &call)),
            (HttpMethod::Post, Target::Collection(key)) => self.create(&key, call.body),
            (HttpMethod::Get, Target::Item(key, id)) => self.find(&key, &id),
            (HttpMethod::Patch | HttpMethod::Put, Target::Item(key, id)) => {
                self.patch(&key, &id, call.body)
            }
            (HttpMethod::Delete, Target::Item(key, id)) => self.delete(&key, &id),
            (HttpMethod::Patch | HttpMethod::Put | HttpMethod::Post, Target::Toggle(key, id)) => {
                self.toggle(&key, &id, &call.body)
            }
            (method, _) => Err(TransportError::Status {
                status: 405,
                message: format!("{method} is not allowed on {}", call.path),
            }),
        }
    }

    fn list(&self, key: &str, call: &BackendCall) -> Value {
        let page = call
            .query_value("page")
            .and_then(|page| page.parse::<u64>().ok())
            .unwrap_or(1)
            .max(1);
        let per_page = call
            .query_value("per_page")
            .and_then(|size| size.parse::<u64>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_PER_PAGE);
        let filters: Vec<&(String, String)> = call
            .query
            .iter()
            .filter(|(name, _)| name != "page" && name != "per_page")
            .collect();

        let records = self
            .collections
            .get(key)
            .map_or(&[][..], |store| store.records.as_slice());
        let matching: Vec<&Value> = records
            .iter()
            .filter(|record| {
                filters.iter().all(|(name, expected)| {
                    record.get(name).is_some_and(|value| text(value) == *expected)
                })
            })
            .collect();

        let total = matching.len() as u64;
        let offset = page.saturating_sub(1).saturating_mul(per_page);
        let data: Vec<Value> = matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(per_page).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        debug!(collection = key, page, per_page, total, returned = data.len(), "List");

        json!({
            "data": data,
            "meta": {
                "pagination": {"per_page": per_page, "current_page": page, "total": total}
            }
        })
    }

    fn create(&mut self, key: &str, body: Value) -> Result<Value, TransportError> {
        let Value::Object(mut record) = body else {
            return Err(unprocessable("body must be an object"));
        };
        record.remove("id");
        let store = self.collections.entry(key.to_string()).or_default();
        let record = store.insert(record);
        info!(collection = key, id = %record["id"], size = store.records.len(), "Created");
        Ok(json!({ "data": record }))
    }

    fn record_mut(&mut self, key: &str, id: &str) -> Result<&mut Value, TransportError> {
        let store = self
            .collections
            .get_mut(key)
            .ok_or_else(|| not_found(format!("{key}/{id}")))?;
        let index = store
            .position(id)
            .ok_or_else(|| not_found(format!("{key}/{id}")))?;
        Ok(&mut store.records[index])
    }

    fn find(&mut self, key: &str, id: &str) -> Result<Value, TransportError> {
        let record = self.record_mut(key, id)?;
        Ok(json!({ "data": record.clone() }))
    }

    fn patch(&mut self, key: &str, id: &str, body: Value) -> Result<Value, TransportError> {
        let Value::Object(changes) = body else {
            return Err(unprocessable("body must be an object"));
        };
        let record = self.record_mut(key, id)?;
        if let Value::Object(fields) = record {
            for (field, value) in changes {
                if field != "id" {
                    fields.insert(field, value);
                }
            }
        }
        info!(collection = key, id, "Updated");
        Ok(json!({ "data": record.clone() }))
    }

    fn delete(&mut self, key: &str, id: &str) -> Result<Value, TransportError> {
        let store = self
            .collections
            .get_mut(key)
            .ok_or_else(|| not_found(format!("{key}/{id}")))?;
        let index = store
            .position(id)
            .ok_or_else(|| not_found(format!("{key}/{id}")))?;
        let removed = store.records.remove(index);
        info!(collection = key, id, size = store.records.len(), "Deleted");
        Ok(json!({ "data": removed }))
    }

    fn toggle(&mut self, key: &str, id: &str, body: &Value) -> Result<Value, TransportError> {
        let field = body
            .get("field")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_TOGGLE_FIELD)
            .to_string();
        let record = self.record_mut(key, id)?;
        let flipped = !record.get(&field).and_then(Value::as_bool).unwrap_or(false);
        if let Value::Object(fields) = record {
            fields.insert(field.clone(), Value::Bool(flipped));
        }
        info!(collection = key, id, field = %field, value = flipped, "Toggled");
        Ok(json!({ "data": record.clone() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parsing() {
        assert_eq!(Target::parse("posts"), Some(Target::Collection("posts".into())));
        assert_eq!(
            Target::parse("posts/7"),
            Some(Target::Item("posts".into(), "7".into()))
        );
        assert_eq!(
            Target::parse("posts/7/comments"),
            Some(Target::Collection("posts/7/comments".into()))
        );
        assert_eq!(
            Target::parse("posts/7/toggle"),
            Some(Target::Toggle("posts".into(), "7".into()))
        );
        assert_eq!(Target::parse(""), None);
    }

    #[test]
    fn test_collection_assigns_increasing_ids() {
        let mut store = Collection::default();
        let first = store.insert(Map::new());
        let mut explicit = Map::new();
        explicit.insert("id".into(), json!(10));
        store.insert(explicit);
        let next = store.insert(Map::new());

        assert_eq!(first["id"], 1);
        assert_eq!(next["id"], 11);
        assert_eq!(store.position("10"), Some(1));
    }

    #[test]
    fn test_largest_explicit_id_does_not_overflow() {
        let mut store = Collection::default();
        let mut explicit = Map::new();
        explicit.insert("id".into(), json!(u64::MAX));
        store.insert(explicit);
        assert_eq!(store.next_id, u64::MAX);
    }
}
