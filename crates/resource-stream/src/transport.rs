//! # Transport
//!
//! The seam between resources and the network. A resource never builds URLs
//! or headers itself: it describes the call as an [`ApiRequest`] and hands it
//! to a [`Transport`]. Real transports resolve the request against an
//! [`ApiConfig`](crate::config::ApiConfig); tests use
//! [`MockTransport`](crate::mock::MockTransport).

use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        })
    }
}

/// One call to the API, before endpoint resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    /// Server name; `None` uses the configured default.
    pub server: Option<String>,
    /// API version name; `None` uses the server's default.
    pub version: Option<String>,
    /// Resource prefix followed by the parent scope, e.g. `admin/posts/7/`.
    pub path_prefix: String,
    /// Resource name, optionally followed by `/{id}` and an action segment.
    pub path: String,
    /// Query parameters for GET, payload otherwise.
    pub body: Value,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            server: None,
            version: None,
            path_prefix: String::new(),
            path: path.into(),
            body: Value::Object(Map::new()),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_prefix(mut self, path_prefix: impl Into<String>) -> Self {
        self.path_prefix = path_prefix.into();
        self
    }

    /// Prefix and path joined, without server or version.
    pub fn full_path(&self) -> String {
        format!("{}{}", self.path_prefix, self.path)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: ApiRequest) -> Result<Value, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn request(&self, request: ApiRequest) -> Result<Value, TransportError> {
        (**self).request(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_path_joins_prefix() {
        let request = ApiRequest::get("comments").with_prefix("posts/7/");
        assert_eq!(request.full_path(), "posts/7/comments");
        assert_eq!(request.body, json!({}));
    }

    #[test]
    fn test_method_wire_names() {
        assert_eq!(serde_json::to_value(HttpMethod::Patch).unwrap(), json!("PATCH"));
        assert_eq!(HttpMethod::Delete.to_string(), "DELETE");
    }
}
