//! # Backend Messages
//!
//! Requests the [`BackendClient`](super::BackendClient) sends to the
//! [`BackendActor`](super::BackendActor). An API call arrives already resolved
//! against the [`ApiConfig`](resource_stream::config::ApiConfig): the path is
//! relative to the server root and GET parameters are flattened query pairs.

use resource_stream::config::METHOD_OVERRIDE_FIELD;
use resource_stream::{HttpMethod, TransportError};
use serde_json::Value;
use tokio::sync::oneshot;

/// One-shot response channel used by the backend.
pub type Response<T> = oneshot::Sender<Result<T, TransportError>>;

/// A resolved REST call.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendCall {
    pub method: HttpMethod,
    /// Path below the server root, e.g. `posts/7/comments`.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Value,
}

impl BackendCall {
    /// The method the caller meant, honouring a tunnelled `_method` field.
    ///
    /// The override field is removed from the body.
    pub fn effective_method(&mut self) -> HttpMethod {
        if self.method != HttpMethod::Post {
            return self.method;
        }
        let Value::Object(fields) = &mut self.body else {
            return self.method;
        };
        match fields.remove(METHOD_OVERRIDE_FIELD) {
            Some(tunnelled) => serde_json::from_value(tunnelled).unwrap_or(self.method),
            None => self.method,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug)]
pub enum BackendRequest {
    Call {
        call: BackendCall,
        respond_to: Response<Value>,
    },
    /// Inserts raw records into a collection, bypassing the API.
    Seed {
        collection: String,
        records: Vec<Value>,
        respond_to: Response<usize>,
    },
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(method: HttpMethod, body: Value) -> BackendCall {
        BackendCall {
            method,
            path: "posts/1".to_string(),
            headers: vec![("Authorization".to_string(), "Bearer t".to_string())],
            query: vec![("page".to_string(), "2".to_string())],
            body,
        }
    }

    #[test]
    fn test_tunnelled_method_is_unwrapped() {
        let mut tunnelled = call(HttpMethod::Post, json!({"_method": "PATCH", "title": "x"}));
        assert_eq!(tunnelled.effective_method(), HttpMethod::Patch);
        assert_eq!(tunnelled.body, json!({"title": "x"}));

        let mut plain = call(HttpMethod::Delete, json!({"_method": "PATCH"}));
        assert_eq!(plain.effective_method(), HttpMethod::Delete);
    }

    #[test]
    fn test_header_and_query_lookup() {
        let call = call(HttpMethod::Get, Value::Null);
        assert_eq!(call.header("authorization"), Some("Bearer t"));
        assert_eq!(call.query_value("page"), Some("2"));
        assert_eq!(call.query_value("per_page"), None);
    }
}
