//! # API Configuration
//!
//! Server registry used by transports to turn an [`ApiRequest`] into a
//! concrete [`Endpoint`]. Loaded from JSON:
//!
//! ```json
//! {
//!   "servers": {
//!     "main": {
//!       "base_url": "https://api.example.com/",
//!       "versions": { "v1": "v1/", "v2": "v2/" },
//!       "default_version": "v1"
//!     }
//!   },
//!   "default_server": "main",
//!   "prefix": "admin",
//!   "token": "secret",
//!   "method_override": false
//! }
//! ```
//!
//! Unknown servers and versions are not errors: the request falls back to
//! the default server (or the server's default version) with a warning.

use crate::error::ConfigurationError;
use crate::transport::{ApiRequest, HttpMethod};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Form field carrying the real method when method override is enabled.
pub const METHOD_OVERRIDE_FIELD: &str = "_method";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub base_url: String,
    /// Version name to URL path segment, e.g. `"v1" -> "v1/"`.
    pub versions: BTreeMap<String, String>,
    pub default_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub servers: BTreeMap<String, ServerConfig>,
    pub default_server: String,
    /// Global path prefix placed before every resource prefix.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,
    /// Tunnel PATCH, PUT and DELETE through POST with a `_method` field.
    #[serde(default)]
    pub method_override: bool,
}

/// A request resolved against an [`ApiConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub server: String,
    pub version: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Flattened query parameters (GET only).
    pub query: Vec<(String, String)>,
    /// Request payload (`Value::Null` for GET).
    pub body: Value,
}

impl ApiConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| ConfigurationError::InvalidApiConfig(e.to_string()))?;
        if !config.servers.contains_key(&config.default_server) {
            return Err(ConfigurationError::UnknownServer(config.default_server));
        }
        Ok(config)
    }

    fn server(&self, requested: Option<&str>) -> Result<(&str, &ServerConfig), ConfigurationError> {
        if let Some(name) = requested {
            if let Some((name, server)) = self.servers.get_key_value(name) {
                return Ok((name, server));
            }
            warn!(
                server = name,
                fallback = %self.default_server,
                "Server is not configured, using the default server"
            );
        }
        self.servers
            .get_key_value(&self.default_server)
            .map(|(name, server)| (name.as_str(), server))
            .ok_or_else(|| ConfigurationError::UnknownServer(self.default_server.clone()))
    }

    /// Resolves `request` into a full URL, headers and encoded payload.
    pub fn resolve(&self, request: &ApiRequest) -> Result<Endpoint, ConfigurationError> {
        let (server_name, server) = self.server(request.server.as_deref())?;

        let version = match request.version.as_deref() {
            Some(version) if server.versions.contains_key(version) => version,
            Some(version) => {
                warn!(
                    server = server_name,
                    version,
                    fallback = %server.default_version,
                    "Api version is not configured, using the default version"
                );
                server.default_version.as_str()
            }
            None => server.default_version.as_str(),
        };
        let version_path = server.versions.get(version).map_or("", String::as_str);

        let prefix = match self.prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => format!("{}/", prefix.trim_end_matches('/')),
            _ => String::new(),
        };
        let url = format!(
            "{}{}{}{}{}",
            server.base_url, version_path, prefix, request.path_prefix, request.path
        );

        let mut headers = Vec::new();
        if let Some(token) = &self.token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }

        let tunnelled = self.method_override
            && matches!(
                request.method,
                HttpMethod::Patch | HttpMethod::Put | HttpMethod::Delete
            );

        let (method, query, body) = if tunnelled {
            let mut body = match &request.body {
                Value::Object(fields) => fields.clone(),
                Value::Null => Map::new(),
                other => {
                    let mut fields = Map::new();
                    fields.insert("data".to_string(), other.clone());
                    fields
                }
            };
            body.insert(
                METHOD_OVERRIDE_FIELD.to_string(),
                Value::String(request.method.to_string()),
            );
            (HttpMethod::Post, Vec::new(), Value::Object(body))
        } else if request.method == HttpMethod::Get {
            (HttpMethod::Get, flatten_body(&request.body), Value::Null)
        } else {
            (request.method, Vec::new(), request.body.clone())
        };

        debug!(%method, %url, "Resolved endpoint");
        Ok(Endpoint {
            method,
            server: server_name.to_string(),
            version: version.to_string(),
            url,
            headers,
            query,
            body,
        })
    }
}

/// Flattens a nested body into bracket-keyed pairs: `{"a": {"b": [1]}}`
/// becomes `[("a[b][0]", "1")]`. Nulls become empty strings.
pub fn flatten_body(body: &Value) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    match body {
        Value::Object(fields) => {
            for (key, value) in fields {
                flatten_into(key.clone(), value, &mut pairs);
            }
        }
        Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                flatten_into(index.to_string(), value, &mut pairs);
            }
        }
        Value::Null => {}
        scalar => pairs.push((String::new(), scalar_text(scalar))),
    }
    pairs
}

fn flatten_into(key: String, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Object(fields) => {
            for (child, nested) in fields {
                flatten_into(format!("{key}[{child}]"), nested, pairs);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten_into(format!("{key}[{index}]"), nested, pairs);
            }
        }
        scalar => pairs.push((key, scalar_text(scalar))),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> ApiConfig {
        ApiConfig::from_json_str(
            r#"{
                "servers": {
                    "main": {
                        "base_url": "https://api.test/",
                        "versions": {"v1": "v1/", "v2": "v2/"},
                        "default_version": "v1"
                    },
                    "files": {
                        "base_url": "https://files.test/",
                        "versions": {"v1": ""},
                        "default_version": "v1"
                    }
                },
                "default_server": "main",
                "prefix": "admin",
                "token": "t0k"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_builds_url_and_headers() {
        let request = ApiRequest::get("comments")
            .with_prefix("posts/7/")
            .with_body(json!({"page": 2, "filter": {"tags": ["a", "b"]}}));
        let endpoint = config().resolve(&request).unwrap();

        assert_eq!(endpoint.url, "https://api.test/v1/admin/posts/7/comments");
        assert_eq!(
            endpoint.headers,
            vec![("Authorization".to_string(), "Bearer t0k".to_string())]
        );
        assert_eq!(
            endpoint.query,
            vec![
                ("filter[tags][0]".to_string(), "a".to_string()),
                ("filter[tags][1]".to_string(), "b".to_string()),
                ("page".to_string(), "2".to_string()),
            ]
        );
        assert_eq!(endpoint.body, Value::Null);
    }

    #[test]
    fn test_unknown_server_and_version_fall_back() {
        let mut request = ApiRequest::get("posts");
        request.server = Some("nowhere".to_string());
        request.version = Some("v9".to_string());
        let endpoint = config().resolve(&request).unwrap();
        assert_eq!(endpoint.server, "main");
        assert_eq!(endpoint.version, "v1");

        request.server = Some("files".to_string());
        request.version = None;
        assert_eq!(
            config().resolve(&request).unwrap().url,
            "https://files.test/admin/posts"
        );
    }

    #[test]
    fn test_method_override_tunnels_through_post() {
        let mut config = config();
        config.method_override = true;
        let request =
            ApiRequest::new(HttpMethod::Delete, "posts/3").with_body(json!({"force": true}));
        let endpoint = config.resolve(&request).unwrap();
        assert_eq!(endpoint.method, HttpMethod::Post);
        assert_eq!(endpoint.body, json!({"force": true, "_method": "DELETE"}));

        let create = ApiRequest::new(HttpMethod::Post, "posts").with_body(json!({"a": 1}));
        assert_eq!(config.resolve(&create).unwrap().body, json!({"a": 1}));
    }

    #[test]
    fn test_rejects_missing_default_server() {
        let raw = r#"{"servers": {}, "default_server": "main"}"#;
        assert_eq!(
            ApiConfig::from_json_str(raw),
            Err(ConfigurationError::UnknownServer("main".to_string()))
        );
        assert!(matches!(
            ApiConfig::from_json_str("{"),
            Err(ConfigurationError::InvalidApiConfig(_))
        ));
    }

    #[test]
    fn test_flatten_null_and_scalars() {
        assert_eq!(
            flatten_body(&json!({"q": null, "on": true})),
            vec![
                ("on".to_string(), "true".to_string()),
                ("q".to_string(), String::new()),
            ]
        );
    }
}
