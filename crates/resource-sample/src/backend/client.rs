//! # Backend Client
//!
//! The [`Transport`] the blog resources talk through. Each request is
//! resolved against the [`ApiConfig`] (server, version, prefix, bearer token,
//! method override), reduced to a path below the server root and sent to the
//! backend actor, which answers over a one-shot channel.

use super::message::{BackendCall, BackendRequest};
use async_trait::async_trait;
use resource_stream::config::{ApiConfig, Endpoint};
use resource_stream::{ApiRequest, Transport, TransportError};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument};

/// Cloneable handle to a running [`BackendActor`](super::BackendActor).
#[derive(Clone)]
pub struct BackendClient {
    sender: mpsc::Sender<BackendRequest>,
    config: Arc<ApiConfig>,
}

impl BackendClient {
    pub fn new(sender: mpsc::Sender<BackendRequest>, config: Arc<ApiConfig>) -> Self {
        Self { sender, config }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// A client for the same backend that resolves requests with `config`.
    pub fn with_config(&self, config: ApiConfig) -> Self {
        Self::new(self.sender.clone(), Arc::new(config))
    }

    /// Inserts wire-format records into `collection` directly.
    #[instrument(skip(self, records), fields(count = records.len()))]
    pub async fn seed(
        &self,
        collection: &str,
        records: Vec<Value>,
    ) -> Result<usize, TransportError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(BackendRequest::Seed {
                collection: collection.to_string(),
                records,
                respond_to,
            })
            .await
            .map_err(|_| TransportError::Closed)?;
        response.await.map_err(|_| TransportError::Closed)?
    }

    /// Asks the actor to stop once the requests queued before this one are served.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        self.sender
            .send(BackendRequest::Shutdown)
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn to_call(&self, endpoint: Endpoint) -> Result<BackendCall, TransportError> {
        let server = self.config.servers.get(&endpoint.server).ok_or_else(|| {
            TransportError::Unreachable(format!("server `{}` is not configured", endpoint.server))
        })?;
        let version_path = server
            .versions
            .get(&endpoint.version)
            .map_or("", String::as_str);
        let root = format!("{}{version_path}", server.base_url);

        let mut path = endpoint.url.strip_prefix(&root).ok_or_else(|| {
            TransportError::Unreachable(format!("`{}` is outside `{root}`", endpoint.url))
        })?;
        if let Some(prefix) = self.config.prefix.as_deref() {
            let prefix = format!("{}/", prefix.trim_end_matches('/'));
            if prefix != "/" {
                path = path.strip_prefix(prefix.as_str()).unwrap_or(path);
            }
        }

        Ok(BackendCall {
            method: endpoint.method,
            path: path.to_string(),
            headers: endpoint.headers,
            query: endpoint.query,
            body: endpoint.body,
        })
    }
}

#[async_trait]
impl Transport for BackendClient {
    async fn request(&self, request: ApiRequest) -> Result<Value, TransportError> {
        let endpoint = self
            .config
            .resolve(&request)
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;
        debug!(method = %endpoint.method, url = %endpoint.url, "Sending request");
        let call = self.to_call(endpoint)?;

        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(BackendRequest::Call { call, respond_to })
            .await
            .map_err(|_| TransportError::Closed)?;
        response.await.map_err(|_| TransportError::Closed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resource_stream::HttpMethod;
    use serde_json::json;

    fn config(prefix: Option<&str>, method_override: bool) -> Arc<ApiConfig> {
        let mut config = ApiConfig::from_json_str(
            r#"{
                "servers": {
                    "memory": {
                        "base_url": "memory://blog/",
                        "versions": {"v1": "api/v1/"},
                        "default_version": "v1"
                    }
                },
                "default_server": "memory",
                "token": "secret"
            }"#,
        )
        .unwrap();
        config.prefix = prefix.map(str::to_string);
        config.method_override = method_override;
        Arc::new(config)
    }

    #[tokio::test]
    async fn test_request_is_resolved_before_sending() {
        let (sender, mut receiver) = mpsc::channel(4);
        let client = BackendClient::new(sender, config(Some("admin"), true));

        let request = ApiRequest::new(HttpMethod::Patch, "comments/3")
            .with_prefix("posts/7/")
            .with_body(json!({"body": "edited"}));
        let call = tokio::spawn(async move { client.request(request).await });

        let Some(BackendRequest::Call { call: sent, respond_to }) = receiver.recv().await else {
            panic!("expected a call");
        };
        assert_eq!(sent.method, HttpMethod::Post);
        assert_eq!(sent.path, "posts/7/comments/3");
        assert_eq!(sent.body, json!({"body": "edited", "_method": "PATCH"}));
        assert_eq!(sent.header("Authorization"), Some("Bearer secret"));
        respond_to.send(Ok(json!({"data": {}}))).unwrap();

        assert_eq!(call.await.unwrap(), Ok(json!({"data": {}})));
    }

    #[tokio::test]
    async fn test_closed_backend_is_reported() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let client = BackendClient::new(sender, config(None, false));

        let result = client.request(ApiRequest::get("posts")).await;
        assert_eq!(result, Err(TransportError::Closed));
    }
}
