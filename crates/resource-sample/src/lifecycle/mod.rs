//! # Blog System Lifecycle
//!
//! [`BlogSystem`] is the conductor of the sample: it starts the backend
//! actor, builds the resources on top of its client, seeds demo data and
//! shuts everything down again.
//!
//! ## Startup
//!
//! ```rust
//! use resource_sample::lifecycle::{default_config, BlogSystem};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let system = BlogSystem::new(default_config()?)?;
//!     system.seed().await?;
//!
//!     let first = system.posts.fetch_item(1).await?;
//!     assert_eq!(first.data.title, "Post 1");
//!
//!     system.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Shutdown
//!
//! Resources hand clones of the backend client to every stream they start,
//! so dropping the system's own handles is not enough to close the
//! backend's channel. [`BlogSystem::shutdown`] sends an explicit `Shutdown`
//! message instead and then awaits the actor task. Streams still running at
//! that point see `TransportError::Closed` on their next fetch.
//!
//! ## Configuration
//!
//! The API configuration is JSON (see [`resource_stream::config`]). The demo
//! binary reads it from the file named by `BLOG_API_CONFIG` and falls back
//! to [`DEFAULT_API_CONFIG`], a single in-memory server with a bearer token.

use crate::backend::{self, BackendClient};
use crate::error::BlogError;
use crate::model::{Comment, Post};
use crate::resources::{comment_resource, post_resource};
use resource_stream::config::ApiConfig;
use resource_stream::{Resource, Transport};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Environment variable naming an API configuration file.
pub const CONFIG_ENV: &str = "BLOG_API_CONFIG";

pub const DEFAULT_API_CONFIG: &str = r#"{
    "servers": {
        "memory": {
            "base_url": "memory://blog/",
            "versions": {"v1": "api/v1/"},
            "default_version": "v1"
        }
    },
    "default_server": "memory",
    "token": "demo-token"
}"#;

/// Posts created by [`BlogSystem::seed`].
pub const SEEDED_POSTS: u64 = 25;

/// Posts that receive seeded comments (`1..=COMMENTED_POSTS`).
pub const COMMENTED_POSTS: u64 = 3;

pub fn default_config() -> Result<ApiConfig, BlogError> {
    Ok(ApiConfig::from_json_str(DEFAULT_API_CONFIG)?)
}

/// Reads the configuration named by [`CONFIG_ENV`], or the default one.
pub fn load_config() -> Result<ApiConfig, BlogError> {
    let Ok(path) = std::env::var(CONFIG_ENV) else {
        return default_config();
    };
    let raw = std::fs::read_to_string(&path).map_err(|e| BlogError::ConfigFile {
        path: path.clone(),
        message: e.to_string(),
    })?;
    info!(%path, "Loaded API configuration");
    Ok(ApiConfig::from_json_str(&raw)?)
}

/// The running sample: backend actor plus the resources bound to it.
pub struct BlogSystem {
    pub posts: Resource<Post>,
    pub comments: Resource<Comment>,
    backend: BackendClient,
    handle: JoinHandle<()>,
}

impl BlogSystem {
    /// Spawns the backend and builds the resources. Must run inside a Tokio runtime.
    pub fn new(config: ApiConfig) -> Result<Self, BlogError> {
        let (actor, backend) = backend::new(config);
        let transport: Arc<dyn Transport> = Arc::new(backend.clone());
        let posts = post_resource(transport.clone())?;
        let comments = comment_resource(transport);
        let handle = tokio::spawn(actor.run());

        info!("Blog system started");
        Ok(Self {
            posts,
            comments,
            backend,
            handle,
        })
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    /// Loads demo data in wire format (prices in cents).
    pub async fn seed(&self) -> Result<(), BlogError> {
        let posts: Vec<Value> = (1..=SEEDED_POSTS)
            .map(|n| {
                json!({
                    "id": n,
                    "title": format!("Post {n}"),
                    "price": n * 150,
                    "published": n % 2 == 0,
                })
            })
            .collect();
        self.backend.seed("posts", posts).await?;

        for post_id in 1..=COMMENTED_POSTS {
            let comments: Vec<Value> = (1..=post_id)
                .map(|n| {
                    json!({"body": format!("Comment {n} on post {post_id}"), "post_id": post_id})
                })
                .collect();
            self.backend
                .seed(&format!("posts/{post_id}/comments"), comments)
                .await?;
        }

        info!(posts = SEEDED_POSTS, "Seeded demo data");
        Ok(())
    }

    /// Stops the backend and waits for it to finish.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if the backend stopped cleanly
    /// - `Err(String)` if its task failed or panicked
    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down blog system...");

        if let Err(e) = self.backend.shutdown().await {
            // Already gone; the task result below tells us how.
            error!(error = %e, "Backend did not accept shutdown");
        }
        drop(self.posts);
        drop(self.comments);

        if let Err(e) = self.handle.await {
            error!("Backend task failed: {:?}", e);
            return Err(format!("Backend task failed: {:?}", e));
        }

        info!("Blog system shutdown complete.");
        Ok(())
    }
}
