//! # Blog Resources
//!
//! Factory functions describing the blog's REST resources. Each returns a
//! [`Resource`] bound to the given transport; streams are created later with
//! [`Resource::initialize`].
//!
//! | Resource | Endpoint | Notes |
//! |----------|----------|-------|
//! | [`post_resource`] | `posts` | `price` travels in cents, see [`price_in_cents`] |
//! | [`comment_resource`] | `posts/{id}/comments` | Initialized with the post resource as parent |

use crate::model::{Comment, Post};
use resource_stream::{Adapter, ConfigurationError, Resource, Transport};
use serde_json::{json, Value};
use std::sync::Arc;

/// Adapter for a money field stored as integer cents on the wire.
///
/// Values that are not numbers pass through untouched.
pub fn price_in_cents() -> Adapter {
    Adapter::new()
        .up(|value, _, _| match value.as_f64() {
            Some(units) => json!((units * 100.0).round() as i64),
            None => value.clone(),
        })
        .down(|value, _| match value.as_f64() {
            Some(cents) => json!(cents / 100.0),
            None => value.clone(),
        })
}

pub fn post_resource(transport: Arc<dyn Transport>) -> Result<Resource<Post>, ConfigurationError> {
    Ok(Resource::<Post>::builder("posts")
        .adapter("price", price_in_cents())?
        .unique_key("id")?
        .build(transport))
}

/// Published posts only, for read-only listings.
pub fn published_post_resource(
    transport: Arc<dyn Transport>,
) -> Result<Resource<Post>, ConfigurationError> {
    Ok(Resource::<Post>::builder("posts")
        .filter_by("published", Value::Bool(true))
        .adapter("price", price_in_cents())?
        .build(transport))
}

pub fn comment_resource(transport: Arc<dyn Transport>) -> Resource<Comment> {
    Resource::<Comment>::builder("comments").build(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use resource_stream::adapter::{AdapterRegistry, CrudMethod};
    use resource_stream::mock::MockTransport;

    #[test]
    fn test_price_round_trip() {
        let mut adapters = AdapterRegistry::default();
        adapters.register("price", price_in_cents()).unwrap();

        let mut body = json!({"price": 12.5});
        adapters.apply_up(&mut body, CrudMethod::Create);
        assert_eq!(body, json!({"price": 1250}));

        adapters.apply_down(&mut body);
        assert_eq!(body, json!({"price": 12.5}));
    }

    #[tokio::test]
    async fn test_post_prices_are_decoded_from_cents() {
        let mock = MockTransport::new();
        mock.expect_get("posts/3").return_ok(json!({
            "data": {"id": 3, "title": "Pricing", "price": 1999, "published": true}
        }));
        let posts = post_resource(mock.transport()).unwrap();

        let post = posts.fetch_item(3).await.unwrap().data;
        assert_eq!(post.price, 19.99);
        assert!(post.published);
        mock.verify();
    }

    #[tokio::test]
    async fn test_published_filter_is_sent() {
        let mock = MockTransport::new();
        mock.expect_get("posts")
            .with_body(json!({"published": true}))
            .return_ok(json!({"data": []}));
        let posts = published_post_resource(mock.transport()).unwrap();

        assert!(posts.fetch_collection(Default::default()).await.unwrap().is_empty());
        mock.verify();
    }
}
