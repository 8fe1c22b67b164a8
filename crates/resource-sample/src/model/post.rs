use serde::{Deserialize, Serialize};

/// A blog post as the application sees it.
///
/// The backend stores `price` in cents; the post resource's adapter converts
/// it to currency units on the way in and back to cents on the way out, so
/// this struct never sees the wire representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub title: String,
    pub price: f64,
    #[serde(default)]
    pub published: bool,
}

/// Payload for creating a new post.
#[derive(Debug, Clone, Serialize)]
pub struct PostCreate {
    pub title: String,
    pub price: f64,
    pub published: bool,
}

/// Partial update of a post. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PostUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}
