use serde::{Deserialize, Serialize};

/// A comment, always fetched through its post (`posts/{id}/comments`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub body: String,
    pub post_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentCreate {
    pub body: String,
    pub post_id: u64,
}
