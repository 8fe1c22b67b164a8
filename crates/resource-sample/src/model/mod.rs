//! # Domain Models
//!
//! Plain data types decoded from backend payloads. They carry no behaviour:
//! everything about fetching them lives in [`crate::resources`].

mod comment;
mod post;

pub use comment::*;
pub use post::*;
