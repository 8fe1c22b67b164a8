//! # Observability & Tracing
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter whose
//! level is taken from `RUST_LOG`.
//!
//! ## What Gets Traced
//!
//! - **Pipeline lifecycle** (`info`): start, stop, every emitted page or item
//! - **Requests** (`debug`): path, body, generation and page of every fetch
//! - **Suppressed emissions** (`debug`): pages the diff found unchanged
//! - **Anomalies** (`warn`): failed fetches, unrecognised envelopes,
//!   missing route parameters, unknown servers or versions
//! - **Adapter skips** (`trace`): fields absent from a payload
//!
//! Resource operations (`fetch_collection`, `create`, `update`, ...) run inside
//! a span carrying the resource name, so nested logs stay attributable.
//!
//! ```bash
//! RUST_LOG=info cargo run -p resource-sample
//! RUST_LOG=resource_stream=debug cargo run -p resource-sample
//! ```
//!
//! With `RUST_LOG=debug` a load-more cycle reads:
//!
//! ```text
//! DEBUG Fetching collection page resource="posts" generation=2 page=Some(2) trigger=Append
//! DEBUG Fetching collection path=posts body={"page":2}
//! INFO Emitting page resource="posts" items=20
//! ```
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
