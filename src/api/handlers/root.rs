//! Undocumented root route: service identity for humans and probes.

use axum::response::{IntoResponse, Json};
use serde_json::json;

use crate::GIT_COMMIT_HASH;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "commit": GIT_COMMIT_HASH,
    }))
}
