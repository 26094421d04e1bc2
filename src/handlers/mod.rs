use axum::{
    http::{StatusCode, Uri},
    Json,
};

use crate::{errors::RequestErrorJson, JsonResponse};

mod auth;
mod categories;
mod comments;
mod posts;

pub use auth::*;
pub use categories::*;
pub use comments::*;
pub use posts::*;

// ----------------- Helper Handlers -----------------
pub async fn root() -> &'static str {
    "API is running..."
}

pub async fn alive() -> &'static str {
    "alive"
}

pub async fn not_found(uri: Uri) -> JsonResponse<RequestErrorJson> {
    tracing::debug!(%uri, "no route matched");
    (
        StatusCode::NOT_FOUND,
        Json(RequestErrorJson::new(format!(
            "URL {} provided was not found",
            uri
        ))),
    )
}
