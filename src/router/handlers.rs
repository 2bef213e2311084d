use super::INTERNAL_ERROR_MESSAGE;
use super::service::RouterService;
use crate::protocol::{ENDPOINT_OPERATIONS, StandardResult};

use axum::{Json, Router, body::Bytes, extract::Extension, routing::post};
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

pub fn router(service: Arc<RouterService>) -> Router {
    Router::new()
        .route(ENDPOINT_OPERATIONS, post(handle_operation))
        .layer(Extension(service))
}

pub async fn handle_operation(
    Extension(service): Extension<Arc<RouterService>>,
    body: Bytes,
) -> Json<StandardResult> {
    let span = tracing::info_span!("request", id = %Uuid::new_v4());

    Json(isolated(service.handle(&body)).instrument(span).await)
}

/// Turns a panic while handling a request into a generic failure reply
/// instead of a dropped connection.
pub(crate) async fn isolated<F>(handling: F) -> StandardResult
where
    F: Future<Output = StandardResult>,
{
    match AssertUnwindSafe(handling).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("Request handling panicked: {}", reason);
            StandardResult::failure(INTERNAL_ERROR_MESSAGE)
        }
    }
}
