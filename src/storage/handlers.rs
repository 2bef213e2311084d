use super::catalog::BookRecord;
use super::engine::EngineHandle;
use crate::protocol::{ENDPOINT_BOOK, ENDPOINT_INTENT, StandardResult, WorkerIntent};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};

pub fn router(engine: EngineHandle) -> Router {
    Router::new()
        .route(ENDPOINT_INTENT, post(handle_intent))
        .route(&format!("{}/:code", ENDPOINT_BOOK), get(handle_get_book))
        .layer(Extension(engine))
}

pub async fn handle_intent(
    Extension(engine): Extension<EngineHandle>,
    body: Bytes,
) -> (StatusCode, Json<StandardResult>) {
    let intent = match WorkerIntent::decode(&body) {
        Ok(intent) => intent,
        Err(e) => {
            tracing::warn!("Rejected intent: {}", e);
            return (StatusCode::OK, Json(StandardResult::failure(e.to_string())));
        }
    };

    tracing::debug!("Received intent {:?}", intent);

    match engine.apply(intent).await {
        Ok(result) => (StatusCode::OK, Json(result)),
        Err(e) => {
            tracing::error!("Failed to apply intent: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(StandardResult::failure(engine.role().internal_error_message())),
            )
        }
    }
}

pub async fn handle_get_book(
    Extension(engine): Extension<EngineHandle>,
    Path(code): Path<String>,
) -> (StatusCode, Json<Option<BookRecord>>) {
    match engine.lookup(&code).await {
        Ok(Some(record)) => (StatusCode::OK, Json(Some(record))),
        Ok(None) => (StatusCode::NOT_FOUND, Json(None)),
        Err(e) => {
            tracing::error!("Failed to look up {}: {:#}", code, e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(None))
        }
    }
}
