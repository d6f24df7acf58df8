//! Web router using Axum

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use sipmeta_core::{ContractId, MetadataError, TokenService};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::sse;

type AppState = Arc<TokenService>;

/// Create the web router
pub fn create_router(service: Arc<TokenService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/events", get(sse_handler))
        .route(
            "/api/metadata/{contract_id}",
            get(document_handler).post(store_document_handler),
        )
        .route("/api/v1/tokens", get(tokens_handler))
        .route("/api/v1/tokens/{contract_id}", get(token_handler))
        .route("/api/v1/tokens/{contract_id}/refresh", post(refresh_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(service)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn internal_error(context: &str, err: MetadataError) -> Response {
    error!(error = %err, "{}", context);
    let status = if err.is_source_failure() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    error_response(status, err.to_string())
}

fn parse_id(raw: &str) -> Result<ContractId, Response> {
    ContractId::parse(raw).map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))
}

async fn health_handler(State(service): State<AppState>) -> Response {
    match service.cached_ids().await {
        Ok(ids) => Json(json!({
            "status": "healthy",
            "cached_tokens": ids.len(),
            "subscribers": service.events().subscriber_count(),
        }))
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Health check could not read the store");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn document_handler(State(service): State<AppState>, Path(raw): Path<String>) -> Response {
    let id = match parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match service.document(&id).await {
        Ok(Some(doc)) => Json(doc).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("No metadata for {}", id)),
        Err(e) => internal_error("Metadata document read failed", e),
    }
}

async fn store_document_handler(
    State(service): State<AppState>,
    Path(raw): Path<String>,
    Json(doc): Json<Value>,
) -> Response {
    let id = match parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    if !doc.is_object() {
        return error_response(StatusCode::BAD_REQUEST, "Metadata document must be a JSON object");
    }
    match service.put_document(&id, &doc).await {
        Ok(()) => (StatusCode::CREATED, Json(json!({ "contractId": id.as_str() }))).into_response(),
        Err(e) => internal_error("Metadata document write failed", e),
    }
}

async fn tokens_handler(State(service): State<AppState>) -> Response {
    match service.registry().managed().await {
        Ok(ids) => Json(json!({
            "total": ids.len(),
            "tokens": ids.iter().map(ContractId::as_str).collect::<Vec<_>>(),
        }))
        .into_response(),
        Err(e) => internal_error("Managed list read failed", e.into()),
    }
}

async fn token_handler(State(service): State<AppState>, Path(raw): Path<String>) -> Response {
    let id = match parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match service.get(&id).await {
        Ok(Some(data)) => Json(data).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Token {} not found", id)),
        Err(e) => internal_error("Token lookup failed", e),
    }
}

async fn refresh_handler(State(service): State<AppState>, Path(raw): Path<String>) -> Response {
    let id = match parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match service.force_refresh(&id).await {
        Ok(Some(data)) => Json(data).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("Token {} not found", id)),
        Err(e @ MetadataError::Blacklisted { .. }) => error_response(StatusCode::FORBIDDEN, e.to_string()),
        Err(e) => internal_error("Token refresh failed", e),
    }
}

/// SSE endpoint for cache activity
async fn sse_handler(
    State(service): State<AppState>,
) -> axum::response::Sse<
    impl futures::stream::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>,
> {
    sse::create_sse_stream(service.events().clone())
}
