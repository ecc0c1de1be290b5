//! HTTP interface of the ingestion engine.
//!
//! Provides endpoints for:
//! - Scenario management and manual ingest/stop triggers
//! - Scenario status listing
//! - The DAR response callback polled by the download manager
//! - Add-product submission and status
//! - Prometheus metrics

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::engine::{Task, WorkflowEngine};
use crate::worker::AddProductRequest;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct OpResponse {
    pub status: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_string: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddProductResponse {
    #[serde(rename = "opId", skip_serializing_if = "Option::is_none")]
    pub op_id: Option<i64>,
    pub status: i64,
    #[serde(rename = "errorString", skip_serializing_if = "Option::is_none")]
    pub error_string: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IngestLocalBody {
    pub dir: PathBuf,
    pub metadata: String,
    pub data: String,
}

// ============================================================================
// Shared State
// ============================================================================

pub struct ServerState {
    pub engine: Arc<WorkflowEngine>,
    pub metrics: PrometheusHandle,
}

// ============================================================================
// Router
// ============================================================================

/// Create the engine API router.
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/scenarios", get(list_scenarios_handler).post(upsert_scenario_handler))
        .route(
            "/scenarios/:ncn_id",
            get(get_scenario_handler).delete(delete_scenario_handler),
        )
        .route("/scenarios/:ncn_id/ingest", post(ingest_handler))
        .route("/scenarios/:ncn_id/ingestLocal", post(ingest_local_handler))
        .route("/scenarios/:ncn_id/stop", post(stop_handler))
        .route("/scenarios/:ncn_id/status", get(scenario_status_handler))
        .route("/status", get(status_handler))
        .route("/ingest/darResponse/:seq", get(dar_response_handler))
        .route("/ingest/addProduct", post(add_product_handler))
        .route("/ingest/addProduct/:op_id", get(add_product_status_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(Extension(state))
}

// ============================================================================
// Handlers
// ============================================================================

fn store_error(e: storage::StorageError) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": e.to_string() })),
    )
        .into_response()
}

/// GET /scenarios - All configured scenarios
async fn list_scenarios_handler(
    Extension(state): Extension<Arc<ServerState>>,
) -> impl IntoResponse {
    match state.engine.store().list_scenarios().await {
        Ok(scenarios) => Json(scenarios).into_response(),
        Err(e) => store_error(e),
    }
}

/// POST /scenarios - Create or replace a scenario
async fn upsert_scenario_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Json(scenario): Json<storage::Scenario>,
) -> impl IntoResponse {
    match state.engine.store().upsert_scenario(&scenario).await {
        Ok(()) => {
            info!(ncn_id = %scenario.ncn_id, "scenario saved");
            (StatusCode::OK, Json(serde_json::json!({ "ncn_id": scenario.ncn_id })))
                .into_response()
        }
        Err(e) => store_error(e),
    }
}

/// GET /scenarios/:ncn_id
async fn get_scenario_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Path(ncn_id): Path<String>,
) -> impl IntoResponse {
    match state.engine.store().get_scenario(&ncn_id).await {
        Ok(Some(sc)) => Json(sc).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_error(e),
    }
}

/// DELETE /scenarios/:ncn_id - Queue a delete task
async fn delete_scenario_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Path(ncn_id): Path<String>,
) -> impl IntoResponse {
    submit_response(state.engine.submit(Task::Delete { ncn_id }).await)
}

/// POST /scenarios/:ncn_id/ingest - Queue an ingest task
async fn ingest_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Path(ncn_id): Path<String>,
) -> impl IntoResponse {
    submit_response(state.engine.submit(Task::Ingest { ncn_id }).await)
}

/// POST /scenarios/:ncn_id/ingestLocal - Ingest products already on disk
async fn ingest_local_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Path(ncn_id): Path<String>,
    Json(body): Json<IngestLocalBody>,
) -> impl IntoResponse {
    submit_response(
        state
            .engine
            .submit(Task::IngestLocal {
                ncn_id,
                dir: body.dir,
                metadata: body.metadata,
                data: body.data,
            })
            .await,
    )
}

fn submit_response(result: ingestion::Result<()>) -> axum::response::Response {
    match result {
        Ok(()) => Json(OpResponse {
            status: 0,
            error_string: None,
        })
        .into_response(),
        Err(e) => (
            StatusCode::CONFLICT,
            Json(OpResponse {
                status: 1,
                error_string: Some(e.to_string()),
            }),
        )
            .into_response(),
    }
}

/// POST /scenarios/:ncn_id/stop - Request a running task to stop
async fn stop_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Path(ncn_id): Path<String>,
) -> impl IntoResponse {
    match state.engine.stop_scenario(&ncn_id).await {
        Ok(()) => Json(OpResponse {
            status: 0,
            error_string: None,
        })
        .into_response(),
        Err(e) => (
            StatusCode::NOT_FOUND,
            Json(OpResponse {
                status: 1,
                error_string: Some(e.to_string()),
            }),
        )
            .into_response(),
    }
}

/// GET /scenarios/:ncn_id/status
async fn scenario_status_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Path(ncn_id): Path<String>,
) -> impl IntoResponse {
    match state.engine.store().get_status(&ncn_id).await {
        Ok(Some(status)) => Json(status).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /status - Status rows of all scenarios
async fn status_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    match state.engine.store().list_statuses().await {
        Ok(statuses) => Json(statuses).into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /ingest/darResponse/:seq - DAR document handed to the DM.
///
/// Each document is served exactly once; the DM fetches it right after
/// the engine submits the DAR URL.
async fn dar_response_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Path(seq): Path<u64>,
) -> impl IntoResponse {
    match state.engine.registry().take(seq).await {
        Some(xml) => ([(header::CONTENT_TYPE, "application/xml")], xml).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// POST /ingest/addProduct - Queue an add-product task.
///
/// The body is inspected field by field so a malformed request gets the
/// documented `{status, errorString}` answer instead of a bare 422.
async fn add_product_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    fn bad_request(msg: &str) -> axum::response::Response {
        (
            StatusCode::OK,
            Json(AddProductResponse {
                op_id: None,
                status: 101,
                error_string: Some(msg.to_string()),
            }),
        )
            .into_response()
    }

    let Some(data) = body.get("data").and_then(|v| v.as_str()) else {
        return bad_request("Missing 'data' spec.");
    };
    let Some(metadata) = body.get("metadata").and_then(|v| v.as_str()) else {
        return bad_request("Missing 'metadata' spec.");
    };
    let product_id = body
        .get("productID")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    let request = AddProductRequest {
        data: data.to_string(),
        metadata: metadata.to_string(),
        product_id,
    };

    let info_id = match state.engine.store().create_product_info().await {
        Ok(id) => id,
        Err(e) => {
            return Json(AddProductResponse {
                op_id: None,
                status: 50,
                error_string: Some(e.to_string()),
            })
            .into_response();
        }
    };

    match state
        .engine
        .submit(Task::AddProduct { info_id, request })
        .await
    {
        Ok(()) => Json(AddProductResponse {
            op_id: Some(info_id),
            status: 0,
            error_string: None,
        })
        .into_response(),
        Err(e) => Json(AddProductResponse {
            op_id: None,
            status: 50,
            error_string: Some(e.to_string()),
        })
        .into_response(),
    }
}

/// GET /ingest/addProduct/:op_id - Outcome of a queued add-product task
async fn add_product_status_handler(
    Extension(state): Extension<Arc<ServerState>>,
    Path(op_id): Path<i64>,
) -> impl IntoResponse {
    match state.engine.store().get_product_info(op_id).await {
        Ok(Some(info)) => Json(info).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => store_error(e),
    }
}

/// GET /metrics - Prometheus exposition
async fn metrics_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    state.metrics.render()
}

/// GET /health - Health check endpoint
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "ingest-engine"
    }))
}

/// Start the HTTP server.
pub async fn run_server(state: Arc<ServerState>, port: u16) -> anyhow::Result<()> {
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    info!(port = port, "Starting ingestion engine server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
