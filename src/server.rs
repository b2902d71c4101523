/// HTTP API over the segmentation engine

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::engine::SegmentationEngine;
use crate::error::{ErrorKind, SegmentError};
use crate::tabular;
use crate::types::{ColumnMapping, PipelineOptions, RawTable, SegmentationReport};

/// Artifacts are published once at startup; handlers only read them.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SegmentationEngine>,
    pub defaults: Arc<PipelineOptions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRequest {
    pub table: RawTable,
    pub columns: ColumnMapping,
    #[serde(default)]
    pub options: Option<PipelineOptions>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

pub enum ApiError {
    Pipeline(SegmentError),
    /// Body was not a well-formed `SegmentRequest`.
    Rejected(JsonRejection),
    EmptySegment(usize),
}

impl From<SegmentError> for ApiError {
    fn from(err: SegmentError) -> Self {
        Self::Pipeline(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Rejected(rejection)
    }
}

impl ApiError {
    fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Pipeline(err) => err.kind(),
            ApiError::Rejected(_) => ErrorKind::InvalidRequest,
            ApiError::EmptySegment(_) => ErrorKind::NotFound,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Pipeline(err) => err.to_string(),
            ApiError::Rejected(rejection) => rejection.body_text(),
            ApiError::EmptySegment(cluster) => format!("segment {cluster} has no customers"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match &self {
            ApiError::Rejected(rejection) => rejection.status(),
            ApiError::EmptySegment(_) => StatusCode::NOT_FOUND,
            ApiError::Pipeline(_) => match kind {
                ErrorKind::Schema | ErrorKind::EmptyResult => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };
        let message = self.message();
        tracing::warn!(?kind, error = %message, "Segmentation request failed");
        (status, Json(ErrorBody { kind, message })).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/model", get(model_info))
        .route("/api/segment", post(segment))
        .route("/api/segments/:cluster/csv", post(segment_csv))
        .layer(cors)
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "RFM Segmentation API",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn model_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "cluster_count": state.engine.model().cluster_count(),
        "feature_names": state.engine.scaler().feature_names(),
    }))
}

fn run(state: &AppState, request: &SegmentRequest) -> Result<SegmentationReport, SegmentError> {
    let options = request.options.as_ref().unwrap_or(state.defaults.as_ref());
    state.engine.run(&request.table, &request.columns, options)
}

async fn segment(
    State(state): State<AppState>,
    payload: Result<Json<SegmentRequest>, JsonRejection>,
) -> Result<Json<SegmentationReport>, ApiError> {
    let Json(request) = payload?;
    tracing::info!(rows = request.table.len(), "Segment request");
    Ok(Json(run(&state, &request)?))
}

async fn segment_csv(
    State(state): State<AppState>,
    Path(cluster): Path<usize>,
    payload: Result<Json<SegmentRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    tracing::info!(rows = request.table.len(), cluster, "Segment export request");
    let report = run(&state, &request)?;

    match tabular::segment_csv(&report, cluster)? {
        Some(csv) => Ok((
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"segment_{cluster}.csv\""),
                ),
            ],
            csv,
        )
            .into_response()),
        None => Err(ApiError::EmptySegment(cluster)),
    }
}
