use axum::{
    Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use metrics::counter;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::pipeline::{Pipeline, PipelineError};
use crate::types::{ErrorResponse, HealthResponse, PredictionResult};

/// Multipart field carrying the uploaded photo.
pub const IMAGE_FIELD: &str = "image";

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/predict", post(predict_handler))
        // Same handler and schema as /predict; only the path is kept
        .route("/search-by-image", post(predict_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Rejected(#[from] MultipartRejection),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Rejected(rejection) => rejection.status(),
            ApiError::Multipart(err) => err.status(),
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg.clone(),
            ApiError::Rejected(rejection) => rejection.body_text(),
            ApiError::Multipart(err) => err.body_text(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidImage(err) => ApiError::BadRequest(err.to_string()),
            PipelineError::Inference(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.message();

        if status.is_server_error() {
            counter!("prediction_failures_total", "kind" => "internal").increment(1);
            tracing::error!(%status, error = %error, "Request failed");
        } else {
            counter!("prediction_failures_total", "kind" => "client").increment(1);
            tracing::warn!(%status, error = %error, "Request rejected");
        }

        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Request-scoped upload, dropped once the response is built.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: axum::body::Bytes,
}

impl UploadedFile {
    /// Takes the first `IMAGE_FIELD` part; other fields are skipped.
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        while let Some(field) = multipart.next_field().await? {
            if field.name() != Some(IMAGE_FIELD) {
                continue;
            }

            let filename = field.file_name().unwrap_or_default().to_string();
            if filename.is_empty() {
                return Err(ApiError::BadRequest("No selected file".to_string()));
            }

            let bytes = field.bytes().await?;
            return Ok(Self { filename, bytes });
        }

        Err(ApiError::BadRequest("No image file".to_string()))
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model: state.pipeline.model_id().to_string(),
    })
}

#[tracing::instrument(skip_all, fields(request_id = %Uuid::new_v4().simple()))]
async fn predict_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    counter!("prediction_requests_total").increment(1);

    let upload = UploadedFile::from_multipart(multipart?).await?;
    tracing::info!(filename = %upload.filename, bytes = upload.bytes.len(), "Processing upload");

    let pipeline = state.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || pipeline.run(&upload.bytes))
        .await
        .map_err(|e| ApiError::Internal(format!("Inference task failed: {e}")))??;

    tracing::info!(class_id = result.class_id, probability = result.probability, "Prediction completed");
    Ok(Json(result))
}
