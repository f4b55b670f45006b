use crate::{
    detection::contains_label,
    image_utils::{self, ImageError},
    model_service::{ModelError, ModelService},
    state::SharedState,
    upload::UploadStore,
};
use axum::{
    extract::{
        multipart::{Field, MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use thiserror::Error;
use tokio::{fs::File, io::AsyncWriteExt, task::JoinError};
use tracing::instrument;

const ROUTE: &str = "/upload";
const IMAGE_FIELD: &str = "image";

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub contains_person: bool,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Model not loaded")]
    ModelNotLoaded,
    #[error("No file uploaded")]
    NoFile,
    #[error("Invalid multipart body: {0}")]
    InvalidBody(#[from] MultipartError),
    #[error("Failed to store upload: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to prepare image: {0}")]
    Image(#[from] ImageError),
    #[error("Detection failed: {0}")]
    Model(#[from] ModelError),
    #[error("Image task failed: {0}")]
    Join(#[from] JoinError),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let (status, error) = match &self {
            UploadError::ModelNotLoaded => (StatusCode::INTERNAL_SERVER_ERROR, "Model not loaded"),
            UploadError::NoFile => (StatusCode::BAD_REQUEST, "No file uploaded"),
            UploadError::InvalidBody(e) => (e.status(), "Invalid multipart body"),
            UploadError::Io(_)
            | UploadError::Image(_)
            | UploadError::Model(_)
            | UploadError::Join(_) => {
                tracing::error!("Error processing image: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to process image",
                )
            }
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

#[instrument(skip(state, multipart))]
pub async fn upload_image(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, UploadError> {
    state.metrics.record_request(ROUTE);

    let model = state.model.get().await.ok_or(UploadError::ModelNotLoaded)?;

    let mut multipart = multipart.map_err(|e| {
        tracing::warn!("Rejected upload body: {}", e);
        UploadError::NoFile
    })?;
    let path = save_image_field(&state.uploads, &mut multipart)
        .await?
        .ok_or(UploadError::NoFile)?;

    let started = Instant::now();
    let result = detect_target(model, &path, state.resize, &state.target_label).await;
    state.uploads.remove(&path).await;
    let contains_person = result?;

    state
        .metrics
        .record_detection_duration(started.elapsed().as_millis() as u64, ROUTE);
    if contains_person {
        state.metrics.record_person_hit(&state.target_label);
    }

    Ok(Json(UploadResponse { contains_person }))
}

/// Streams the first `image` file part to a temp file. Other fields, and an
/// `image` part without a filename, are skipped.
async fn save_image_field(
    uploads: &UploadStore,
    multipart: &mut Multipart,
) -> Result<Option<PathBuf>, UploadError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) || field.file_name().is_none() {
            continue;
        }

        let (path, mut file) = uploads.create().await?;
        if let Err(e) = write_field(&mut field, &mut file).await {
            uploads.remove(&path).await;
            return Err(e);
        }
        tracing::debug!(file_name = ?field.file_name(), "Stored upload at {:?}", path);
        return Ok(Some(path));
    }

    Ok(None)
}

async fn write_field(field: &mut Field<'_>, file: &mut File) -> Result<(), UploadError> {
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

async fn detect_target(
    model: Arc<dyn ModelService>,
    path: &Path,
    (width, height): (u32, u32),
    target_label: &str,
) -> Result<bool, UploadError> {
    let path = path.to_path_buf();
    let image =
        tokio::task::spawn_blocking(move || image_utils::load_resized(&path, width, height))
            .await??;

    let detections = model.detect(image).await?;
    for detection in &detections {
        tracing::debug!(
            "Detection: class={}, confidence={:.3}, bbox=({:.1}, {:.1}, {:.1}, {:.1})",
            detection.class_label,
            detection.confidence,
            detection.x1,
            detection.y1,
            detection.x2,
            detection.y2
        );
    }

    Ok(contains_label(&detections, target_label))
}
