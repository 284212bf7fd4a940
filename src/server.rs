//! HTTP surface: upload, verify-by-reference, and combined upload-and-verify.
//!
//! Every failure renders as a structured JSON body with a machine-readable
//! `code`; a verification failure after a successful ingest still reports the
//! stored file so the caller can retry without re-uploading.

use crate::{
    config::Config,
    engine::{EngineError, Recognizer, python::PythonRecognizer},
    interpret::DocumentType,
    pipeline::{Pipeline, PipelineError},
    storage::{Ingestor, StorageError},
};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info};

pub struct AppState {
    pub pipeline: Pipeline,
    pub public_base_url: String,
    pub body_limit: usize,
}

impl AppState {
    pub fn new(cfg: &Config, recognizer: Arc<dyn Recognizer>) -> Result<Self, StorageError> {
        let ingestor = Ingestor::new(&cfg.storage)?;
        Ok(Self {
            pipeline: Pipeline::new(ingestor, recognizer),
            public_base_url: cfg.server.public_base_url.trim_end_matches('/').to_string(),
            // Leave headroom for multipart framing; the ingestor owns the
            // PayloadTooLarge verdict, not the framework body limit.
            body_limit: cfg.storage.max_upload_bytes as usize + 64 * 1024,
        })
    }

    fn access_url(&self, storage_id: &str) -> String {
        format!("{}/uploads/{}", self.public_base_url, storage_id)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid multipart request: {0}")]
    BadMultipart(String),

    #[error("request body exceeds the upload size limit")]
    BodyTooLarge,

    #[error("missing document type")]
    MissingDocumentType,

    #[error("unknown document type: {0}")]
    UnknownDocumentType(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadMultipart(_)
            | ApiError::MissingDocumentType
            | ApiError::UnknownDocumentType(_) => StatusCode::BAD_REQUEST,
            ApiError::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Pipeline(p) => match p {
                PipelineError::Storage(s) => match s {
                    StorageError::NoFileProvided
                    | StorageError::TypeNotAllowed(_)
                    | StorageError::InvalidId(_) => StatusCode::BAD_REQUEST,
                    StorageError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                    StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                    StorageError::WriteFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
                },
                PipelineError::Engine(e) => match e {
                    EngineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                    _ => StatusCode::BAD_GATEWAY,
                },
                PipelineError::Interpret(_) => StatusCode::BAD_GATEWAY,
                PipelineError::TaskAborted => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadMultipart(_) => "BAD_MULTIPART",
            ApiError::BodyTooLarge => "PAYLOAD_TOO_LARGE",
            ApiError::MissingDocumentType => "MISSING_DOCUMENT_TYPE",
            ApiError::UnknownDocumentType(_) => "UNKNOWN_DOCUMENT_TYPE",
            ApiError::Pipeline(p) => match p {
                PipelineError::Storage(s) => match s {
                    StorageError::NoFileProvided => "NO_FILE_PROVIDED",
                    StorageError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
                    StorageError::TypeNotAllowed(_) => "TYPE_NOT_ALLOWED",
                    StorageError::InvalidId(_) => "INVALID_STORAGE_ID",
                    StorageError::NotFound(_) => "STORED_FILE_NOT_FOUND",
                    StorageError::WriteFailed(_) => "STORAGE_WRITE_FAILED",
                },
                PipelineError::Engine(e) => match e {
                    EngineError::LaunchFailed(_) => "ENGINE_LAUNCH_FAILED",
                    EngineError::NonZeroExit { .. } => "ENGINE_NON_ZERO_EXIT",
                    EngineError::Timeout(_) => "RECOGNITION_TIMEOUT",
                    EngineError::OutputTooLarge(_) => "OUTPUT_TOO_LARGE",
                    EngineError::Io(_) => "ENGINE_IO_ERROR",
                },
                PipelineError::Interpret(_) => "MALFORMED_ENGINE_OUTPUT",
                PipelineError::TaskAborted => "INTERNAL",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), "{}", self);
        } else {
            debug!(code = self.code(), "{}", self);
        }
        let body = json!({
            "success": false,
            "error": self.to_string(),
            "code": self.code(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    storage_id: String,
    access_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest {
    storage_id: String,
    #[serde(rename = "type")]
    document_type: String,
}

struct UploadParts {
    bytes: Vec<u8>,
    original_name: String,
    content_type: String,
    document_type: Option<String>,
}

/// A body cut off by the framework limit is the same condition as an
/// oversized file, so it gets the same verdict instead of a parse error.
fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::BodyTooLarge
    } else {
        ApiError::BadMultipart(e.body_text())
    }
}

async fn extract_upload(mut multipart: Multipart) -> Result<UploadParts, ApiError> {
    let mut file: Option<(Vec<u8>, String, String)> = None;
    let mut document_type: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                if file.is_some() {
                    return Err(ApiError::BadMultipart(
                        "send exactly one field named 'file'".to_string(),
                    ));
                }
                let original_name = field.file_name().unwrap_or("unknown").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some((data.to_vec(), original_name, content_type));
            }
            "type" => {
                let text = field.text().await.map_err(multipart_error)?;
                document_type = Some(text);
            }
            _ => {}
        }
    }

    let (bytes, original_name, content_type) = file.ok_or(ApiError::Pipeline(
        PipelineError::Storage(StorageError::NoFileProvided),
    ))?;
    Ok(UploadParts {
        bytes,
        original_name,
        content_type,
        document_type,
    })
}

fn parse_doc_type(raw: &str) -> Result<DocumentType, ApiError> {
    let raw = raw.trim();
    DocumentType::parse(raw).ok_or_else(|| ApiError::UnknownDocumentType(raw.to_string()))
}

async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let parts = extract_upload(multipart).await?;
    // The declaration is optional here but never silently passed through.
    if let Some(declared) = parts.document_type.as_deref() {
        parse_doc_type(declared)?;
    }
    let stored = state
        .pipeline
        .upload(&parts.bytes, &parts.original_name, &parts.content_type)
        .await?;
    Ok(Json(UploadResponse {
        access_url: state.access_url(&stored.storage_id),
        storage_id: stored.storage_id,
    }))
}

async fn verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let doc_type = parse_doc_type(&req.document_type)?;
    let result = state.pipeline.verify(&req.storage_id, doc_type).await?;
    Ok(Json(json!({ "success": true, "data": result })))
}

async fn upload_and_verify(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let parts = extract_upload(multipart).await?;
    let declared = parts
        .document_type
        .as_deref()
        .ok_or(ApiError::MissingDocumentType)?;
    let doc_type = parse_doc_type(declared)?;

    let (stored, verdict) = state
        .pipeline
        .upload_and_verify(&parts.bytes, &parts.original_name, &parts.content_type, doc_type)
        .await?;
    let access_url = state.access_url(&stored.storage_id);

    match verdict {
        Ok(result) => Ok((
            StatusCode::OK,
            Json(json!({
                "success": true,
                "storageId": stored.storage_id,
                "accessUrl": access_url,
                "data": result,
            })),
        )
            .into_response()),
        Err(err) => {
            let err = ApiError::from(err);
            let body = json!({
                "success": false,
                "error": err.to_string(),
                "code": err.code(),
                "storageId": stored.storage_id,
                "accessUrl": access_url,
            });
            Ok((err.status(), Json(body)).into_response())
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.body_limit;
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/upload", post(upload))
        .route("/verify", post(verify))
        .route("/upload-and-verify", post(upload_and_verify))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(cfg: Config, addr_override: Option<SocketAddr>) -> anyhow::Result<()> {
    let recognizer = Arc::new(PythonRecognizer::new(&cfg)?);
    let state = Arc::new(AppState::new(&cfg, recognizer)?);

    let addr: SocketAddr = match addr_override {
        Some(addr) => addr,
        None => format!("{}:{}", cfg.server.host, cfg.server.port).parse()?,
    };

    let app = router(state);
    info!("idverify listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
