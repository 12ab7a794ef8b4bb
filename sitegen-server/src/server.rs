use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, State, rejection::JsonRejection},
    http::{HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sitegen::{
    DocumentAnalyzer, Error, GenerationRequest, OpenAiCompatibleProvider, Provider,
    ProviderRegistry, ResponseRelay, Settings, StreamingGenerator,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Slack on top of the upload cap for multipart framing, so oversized files
/// reach the handler and get a descriptive rejection.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

const PDF_TYPES: &[&str] = &["application/pdf"];
const IMAGE_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/gif",
    "image/webp",
    "image/bmp",
];

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub generator: StreamingGenerator,
    pub analyzer: DocumentAnalyzer,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatibleProvider::from_settings(&settings));
        Self::with_provider(Arc::new(settings), provider)
    }

    /// State sharing one provider transport between generation and analysis.
    pub fn with_provider(settings: Arc<Settings>, provider: Arc<dyn Provider>) -> Self {
        let max_upload_bytes = settings.max_upload_bytes;
        let registry = ProviderRegistry::new(settings);
        Self {
            generator: StreamingGenerator::new(registry.clone(), Arc::clone(&provider)),
            analyzer: DocumentAnalyzer::new(registry, provider),
            max_upload_bytes,
        }
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.max_upload_bytes + MULTIPART_OVERHEAD;
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/analyze-pdf", post(analyze_pdf))
        .route("/api/generate-website-from-pdf", post(generate_from_description))
        .route("/api/analyze-image", post(analyze_image))
        .route("/api/generate-website-from-image", post(generate_from_description))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(settings: Settings, host: &str, port: u16) -> anyhow::Result<()> {
    if settings.credentials.primary.is_none() {
        tracing::warn!("NVIDIA_API_KEY is not set; generation requests will fail until it is configured");
    }
    let state = Arc::new(AppState::new(settings));
    let app = router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("sitegen listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Document(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        Error::Authorization(_) | Error::Transport(_) | Error::MidStream(_) => StatusCode::BAD_GATEWAY,
    }
}

fn log_failure(request_id: &str, err: &Error) {
    tracing::error!(request_id = %request_id, kind = err.kind(), "{}", err);
}

/// Raw text relay: fragments go out as body chunks exactly as received.
fn stream_response(generation: sitegen::Generation, request_id: String) -> Response {
    tracing::info!(
        request_id = %request_id,
        provider = %generation.provider.name,
        fallback = generation.used_fallback,
        "streaming generation"
    );
    let relay = ResponseRelay::new(generation.fragments, request_id);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(relay),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /api/generate
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateBody {
    prompt: String,
    previous_html: Option<String>,
    previous_prompt: Option<String>,
}

async fn generate(
    State(state): State<Arc<AppState>>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": rejection.body_text()})),
            )
                .into_response();
        }
    };

    let prompt = body.prompt.trim();
    if prompt.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Prompt is required"})),
        )
            .into_response();
    }

    let request = GenerationRequest {
        prompt: prompt.to_string(),
        previous_html: body.previous_html,
        previous_prompt: body.previous_prompt,
        source_document_description: None,
    };

    match state.generator.generate(&request).await {
        Ok(generation) => stream_response(generation, request_id),
        Err(e) => {
            log_failure(&request_id, &e);
            (error_status(&e), Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// POST /api/generate-website-from-{pdf,image}
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DescriptionBody {
    description: String,
}

async fn generate_from_description(
    State(state): State<Arc<AppState>>,
    body: Result<Json<DescriptionBody>, JsonRejection>,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let description = match body {
        Ok(Json(body)) => body.description,
        Err(rejection) => return detail(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    if description.trim().is_empty() {
        return detail(StatusCode::BAD_REQUEST, "Description is required");
    }

    let request = GenerationRequest::from_description(description.trim());
    match state.generator.generate(&request).await {
        Ok(generation) => stream_response(generation, request_id),
        Err(e) => {
            log_failure(&request_id, &e);
            detail(error_status(&e), e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// POST /api/analyze-{pdf,image}
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct AnalysisResponse {
    success: bool,
    description: String,
    filename: Option<String>,
    message: &'static str,
}

struct Upload {
    filename: Option<String>,
    data: Bytes,
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"detail": message.into()}))).into_response()
}

/// Read the `file` field, enforcing the allowed content types and size cap.
async fn read_upload(
    mut multipart: Multipart,
    allowed: &[&str],
    kind: &str,
    max_bytes: usize,
) -> Result<Upload, Response> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Err(detail(StatusCode::BAD_REQUEST, "No file uploaded")),
            Err(e) => return Err(detail(e.status(), e.body_text())),
        };
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_ascii_lowercase();
        if !allowed.contains(&content_type.as_str()) {
            return Err(detail(
                StatusCode::BAD_REQUEST,
                format!("Invalid file type. Only {} is allowed.", kind),
            ));
        }
        let filename = field.file_name().map(String::from);
        let too_large = || {
            detail(
                StatusCode::BAD_REQUEST,
                format!("File size too large. Maximum size: {}MB", max_bytes / (1024 * 1024)),
            )
        };
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => return Err(too_large()),
            Err(e) => return Err(detail(e.status(), e.body_text())),
        };
        if data.len() > max_bytes {
            return Err(too_large());
        }
        return Ok(Upload { filename, data });
    }
}

async fn analyze_pdf(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let upload = match read_upload(multipart, PDF_TYPES, "PDF", state.max_upload_bytes).await {
        Ok(upload) => upload,
        Err(resp) => return resp,
    };
    tracing::info!(request_id = %request_id, bytes = upload.data.len(), "analyzing PDF upload");

    match state.analyzer.analyze_pdf(upload.data).await {
        Ok(description) => Json(AnalysisResponse {
            success: true,
            description,
            filename: upload.filename,
            message: "PDF analyzed successfully.",
        })
        .into_response(),
        Err(e) => {
            log_failure(&request_id, &e);
            detail(error_status(&e), e.to_string())
        }
    }
}

async fn analyze_image(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let upload = match read_upload(multipart, IMAGE_TYPES, "images", state.max_upload_bytes).await {
        Ok(upload) => upload,
        Err(resp) => return resp,
    };
    tracing::info!(request_id = %request_id, bytes = upload.data.len(), "analyzing image upload");

    match state.analyzer.analyze_image(upload.data).await {
        Ok(description) => Json(AnalysisResponse {
            success: true,
            description,
            filename: upload.filename,
            message: "Image analyzed successfully.",
        })
        .into_response(),
        Err(e) => {
            log_failure(&request_id, &e);
            detail(error_status(&e), e.to_string())
        }
    }
}
