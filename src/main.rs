mod catalog;
mod config;
mod http;
mod llm;
mod matching;
mod metrics;
mod models;
mod pipeline;
mod storage;
#[cfg(test)]
mod testing;

use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::Field,
    },
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use config::{CleanupMode, env_parse};
use eyre::WrapErr;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, ImageUpload, SearchResponse};
use pipeline::{Pipeline, PipelineError, PipelineErrorKind};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use storage::cleanup::CleanupQueue;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_REQUEST_MAX_BYTES: usize = 12 * 1024 * 1024;
const IMAGE_FIELDS: &[&str] = &["image", "file"];

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target = "photomatch.api", "server crashed: {err:?}");
    }
}

async fn run() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let mut pipeline = Pipeline::from_env();
    if pipeline.config.cleanup_mode == CleanupMode::Deferred {
        let (queue, _worker) = CleanupQueue::spawn(pipeline.store(), pipeline.cleanup_policy());
        pipeline = pipeline.with_cleanup_queue(queue);
        info!(target = "photomatch.api", "deferred cleanup worker started");
    }

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .wrap_err("installing prometheus recorder")?;
    let state = AppState {
        pipeline,
        openapi: Arc::new(load_openapi()),
        prometheus_handle,
    };

    let port: u16 = env_parse("PORT").unwrap_or(8000);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    info!(target = "photomatch.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("binding {addr}"))?;
    axum::serve(listener, app(state).into_make_service())
        .await
        .wrap_err("serving http")?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    openapi: Arc<serde_json::Value>,
    prometheus_handle: PrometheusHandle,
}

fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
        .route("/api/search/image", post(search_image))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit_from_env()))
}

fn load_openapi() -> serde_json::Value {
    serde_yaml::from_str(include_str!("../docs/openapi.yaml")).unwrap_or_else(|err| {
        warn!(target = "photomatch.api", error = %err, "openapi document unreadable");
        json!({ "openapi": "3.0.3" })
    })
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "photomatch-api",
    }))
}

async fn openapi_json(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    if let Ok(key) = std::env::var("OPENAPI_KEY") {
        let presented = headers
            .get("X-Docs-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != key {
            return Err(PipelineError::invalid_input("docs", "unauthorized").into());
        }
    }
    Ok(Json((*state.openapi).clone()))
}

async fn swagger_ui() -> Html<&'static str> {
    Html(
        r#"<!doctype html>
<html>
<head>
  <meta charset='utf-8'/>
  <title>Photomatch API Docs</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' });
    };
  </script>
</body>
</html>"#,
    )
}

fn body_limit_from_env() -> usize {
    env_parse::<usize>("REQUEST_MAX_BYTES")
        .filter(|v| *v > 0)
        .unwrap_or(DEFAULT_REQUEST_MAX_BYTES)
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Ok(secret) = std::env::var("METRICS_KEY") {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

/// Find catalog products that look like the uploaded photo.
///
/// - Method: `POST`
/// - Path: `/api/search/image`
/// - Body: `multipart/form-data` with the picture in field `image` (or `file`)
/// - Response: `SearchResponse`; `fallback: true` when the match list came from
///   keyword search instead of image analysis
async fn search_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SearchResponse>, AppError> {
    crate::metrics::inc_requests("/api/search/image");

    let limit = state.pipeline.config.max_image_bytes;
    let mut upload = None;
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                upload = Some(oversized_upload(Vec::new(), None, None));
                break;
            }
            Err(err) => return Err(PipelineError::invalid_input("upload", err.body_text()).into()),
        };
        if !field.name().is_some_and(|name| IMAGE_FIELDS.contains(&name)) {
            continue;
        }
        upload = Some(read_image(field, limit).await?);
        break;
    }

    let Some(upload) = upload else {
        return Err(PipelineError::invalid_input("upload", "no image provided").into());
    };
    info!(
        target = "photomatch.api",
        bytes = upload.bytes.len(),
        truncated = upload.truncated,
        filename = upload.filename.as_deref().unwrap_or(""),
        content_type = upload.content_type.as_deref().unwrap_or(""),
        "image search invoked"
    );
    let response = state.pipeline.run(upload).await?;
    Ok(Json(response))
}

/// Reads the image field without buffering past `limit`. Oversized images are
/// cut off and flagged so the search can fall back instead of failing.
async fn read_image(mut field: Field<'_>, limit: usize) -> Result<ImageUpload, PipelineError> {
    let filename = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);
    let mut bytes = Vec::new();
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                if bytes.len() + chunk.len() > limit {
                    let keep = limit + 1 - bytes.len();
                    bytes.extend_from_slice(&chunk[..keep]);
                    return Ok(oversized_upload(bytes, filename, content_type));
                }
                bytes.extend_from_slice(&chunk);
            }
            Ok(None) => break,
            Err(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                return Ok(oversized_upload(bytes, filename, content_type));
            }
            Err(err) => return Err(PipelineError::invalid_input("upload", err.body_text())),
        }
    }
    Ok(ImageUpload {
        bytes,
        filename,
        content_type,
        truncated: false,
    })
}

fn oversized_upload(
    bytes: Vec<u8>,
    filename: Option<String>,
    content_type: Option<String>,
) -> ImageUpload {
    warn!(
        target = "photomatch.api",
        read_bytes = bytes.len(),
        "image_exceeds_limit"
    );
    ImageUpload {
        bytes,
        filename,
        content_type,
        truncated: true,
    }
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Pipeline(err) => {
                let status = match err.kind() {
                    PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                    PipelineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    warn!(target = "photomatch.api", stage = err.stage(), error = %err, "request_failed");
                }
                let payload = ApiError {
                    error: err.detail().to_string(),
                    details: Some(format!("stage: {}", err.stage())),
                };
                (status, Json(payload)).into_response()
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
