use crate::semantic::{HealthResponse, MatchError, MatchResponse, MatchService};
use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::signal;

#[derive(Clone)]
struct SharedState {
    service: Arc<MatchService>,
}

/// Build the HTTP router around a ready service.
pub fn router(service: Arc<MatchService>, max_upload_bytes: usize) -> Router {
    let shared_state = Arc::new(SharedState { service });

    Router::new()
        .route("/health", get(health))
        .route("/match-image", post(match_image))
        .route("/match-text", post(match_text))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

async fn start_app(service: Arc<MatchService>, addr: &str, max_upload_bytes: usize) -> anyhow::Result<()> {
    let app = router(service, max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

pub fn start_daemon(service: MatchService, addr: &str, max_upload_bytes: usize) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?
        .block_on(async { start_app(Arc::new(service), addr, max_upload_bytes).await })
}

#[derive(Debug)]
struct HttpError(MatchError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        match &self.0 {
            MatchError::InvalidInput(reason) => (
                axum::http::StatusCode::BAD_REQUEST,
                Json(json!({"detail": reason})),
            ),
            MatchError::Embedding(_) | MatchError::Search(_) => {
                log::error!("{self:?}");
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"detail": self.0.to_string()})),
                )
            }
        }
        .into_response()
    }
}

impl<E> From<E> for HttpError
where
    E: Into<MatchError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchParams {
    /// Number of matches, service default when absent
    pub k: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextQuery {
    /// Missing or null text is treated as empty
    #[serde(default)]
    pub text: Option<String>,
}

async fn health(State(state): State<Arc<SharedState>>) -> Json<HealthResponse> {
    Json(state.service.health())
}

async fn match_image(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<MatchParams>,
    mut multipart: Multipart,
) -> Result<Json<MatchResponse>, HttpError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| MatchError::InvalidInput(format!("Invalid upload: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| MatchError::InvalidInput(format!("Invalid upload: {e}")))?;
        upload = Some((filename, data));
        break;
    }

    let (filename, data) = upload
        .ok_or_else(|| MatchError::InvalidInput("Missing form field 'file'".to_string()))?;

    log::debug!("image query: {filename:?} ({} bytes)", data.len());

    let service = state.service.clone();
    tokio::task::block_in_place(move || {
        service
            .match_image(&data, filename.as_deref(), params.k)
            .map(Json)
            .map_err(Into::into)
    })
}

async fn match_text(
    State(state): State<Arc<SharedState>>,
    Query(params): Query<MatchParams>,
    Json(payload): Json<TextQuery>,
) -> Result<Json<MatchResponse>, HttpError> {
    log::debug!("text query: {:?}", payload.text);

    let text = payload.text.unwrap_or_default();
    let service = state.service.clone();
    tokio::task::block_in_place(move || {
        service
            .match_text(&text, params.k)
            .map(Json)
            .map_err(Into::into)
    })
}
