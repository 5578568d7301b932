use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

mod config;
mod gemini;
mod generate;
mod models;

use config::Config;
use gemini::{GeminiClient, VisionModel};
use generate::GenerateError;
use models::{GenerateAltTextRequest, GenerateAltTextResponse};

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
struct AppState {
    model: Arc<dyn VisionModel>,
    http: reqwest::Client,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState {
        model: Arc::new(GeminiClient::new(&config)),
        http: generate::image_client(&config),
    };

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await.unwrap();
    tracing::info!("listening on {}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/api/generate-alt-text", post(generate_endpoint))
        .with_state(state)
}

async fn index() -> impl IntoResponse {
    Html(INDEX_HTML)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn generate_endpoint(
    State(state): State<AppState>,
    Json(req): Json<GenerateAltTextRequest>,
) -> Response {
    if req.image_url.is_empty() || req.language.is_empty() {
        return error_response(GenerateError::MissingField);
    }

    match generate::generate_alt_text(
        state.model.as_ref(),
        &state.http,
        &req.image_url,
        &req.language,
    )
    .await
    {
        Ok(alt_text) => {
            tracing::info!("generated alt text for {}", req.image_url);
            (StatusCode::OK, Json(GenerateAltTextResponse { alt_text })).into_response()
        }
        Err(e) => {
            match &e {
                GenerateError::Generation(detail) => {
                    tracing::error!("generation failed for {}: {}", req.image_url, detail);
                }
                _ => tracing::info!("request rejected: {}", e),
            }
            error_response(e)
        }
    }
}

fn error_response(e: GenerateError) -> Response {
    let status = match &e {
        GenerateError::MissingField | GenerateError::ContentBlocked => StatusCode::BAD_REQUEST,
        GenerateError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"error": e.to_string()}))).into_response()
}
