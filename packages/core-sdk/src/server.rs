use std::{path::Path, sync::Arc};

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, Method, StatusCode},
    routing::{get, get_service, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::{error, info};

use crate::{
    models::{Message, ProviderMap},
    state::{Selection, ServerState},
};

type ApiError = (StatusCode, Json<ErrorBody>);

/**
 * \brief Start the local HTTP relay with the API routes and the static web directory.
 * \param addr listen address, e.g. "127.0.0.1:8080"
 */
pub async fn run(addr: &str, state: Arc<ServerState>, web_dir: &Path) -> Result<()> {
    let selection = state.current();
    let app = router(state, web_dir);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);
    info!("API available at http://{}/api/chat", addr);
    info!(
        provider = %selection.provider.display_name,
        model = %selection.model.display_name,
        "serving"
    );
    axum::serve(listener, app).await?;
    Ok(())
}

/**
 * \brief Build the relay router; split from `run` so it can be driven in-process.
 */
pub fn router(state: Arc<ServerState>, web_dir: &Path) -> Router {
    let static_service =
        get_service(ServeDir::new(web_dir).append_index_html_on_directories(true));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/api/chat", post(chat).options(preflight))
        .route("/api/info", get(info_handler).options(preflight))
        .route("/api/provider", post(select_provider).options(preflight))
        .route("/api/model", post(select_model).options(preflight))
        .route("/health", get(health_check))
        .fallback_service(static_service)
        .layer(cors)
        .with_state(state)
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Deserialize, Debug)]
struct ChatInput {
    #[serde(default)]
    messages: Vec<Message>,
    /** \brief Falls back to the model default when absent or zero */
    #[serde(default)]
    temperature: Option<f64>,
    /** \brief Falls back to the provider default when absent or zero */
    #[serde(default)]
    max_tokens: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct ChatOutput {
    pub message: String,
    pub tokens: u32,
    pub duration_ms: u64,
}

#[derive(Serialize, Debug)]
struct InfoOutput {
    provider: String,
    provider_id: String,
    model: String,
    model_id: String,
    temperature: f64,
    max_tokens: u32,
    available_providers: ProviderMap,
}

#[derive(Deserialize, Debug)]
struct ProviderSelect {
    #[serde(default)]
    provider_id: String,
}

#[derive(Deserialize, Debug)]
struct ModelSelect {
    #[serde(default)]
    model_id: String,
}

#[derive(Serialize, Debug)]
struct SelectionOutput {
    success: bool,
    provider: String,
    provider_id: String,
    model: String,
    model_id: String,
}

impl From<Selection> for SelectionOutput {
    fn from(sel: Selection) -> Self {
        Self {
            success: true,
            provider: sel.provider.display_name,
            provider_id: sel.provider.id,
            model: sel.model.display_name,
            model_id: sel.model.id,
        }
    }
}

/**
 * \brief Relay one chat turn to the current provider: POST /api/chat
 */
async fn chat(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<ChatOutput>, ApiError> {
    let input: ChatInput = parse_body(&body)?;

    let Selection {
        provider,
        model,
        api_key,
    } = state.current();

    let temperature = input
        .temperature
        .filter(|t| *t != 0.0)
        .unwrap_or(model.default_temperature);
    let max_tokens = input
        .max_tokens
        .filter(|m| *m != 0)
        .unwrap_or(provider.default_max_tokens);
    info!(temperature, "request temperature");

    if input.messages.is_empty() {
        return Err(bad_request("No messages provided"));
    }
    info!("received chat request with {} messages", input.messages.len());

    let client = state.client();
    let request = client.assemble_request(
        &model.id,
        temperature,
        max_tokens,
        input.messages,
        model.extra_fields.as_ref(),
    );
    let reply = client
        .send(&request, &provider, &api_key)
        .await
        .map_err(|e| {
            error!("error from AI provider: {}", e);
            internal_err(format!("Error from AI provider: {}", e))
        })?;

    info!(
        prompt_tokens = reply.usage.prompt_tokens,
        completion_tokens = reply.usage.completion_tokens,
        total_tokens = reply.usage.total_tokens,
        "usage"
    );

    Ok(Json(ChatOutput {
        tokens: reply.total_tokens(),
        duration_ms: u64::try_from(reply.duration.as_millis()).unwrap_or(u64::MAX),
        message: reply.message,
    }))
}

/**
 * \brief Current selection and the available providers: GET /api/info
 */
async fn info_handler(State(state): State<Arc<ServerState>>) -> Json<InfoOutput> {
    let sel = state.current();
    Json(InfoOutput {
        provider: sel.provider.display_name,
        provider_id: sel.provider.id,
        model: sel.model.display_name,
        model_id: sel.model.id,
        temperature: sel.model.default_temperature,
        max_tokens: sel.provider.default_max_tokens,
        available_providers: state.available_providers(),
    })
}

/**
 * \brief Switch the current provider: POST /api/provider
 */
async fn select_provider(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<SelectionOutput>, ApiError> {
    let input: ProviderSelect = parse_body(&body)?;
    if input.provider_id.is_empty() {
        return Err(bad_request("provider_id is required"));
    }
    let sel = state.set_provider(&input.provider_id).map_err(|e| {
        error!("error setting provider: {}", e);
        bad_request(e)
    })?;
    Ok(Json(sel.into()))
}

/**
 * \brief Switch the current model: POST /api/model
 */
async fn select_model(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> Result<Json<SelectionOutput>, ApiError> {
    let input: ModelSelect = parse_body(&body)?;
    if input.model_id.is_empty() {
        return Err(bad_request("model_id is required"));
    }
    let sel = state.set_model(&input.model_id).map_err(|e| {
        error!("error setting model: {}", e);
        bad_request(e)
    })?;
    Ok(Json(sel.into()))
}

async fn health_check() -> &'static str {
    "OK"
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

/**
 * \brief Decode a JSON request body whatever its Content-Type header says.
 */
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        error!("error parsing request: {}", e);
        bad_request("Invalid request format")
    })
}

fn bad_request<E: std::fmt::Display>(e: E) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
}

fn internal_err<E: std::fmt::Display>(e: E) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: e.to_string(),
        }),
    )
}
