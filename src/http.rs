//! HTTP front for the engine: `/__mock/*` control routes plus a fallback that
//! either answers from the mock or forwards to the real backend.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::ConfigPatch;
use crate::engine::{Intercept, MockEngine};
use crate::router::{MockRequest, MockResponse};

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream not configured")]
    NotConfigured,
    #[error("failed to build upstream client: {0}")]
    ClientBuild(String),
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl IntoResponse for MockResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
}

impl HttpUpstream {
    pub fn new(base_url: impl Into<String>, timeout_ms: u64) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|err| ProxyError::ClientBuild(err.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, request: &MockRequest) -> String {
        match request.raw_query.as_deref() {
            Some(query) if !query.is_empty() => {
                format!("{}{}?{}", self.base_url, request.path, query)
            }
            _ => format!("{}{}", self.base_url, request.path),
        }
    }

    pub async fn forward(&self, request: MockRequest) -> Result<Response, ProxyError> {
        let url = self.url_for(&request);
        let mut headers = request.headers;
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        let upstream = self
            .client
            .request(request.method, url)
            .headers(headers)
            .body(request.body)
            .send()
            .await?;

        let status = upstream.status();
        let mut relayed = upstream.headers().clone();
        relayed.remove(header::TRANSFER_ENCODING);
        relayed.remove(header::CONTENT_LENGTH);
        relayed.remove(header::CONNECTION);
        let body = upstream.bytes().await?;

        Ok((status, relayed, Body::from(body)).into_response())
    }
}

#[derive(Clone)]
struct EngineAppState {
    engine: Arc<MockEngine>,
    upstream: Option<Arc<HttpUpstream>>,
}

pub fn engine_router(engine: Arc<MockEngine>, upstream: Option<HttpUpstream>) -> Router {
    Router::new()
        .route("/__mock/status", get(get_status))
        .route("/__mock/toggle", post(post_toggle))
        .route("/__mock/config", get(get_config).post(post_config))
        .route("/__mock/config/reset", post(post_config_reset))
        .fallback(intercept_request)
        .with_state(EngineAppState {
            engine,
            upstream: upstream.map(Arc::new),
        })
}

async fn get_status(State(state): State<EngineAppState>) -> impl IntoResponse {
    let engine = &state.engine;
    Json(json!({
        "enabled": engine.is_enabled(),
        "revision": engine.revision(),
        "config": engine.config(),
        "upstream": state.upstream.as_ref().map(|u| u.base_url().to_string()),
    }))
}

async fn post_toggle(State(state): State<EngineAppState>, body: Bytes) -> impl IntoResponse {
    let requested = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|value| value.get("enabled").and_then(Value::as_bool));
    let enabled = requested.unwrap_or(!state.engine.is_enabled());
    state.engine.set_enabled(enabled);
    Json(json!({ "enabled": enabled }))
}

async fn get_config(State(state): State<EngineAppState>) -> impl IntoResponse {
    Json(state.engine.config())
}

async fn post_config(State(state): State<EngineAppState>, body: Bytes) -> impl IntoResponse {
    let patch = serde_json::from_slice::<Value>(&body)
        .map(|value| ConfigPatch::from_json(&value))
        .unwrap_or_default();
    if patch.is_empty() {
        return Json(state.engine.config());
    }
    Json(state.engine.apply_config(&patch))
}

async fn post_config_reset(State(state): State<EngineAppState>) -> impl IntoResponse {
    Json(state.engine.reset_config())
}

async fn intercept_request(
    State(state): State<EngineAppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let query = Query::<Vec<(String, String)>>::try_from_uri(&uri)
        .map(|Query(pairs)| pairs)
        .unwrap_or_default();
    let request = MockRequest {
        method,
        path: uri.path().to_string(),
        query,
        raw_query: uri.query().map(str::to_string),
        headers,
        body: body.to_vec(),
    };

    match state.engine.intercept(request).await {
        Intercept::Handled { endpoint, response } => {
            info!(
                component = "http",
                event = "http.intercept",
                endpoint,
                status = response.status.as_u16()
            );
            response.into_response()
        }
        Intercept::PassThrough(request) => pass_through(state.upstream.as_deref(), request).await,
    }
}

async fn pass_through(upstream: Option<&HttpUpstream>, request: MockRequest) -> Response {
    info!(
        component = "http",
        event = "request.passthrough",
        method = %request.method,
        path = %request.path,
        upstream = upstream.map(HttpUpstream::base_url).unwrap_or("none")
    );

    let result = match upstream {
        Some(upstream) => upstream.forward(request).await,
        None => Err(ProxyError::NotConfigured),
    };

    result.unwrap_or_else(|err| {
        warn!(
            component = "http",
            event = "upstream.error",
            error = %err
        );
        MockResponse::error(StatusCode::BAD_GATEWAY, err.to_string()).into_response()
    })
}
