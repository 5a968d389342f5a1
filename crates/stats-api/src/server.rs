//! Axum server and routes.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use stats_client::{ApiClient, FetchError, HttpRequest, MapImages, RequestBody, Transport};
use stats_types::Envelope;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

pub const REQUEST_ID: &str = "x-request-id";

/// Dropped when forwarding in either direction, along with any names listed in `Connection`.
static HOP_BY_HOP: [HeaderName; 10] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub struct AppState {
    /// Backend base URL.
    pub upstream: String,
    /// Bearer token attached to every forwarded request.
    pub token: Option<String>,
    pub transport: Arc<dyn Transport>,
    pub map_images: MapImages,
    /// Largest forwarded request body; `None` means unlimited.
    pub body_limit: Option<usize>,
}

impl AppState {
    /// Share the client's transport and upstream; the token comes from the proxy config.
    pub fn new(client: &ApiClient, token: Option<String>, map_images: MapImages) -> Self {
        Self {
            upstream: client.base_url().to_string(),
            token,
            transport: client.transport(),
            map_images,
            body_limit: Some(crate::config::DEFAULT_MAX_BODY_BYTES),
        }
    }

    pub fn with_body_limit(mut self, limit: Option<usize>) -> Self {
        self.body_limit = limit;
        self
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let body_limit = match state.body_limit {
        Some(max) => DefaultBodyLimit::max(max),
        None => DefaultBodyLimit::disable(),
    };
    Router::new()
        .route("/api/*path", any(handle_proxy).layer(body_limit))
        .route("/map-image/:name", get(handle_map_image))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn request_id(headers: &HeaderMap) -> HeaderValue {
    headers
        .get(REQUEST_ID)
        .cloned()
        .or_else(|| HeaderValue::from_str(&Uuid::new_v4().to_string()).ok())
        .unwrap_or_else(|| HeaderValue::from_static("unknown"))
}

/// Header names the sender marked as connection-scoped.
fn connection_listed(headers: &HeaderMap) -> Vec<HeaderName> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect()
}

fn forward_headers(incoming: &HeaderMap) -> HeaderMap {
    let listed = connection_listed(incoming);
    let mut out = HeaderMap::new();
    for (name, value) in incoming {
        if !HOP_BY_HOP.contains(name) && !listed.contains(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

/// Path below `/api`, still percent-encoded as the caller sent it.
fn proxied_path(uri: &Uri) -> &str {
    let path = uri.path();
    path.strip_prefix("/api").unwrap_or(path)
}

fn upstream_url(base: &str, path: &str, query: Option<&str>) -> String {
    let mut url = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(q);
    }
    url
}

async fn handle_proxy(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = request_id(&headers);
    let mut out_headers = forward_headers(&headers);
    out_headers.insert(REQUEST_ID, request_id.clone());
    if let Some(ref token) = state.token {
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(v) => {
                out_headers.insert(header::AUTHORIZATION, v);
            }
            Err(e) => tracing::error!(error = %e, "configured token is not a valid header value"),
        }
    }

    let path = proxied_path(&uri);
    let url = upstream_url(&state.upstream, path, uri.query());
    let req = HttpRequest {
        method: method.clone(),
        url,
        headers: out_headers,
        body: (!body.is_empty()).then(|| RequestBody::Bytes(body.to_vec())),
    };
    let rid = request_id.to_str().unwrap_or("-").to_string();

    match state.transport.send(req).await {
        Ok(res) => {
            tracing::info!(
                request_id = %rid,
                %method,
                path = %path,
                status = res.status,
                "proxied"
            );
            let status = StatusCode::from_u16(res.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let mut headers = forward_headers(&res.headers);
            headers.insert(REQUEST_ID, request_id);
            (status, headers, res.body).into_response()
        }
        Err(e) => {
            tracing::warn!(
                request_id = %rid,
                %method,
                path = %path,
                error = %e,
                "upstream unreachable"
            );
            let mut headers = HeaderMap::new();
            headers.insert(REQUEST_ID, request_id);
            (
                StatusCode::BAD_GATEWAY,
                headers,
                Json(Envelope::<serde_json::Value>::error(e.to_string(), 502)),
            )
                .into_response()
        }
    }
}

/// Envelope for a failed lookup, using the backend's own conventions.
fn error_envelope(err: &FetchError) -> Envelope<serde_json::Value> {
    let code = match err {
        FetchError::StillComputing { .. } => stats_types::STILL_COMPUTING_CODE,
        FetchError::User { code, .. } => *code,
        _ => 502,
    };
    Envelope::error(err.to_string(), code)
}

async fn handle_map_image(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Json<Envelope<serde_json::Value>> {
    match state.map_images.lookup(&name).await {
        Ok(image) => match serde_json::to_value(image) {
            Ok(data) => Json(Envelope::ok(data)),
            Err(e) => Json(Envelope::error(e.to_string(), 500)),
        },
        Err(e) => {
            tracing::warn!(map = %name, kind = %e.kind(), error = %e, "map image lookup failed");
            Json(error_envelope(&e))
        }
    }
}

async fn handle_health() -> &'static str {
    "ok"
}
