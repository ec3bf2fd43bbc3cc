// SPDX-License-Identifier: Apache-2.0

//! HTTP surface of the Micropub endpoint.
//!
//! Routing, scope enforcement and response shaping live here; this is the
//! only module that turns component results into HTTP statuses. Handlers
//! hold no shared mutable state, so requests are fully independent.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::{FromRequest, Host, Multipart, Query, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::entry::{self, Action, CanonicalEntry};
use crate::error::{MicropubError, Result};
use crate::media;
use crate::store::{MediaStore, PostStore};

/// Cap for non-media request bodies.
const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<dyn TokenVerifier>,
    pub posts: Arc<dyn PostStore>,
    pub media: Arc<dyn MediaStore>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        posts: Arc<dyn PostStore>,
        media: Arc<dyn MediaStore>,
        config: Config,
    ) -> Self {
        Self {
            verifier,
            posts,
            media,
            config,
        }
    }
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route(
            "/micropub",
            get(micropub_query).post(micropub_post).options(preflight),
        )
        .route("/media", post(media_upload).options(preflight))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS preflight: always 200, headers added by the CORS layer.
async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Unknown paths are 404; OPTIONS succeeds anywhere for preflight.
async fn fallback(method: Method) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::OK.into_response();
    }
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "invalid_request",
            "error_description": "Not found",
        })),
    )
        .into_response()
}

/// `GET /micropub` — configuration queries.
///
/// <https://www.w3.org/TR/micropub/#querying>
async fn micropub_query(
    Host(host): Host,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(q) = params.get("q") else {
        return MicropubError::InvalidRequest("Missing q parameter".into()).into_response();
    };

    match q.as_str() {
        "config" => Json(json!({
            "media-endpoint": format!("{}://{host}/media", request_scheme(&headers)),
            "syndicate-to": [],
            "post-types": [
                { "type": "note", "name": "Note" },
                { "type": "article", "name": "Article" },
                { "type": "reply", "name": "Reply" },
            ],
        }))
        .into_response(),
        "syndicate-to" => Json(json!({ "syndicate-to": [] })).into_response(),
        "source" => {
            MicropubError::NotImplemented("Source query not yet supported".into()).into_response()
        }
        other => {
            MicropubError::InvalidRequest(format!("Unknown query: {other}")).into_response()
        }
    }
}

/// `POST /micropub` — create, update or delete a post.
async fn micropub_post(State(state): State<AppState>, request: Request) -> Response {
    let authorization = header_value(&request, header::AUTHORIZATION);
    let credential = match state.verifier.verify(authorization.as_deref()).await {
        Ok(credential) => credential,
        Err(e) => return e.into_response(),
    };

    let content_type = header_value(&request, header::CONTENT_TYPE).unwrap_or_default();
    let entry = match normalize_body(&content_type, request).await {
        Ok(entry) => entry,
        Err(e) => return e.into_response(),
    };

    debug!(action = ?entry.action, entry_type = %entry.entry_type, "Parsed micropub request");

    match entry.action {
        Action::Create => {
            if !credential.has_scope("create") {
                return MicropubError::InsufficientScope("Token lacks create scope".into())
                    .into_response();
            }
            match state.posts.create(&entry).await {
                Ok(url) => {
                    info!(url = %url, client = ?credential.client_id, "Post created");
                    (StatusCode::CREATED, [(header::LOCATION, url)]).into_response()
                }
                Err(e) => e.into_response(),
            }
        }
        Action::Update => {
            if !credential.has_scope("update") {
                return MicropubError::InsufficientScope("Token lacks update scope".into())
                    .into_response();
            }
            let Some(url) = entry.url.clone() else {
                return MicropubError::InvalidRequest("Missing url parameter".into())
                    .into_response();
            };
            let ops = entry.update_ops();
            if ops.is_empty() {
                return MicropubError::NotImplemented(
                    "Update requires at least one of: replace, add, delete".into(),
                )
                .into_response();
            }
            match state.posts.update(&url, ops).await {
                Ok(()) => {
                    info!(url = %url, "Post updated");
                    StatusCode::OK.into_response()
                }
                Err(e) => e.into_response(),
            }
        }
        Action::Delete => {
            if !credential.has_scope("delete") {
                return MicropubError::InsufficientScope("Token lacks delete scope".into())
                    .into_response();
            }
            let Some(url) = entry.url.clone() else {
                return MicropubError::InvalidRequest("Missing url parameter".into())
                    .into_response();
            };
            match state.posts.delete(&url).await {
                Ok(()) => {
                    info!(url = %url, "Post deleted");
                    StatusCode::OK.into_response()
                }
                Err(e) => e.into_response(),
            }
        }
    }
}

/// `POST /media` — authenticated media upload.
async fn media_upload(State(state): State<AppState>, request: Request) -> Response {
    let authorization = header_value(&request, header::AUTHORIZATION);
    let credential = match state.verifier.verify(authorization.as_deref()).await {
        Ok(credential) => credential,
        Err(e) => return e.into_response(),
    };

    // Media scope preferred; create scope also accepted
    if !credential.has_scope("media") && !credential.has_scope("create") {
        return MicropubError::InsufficientScope("Token lacks media or create scope".into())
            .into_response();
    }

    let content_type = header_value(&request, header::CONTENT_TYPE).unwrap_or_default();
    if !media_type(&content_type).starts_with("multipart/form-data") {
        return MicropubError::InvalidRequest("Content-Type must be multipart/form-data".into())
            .into_response();
    }

    let upload = match read_file_field(request).await {
        Ok(upload) => upload,
        Err(e) => return e.into_response(),
    };
    let Some((name, mime_type, data)) = upload else {
        return MicropubError::InvalidRequest("Missing 'file' field in form data".into())
            .into_response();
    };

    let object =
        match media::validate_upload(&mime_type, &name, data, state.config.media.max_file_size) {
            Ok(object) => object,
            Err(e) => return e.into_response(),
        };

    match state.media.store(&object).await {
        Ok(url) => {
            info!(key = %object.key, url = %url, "Media stored");
            (StatusCode::CREATED, [(header::LOCATION, url)]).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Dispatch the body to the right normalizer by media type.
async fn normalize_body(content_type: &str, request: Request) -> Result<CanonicalEntry> {
    match media_type(content_type).as_str() {
        "application/json" => {
            let bytes = body_bytes(request).await?;
            entry::from_json(&bytes)
        }
        "application/x-www-form-urlencoded" => {
            let bytes = body_bytes(request).await?;
            entry::from_form(&bytes)
        }
        "multipart/form-data" => {
            let multipart = Multipart::from_request(request, &()).await.map_err(|e| {
                MicropubError::InvalidRequest(format!("Failed to parse form data: {e}"))
            })?;
            entry::from_multipart(multipart).await
        }
        other => {
            warn!(content_type = %other, "Unsupported content type");
            Err(MicropubError::InvalidRequest(
                "Unsupported content type".into(),
            ))
        }
    }
}

async fn body_bytes(request: Request) -> Result<axum::body::Bytes> {
    to_bytes(request.into_body(), BODY_LIMIT)
        .await
        .map_err(|e| MicropubError::InvalidRequest(format!("Failed to read body: {e}")))
}

/// Pull the `file` field out of a multipart upload, if present.
async fn read_file_field(request: Request) -> Result<Option<(String, String, Vec<u8>)>> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| MicropubError::InvalidRequest(format!("Failed to parse form data: {e}")))?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| MicropubError::InvalidRequest(format!("Failed to parse form data: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or("").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| MicropubError::InvalidRequest(format!("Failed to read file: {e}")))?
            .to_vec();
        return Ok(Some((name, mime_type, data)));
    }

    Ok(None)
}

fn header_value(request: &Request, name: header::HeaderName) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// The scheme the client reached us with: `X-Forwarded-Proto` when a
/// proxy reports it, `https` otherwise.
fn request_scheme(headers: &HeaderMap) -> &str {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("https")
}

/// The media type without parameters, lowercased.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}
