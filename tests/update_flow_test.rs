// SPDX-License-Identifier: Apache-2.0

//! End-to-end update and delete flows: the router drives a store backed by
//! an in-memory document map, so requests flow through normalization,
//! front-matter parsing, patching and re-serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use tower::ServiceExt;

use micropub_endpoint::auth::{Credential, TokenVerifier};
use micropub_endpoint::entry::{CanonicalEntry, UpdateOps};
use micropub_endpoint::error::{MicropubError, Result};
use micropub_endpoint::handlers::{router, AppState};
use micropub_endpoint::media::MediaObject;
use micropub_endpoint::store::{MediaStore, PostStore};
use micropub_endpoint::codec::{self, FieldValue};
use micropub_endpoint::{patch, Config};

struct AllScopesVerifier;

#[async_trait]
impl TokenVerifier for AllScopesVerifier {
    async fn verify(&self, authorization: Option<&str>) -> Result<Credential> {
        authorization
            .ok_or_else(|| MicropubError::Unauthorized("Missing Authorization header".into()))?;
        Ok(Credential {
            me: "https://pulletsforever.com".to_string(),
            scopes: vec!["create".into(), "update".into(), "delete".into()],
            client_id: None,
        })
    }
}

/// Post store over an in-memory URL → document map. Updates run the same
/// parse/patch/serialize pipeline the repository-backed store uses.
#[derive(Default)]
struct MemoryStore {
    docs: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    fn with_doc(url: &str, text: &str) -> Arc<Self> {
        let store = Self::default();
        store
            .docs
            .lock()
            .unwrap()
            .insert(url.to_string(), text.to_string());
        Arc::new(store)
    }

    fn document(&self, url: &str) -> Option<String> {
        self.docs.lock().unwrap().get(url).cloned()
    }
}

#[async_trait]
impl PostStore for MemoryStore {
    async fn create(&self, _entry: &CanonicalEntry) -> Result<String> {
        Ok("https://pulletsforever.com/new-post/".to_string())
    }

    async fn update(&self, url: &str, ops: UpdateOps<'_>) -> Result<()> {
        let mut docs = self.docs.lock().unwrap();
        let text = docs
            .get(url)
            .ok_or_else(|| MicropubError::Upstream("Post not found".into()))?;
        let document = codec::parse(text);
        let updated = patch::apply(&document, &ops);
        docs.insert(url.to_string(), codec::serialize(&updated));
        Ok(())
    }

    async fn delete(&self, url: &str) -> Result<()> {
        self.docs
            .lock()
            .unwrap()
            .remove(url)
            .map(|_| ())
            .ok_or_else(|| MicropubError::Upstream("Post not found".into()))
    }
}

#[async_trait]
impl MediaStore for MemoryStore {
    async fn store(&self, media: &MediaObject) -> Result<String> {
        Ok(format!("https://media.pulletsforever.com/{}", media.key))
    }
}

fn service(store: Arc<MemoryStore>) -> axum::Router {
    let state = AppState::new(
        Arc::new(AllScopesVerifier),
        store.clone(),
        store,
        Config::default(),
    );
    router(state)
}

async fn post_json(app: axum::Router, body: serde_json::Value) -> axum::response::Response {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri("/micropub")
            .header(header::AUTHORIZATION, "Bearer token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

const POST_URL: &str = "https://pulletsforever.com/my-post/";

const SEED: &str = "---\n\
title: \"Old Title\"\n\
date: \"2024-01-15\"\n\
tags:\n  - \"indieweb\"\n  - \"rust\"\n\
---\n\
\n\
Original body text.\n";

#[tokio::test]
async fn test_replace_title_leaves_rest_intact() {
    let store = MemoryStore::with_doc(POST_URL, SEED);
    let response = post_json(
        service(store.clone()),
        serde_json::json!({
            "action": "update",
            "url": POST_URL,
            "replace": {"name": ["New Title"]},
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let text = store.document(POST_URL).unwrap();
    let document = codec::parse(&text);
    assert_eq!(
        document.frontmatter.get("title"),
        Some(&FieldValue::scalar("New Title"))
    );
    assert_eq!(
        document.frontmatter.get("date"),
        Some(&FieldValue::scalar("2024-01-15"))
    );
    assert_eq!(
        document.frontmatter.get("tags"),
        Some(&FieldValue::sequence(["indieweb", "rust"]))
    );
    assert_eq!(document.body, "Original body text.");
}

#[tokio::test]
async fn test_replace_content_rewrites_body() {
    let store = MemoryStore::with_doc(POST_URL, SEED);
    let response = post_json(
        service(store.clone()),
        serde_json::json!({
            "action": "update",
            "url": POST_URL,
            "replace": {"content": ["Fresh body."]},
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let document = codec::parse(&store.document(POST_URL).unwrap());
    assert_eq!(document.body, "Fresh body.");
    assert_eq!(
        document.frontmatter.get("title"),
        Some(&FieldValue::scalar("Old Title"))
    );
}

#[tokio::test]
async fn test_add_category_appends_tag() {
    let store = MemoryStore::with_doc(POST_URL, SEED);
    let response = post_json(
        service(store.clone()),
        serde_json::json!({
            "action": "update",
            "url": POST_URL,
            "add": {"category": ["webdev"]},
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let document = codec::parse(&store.document(POST_URL).unwrap());
    assert_eq!(
        document.frontmatter.get("tags"),
        Some(&FieldValue::sequence(["indieweb", "rust", "webdev"]))
    );
}

#[tokio::test]
async fn test_delete_last_tag_removes_field() {
    let store = MemoryStore::with_doc(
        POST_URL,
        "---\ntitle: \"T\"\ntags:\n  - \"only\"\n---\n\nBody.\n",
    );
    let response = post_json(
        service(store.clone()),
        serde_json::json!({
            "action": "update",
            "url": POST_URL,
            "delete": {"category": ["only"]},
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let document = codec::parse(&store.document(POST_URL).unwrap());
    assert!(!document.frontmatter.contains_key("tags"));
    assert_eq!(
        document.frontmatter.get("title"),
        Some(&FieldValue::scalar("T"))
    );
}

#[tokio::test]
async fn test_delete_whole_property() {
    let store = MemoryStore::with_doc(POST_URL, SEED);
    let response = post_json(
        service(store.clone()),
        serde_json::json!({
            "action": "update",
            "url": POST_URL,
            "delete": ["category"],
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let document = codec::parse(&store.document(POST_URL).unwrap());
    assert!(!document.frontmatter.contains_key("tags"));
}

#[tokio::test]
async fn test_combined_ops_apply_in_fixed_order() {
    let store = MemoryStore::with_doc(POST_URL, SEED);
    let response = post_json(
        service(store.clone()),
        serde_json::json!({
            "action": "update",
            "url": POST_URL,
            "replace": {"name": ["Renamed"]},
            "add": {"category": ["extra"]},
            "delete": {"category": ["rust"]},
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let document = codec::parse(&store.document(POST_URL).unwrap());
    assert_eq!(
        document.frontmatter.get("title"),
        Some(&FieldValue::scalar("Renamed"))
    );
    assert_eq!(
        document.frontmatter.get("tags"),
        Some(&FieldValue::sequence(["indieweb", "extra"]))
    );
}

#[tokio::test]
async fn test_update_missing_post_is_500() {
    let store = Arc::new(MemoryStore::default());
    let response = post_json(
        service(store),
        serde_json::json!({
            "action": "update",
            "url": "https://pulletsforever.com/nowhere/",
            "replace": {"name": ["X"]},
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["error"], "server_error");
}

#[tokio::test]
async fn test_delete_removes_post() {
    let store = MemoryStore::with_doc(POST_URL, SEED);
    let response = post_json(
        service(store.clone()),
        serde_json::json!({
            "action": "delete",
            "url": POST_URL,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.document(POST_URL).is_none());
}

#[tokio::test]
async fn test_updated_document_round_trips() {
    let store = MemoryStore::with_doc(POST_URL, SEED);
    let response = post_json(
        service(store.clone()),
        serde_json::json!({
            "action": "update",
            "url": POST_URL,
            "replace": {"summary": ["A short description"]},
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let text = store.document(POST_URL).unwrap();
    let reparsed = codec::parse(&text);
    assert_eq!(codec::serialize(&reparsed), text);
    assert_eq!(
        reparsed.frontmatter.get("description"),
        Some(&FieldValue::scalar("A short description"))
    );
}
