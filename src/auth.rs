// SPDX-License-Identifier: Apache-2.0

//! IndieAuth bearer-token verification.
//!
//! Each request re-verifies its token against the configured token
//! endpoint; there is no caching. The returned `me` identity must
//! normalize to the configured site URL.
//!
//! <https://indieauth.spec.indieweb.org/#token-verification>

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{MicropubError, Result};

/// A verified credential: who the bearer is and what they may do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Canonical identity URL asserted by the token endpoint
    pub me: String,
    /// Granted scopes (whitespace-split), e.g. `create`, `update`
    pub scopes: Vec<String>,
    /// Client that obtained the token, if reported
    pub client_id: Option<String>,
}

impl Credential {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

/// Verifies an `Authorization` header into a [`Credential`].
///
/// A trait so the router can be exercised with a stub verifier in tests.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, authorization: Option<&str>) -> Result<Credential>;
}

/// Token endpoint introspection response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    me: Option<String>,
    scope: Option<String>,
    client_id: Option<String>,
}

/// Production verifier backed by an IndieAuth token endpoint.
pub struct IndieAuthVerifier {
    http: reqwest::Client,
    token_endpoint: String,
    site_url: String,
}

impl IndieAuthVerifier {
    pub fn new(token_endpoint: String, site_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_endpoint,
            site_url,
        }
    }
}

#[async_trait]
impl TokenVerifier for IndieAuthVerifier {
    async fn verify(&self, authorization: Option<&str>) -> Result<Credential> {
        let header = authorization
            .ok_or_else(|| MicropubError::Unauthorized("Missing Authorization header".into()))?;

        let token = parse_bearer(header).ok_or_else(|| {
            MicropubError::Unauthorized("Invalid Authorization header format".into())
        })?;

        // Transport failures surface as a rejected credential, never a panic.
        let response = self
            .http
            .get(&self.token_endpoint)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| MicropubError::Unauthorized(format!("Token verification error: {e}")))?;

        if !response.status().is_success() {
            return Err(MicropubError::Unauthorized(format!(
                "Token verification failed: {}",
                response.status().as_u16()
            )));
        }

        let data: TokenResponse = response
            .json()
            .await
            .map_err(|e| MicropubError::Unauthorized(format!("Token verification error: {e}")))?;

        let me = data
            .me
            .ok_or_else(|| MicropubError::Unauthorized("Token response missing 'me' field".into()))?;

        let me_normalized = normalize_url(&me);
        let site_normalized = normalize_url(&self.site_url);
        if me_normalized != site_normalized {
            return Err(MicropubError::Unauthorized(format!(
                "Token 'me' ({}) does not match site URL ({})",
                me, self.site_url
            )));
        }

        let scopes: Vec<String> = data
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        debug!(me = %me, scopes = ?scopes, "Token verified");

        Ok(Credential {
            me,
            scopes,
            client_id: data.client_id,
        })
    }
}

/// Extract the token from a `Bearer <token>` header (case-insensitive).
pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

/// Normalize a URL for identity comparison: keep the scheme, lowercase the
/// host, strip the trailing slash from the path. Unparseable input is
/// compared verbatim.
pub fn normalize_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or("").to_lowercase();
            let port = parsed
                .port()
                .map(|p| format!(":{p}"))
                .unwrap_or_default();
            let path = parsed.path().trim_end_matches('/');
            format!("{}://{}{}{}", parsed.scheme(), host, port, path)
        }
        Err(_) => url.to_string(),
    }
}
