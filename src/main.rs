// SPDX-License-Identifier: Apache-2.0

//! Micropub publishing endpoint
//!
//! An HTTP service implementing the W3C Micropub protocol for a statically
//! generated blog stored in a GitLab repository:
//!
//! - `POST /micropub` — create/update/delete posts (IndieAuth bearer token)
//! - `GET /micropub?q=…` — configuration queries
//! - `POST /media` — media uploads
//!
//! ## Configuration
//!
//! Loaded from environment variables:
//!
//! - `BIND_ADDR`: server bind address (default: 0.0.0.0:8080)
//! - `SITE_URL`: canonical site URL the token's `me` must match
//! - `MEDIA_URL`: public base URL for uploaded media
//! - `TOKEN_ENDPOINT`: IndieAuth token endpoint (default: https://indieauth.com/token)
//! - `GITLAB_URL`, `GITLAB_PROJECT_ID`, `GITLAB_TOKEN`, `GITLAB_BRANCH`:
//!   remote store coordinates
//! - `BLOG_PATH`, `MEDIA_PATH`: repository directories for posts and media
//! - `MAX_FILE_SIZE`: media upload cap in bytes (default: 10 MiB)

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use micropub_endpoint::auth::IndieAuthVerifier;
use micropub_endpoint::config::Config;
use micropub_endpoint::handlers::{router, AppState};
use micropub_endpoint::store::GitLabStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Load configuration
    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        site_url = %config.site_url,
        token_endpoint = %config.token_endpoint,
        blog_path = %config.gitlab.blog_path,
        "Starting Micropub endpoint"
    );
    if config.gitlab.project_id.is_empty() || config.gitlab.token.is_empty() {
        warn!("GITLAB_PROJECT_ID or GITLAB_TOKEN unset; repository writes will fail");
    }

    // Create application state
    let verifier = Arc::new(IndieAuthVerifier::new(
        config.token_endpoint.clone(),
        config.site_url.clone(),
    ));
    let store = Arc::new(GitLabStore::new(&config));

    let state = AppState::new(verifier, store.clone(), store, config.clone());

    // Build router and start server
    let app = router(state);
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
