// SPDX-License-Identifier: Apache-2.0

//! Configuration for the Micropub endpoint.
//!
//! Everything is loadable from environment variables; defaults match the
//! production deployment for pulletsforever.com.

use serde::{Deserialize, Serialize};

/// Configuration for the Micropub endpoint service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Canonical site URL; the token's `me` must normalize to this
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// Public base URL for uploaded media
    #[serde(default = "default_media_url")]
    pub media_url: String,

    /// IndieAuth token verification endpoint
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,

    /// GitLab file-store configuration
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// Media upload configuration
    #[serde(default)]
    pub media: MediaConfig,
}

/// GitLab repository-files API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabConfig {
    /// GitLab instance base URL (default: https://gitlab.com)
    #[serde(default = "default_gitlab_url")]
    pub base_url: String,

    /// Project identifier (numeric id or `group/project`)
    #[serde(default)]
    pub project_id: String,

    /// Private token for the API
    #[serde(default)]
    pub token: String,

    /// Target branch (default: main)
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Directory holding post sources (default: src/posts)
    #[serde(default = "default_blog_path")]
    pub blog_path: String,

    /// Directory holding uploaded media (default: src/media)
    #[serde(default = "default_media_path")]
    pub media_path: String,
}

/// Media upload configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Maximum upload size in bytes (default: 10 MiB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: usize,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_site_url() -> String {
    "https://pulletsforever.com".to_string()
}

fn default_media_url() -> String {
    "https://media.pulletsforever.com".to_string()
}

fn default_token_endpoint() -> String {
    "https://indieauth.com/token".to_string()
}

fn default_gitlab_url() -> String {
    "https://gitlab.com".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_blog_path() -> String {
    "src/posts".to_string()
}

fn default_media_path() -> String {
    "src/media".to_string()
}

fn default_max_file_size() -> usize {
    10 * 1024 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            site_url: default_site_url(),
            media_url: default_media_url(),
            token_endpoint: default_token_endpoint(),
            gitlab: GitLabConfig::default(),
            media: MediaConfig::default(),
        }
    }
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            base_url: default_gitlab_url(),
            project_id: String::new(),
            token: String::new(),
            branch: default_branch(),
            blog_path: default_blog_path(),
            media_path: default_media_path(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(default_bind_addr),
            site_url: var("SITE_URL").unwrap_or_else(default_site_url),
            media_url: var("MEDIA_URL").unwrap_or_else(default_media_url),
            token_endpoint: var("TOKEN_ENDPOINT").unwrap_or_else(default_token_endpoint),
            gitlab: GitLabConfig {
                base_url: var("GITLAB_URL").unwrap_or_else(default_gitlab_url),
                project_id: var("GITLAB_PROJECT_ID").unwrap_or_default(),
                token: var("GITLAB_TOKEN").unwrap_or_default(),
                branch: var("GITLAB_BRANCH").unwrap_or_else(default_branch),
                blog_path: var("BLOG_PATH").unwrap_or_else(default_blog_path),
                media_path: var("MEDIA_PATH").unwrap_or_else(default_media_path),
            },
            media: MediaConfig {
                max_file_size: var("MAX_FILE_SIZE")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or_else(default_max_file_size),
            },
        }
    }
}
