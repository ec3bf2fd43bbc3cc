// SPDX-License-Identifier: Apache-2.0

//! Post and media persistence through the GitLab repository-files API.
//!
//! The repository is the system of record: creates, updates and deletes
//! become commits on the configured branch. All calls are single-attempt;
//! any non-2xx response surfaces as [`MicropubError::Upstream`] and the
//! store's own concurrency control governs racing edits.

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::codec::{self, FieldValue, StructuredDocument};
use crate::config::Config;
use crate::entry::{CanonicalEntry, PropertyValue, UpdateOps};
use crate::error::{MicropubError, Result};
use crate::media::MediaObject;
use crate::patch;

/// Create/update/delete of posts, keyed by their public URL.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Create a post and return its public URL.
    async fn create(&self, entry: &CanonicalEntry) -> Result<String>;
    /// Apply update operations to the post published at `url`.
    async fn update(&self, url: &str, ops: UpdateOps<'_>) -> Result<()>;
    /// Delete the post published at `url`.
    async fn delete(&self, url: &str) -> Result<()>;
}

/// Persistence for validated media uploads.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Store the upload and return its public URL.
    async fn store(&self, media: &MediaObject) -> Result<String>;
}

/// One entry in a repository tree listing.
#[derive(Debug, Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// GitLab repository-files API response for a file read.
#[derive(Debug, Deserialize)]
struct FileResponse {
    content: String,
}

/// Thin client over the GitLab REST v4 repository API.
pub struct GitLabClient {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    token: String,
    branch: String,
}

impl GitLabClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.gitlab.base_url.clone(),
            project_id: config.gitlab.project_id.clone(),
            token: config.gitlab.token.clone(),
            branch: config.gitlab.branch.clone(),
        }
    }

    fn file_url(&self, path: &str) -> String {
        format!(
            "{}/api/v4/projects/{}/repository/files/{}",
            self.base_url,
            urlencoding::encode(&self.project_id),
            urlencoding::encode(path)
        )
    }

    async fn list_tree(&self, path: &str) -> Result<Vec<TreeEntry>> {
        let url = format!(
            "{}/api/v4/projects/{}/repository/tree?path={}&recursive=true&per_page=100",
            self.base_url,
            urlencoding::encode(&self.project_id),
            urlencoding::encode(path)
        );
        let response = self
            .http
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .map_err(|e| MicropubError::Upstream(format!("Failed to search repository: {e}")))?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| MicropubError::Upstream(format!("Failed to search repository: {e}")))
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        let url = format!("{}?ref={}", self.file_url(path), self.branch);
        let response = self
            .http
            .get(&url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .map_err(|e| MicropubError::Upstream(format!("Failed to fetch file: {e}")))?;
        let response = check_status(response).await?;
        let data: FileResponse = response
            .json()
            .await
            .map_err(|e| MicropubError::Upstream(format!("Failed to fetch file: {e}")))?;

        // GitLab returns file content base64-encoded
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(data.content.replace('\n', ""))
            .map_err(|e| MicropubError::Upstream(format!("Failed to decode file: {e}")))?;
        String::from_utf8(decoded)
            .map_err(|e| MicropubError::Upstream(format!("File is not valid UTF-8: {e}")))
    }

    async fn write_file(
        &self,
        method: reqwest::Method,
        path: &str,
        body: serde_json::Value,
    ) -> Result<()> {
        let response = self
            .http
            .request(method, self.file_url(path))
            .header("PRIVATE-TOKEN", &self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| MicropubError::Upstream(format!("GitLab request failed: {e}")))?;
        check_status(response).await?;
        Ok(())
    }

    async fn create_file(&self, path: &str, content: &str, message: &str) -> Result<()> {
        self.write_file(
            reqwest::Method::POST,
            path,
            json!({
                "branch": self.branch,
                "content": content,
                "commit_message": message,
                "encoding": "text",
            }),
        )
        .await
    }

    async fn create_binary_file(&self, path: &str, data: &[u8], message: &str) -> Result<()> {
        self.write_file(
            reqwest::Method::POST,
            path,
            json!({
                "branch": self.branch,
                "content": base64::engine::general_purpose::STANDARD.encode(data),
                "commit_message": message,
                "encoding": "base64",
            }),
        )
        .await
    }

    async fn update_file(&self, path: &str, content: &str, message: &str) -> Result<()> {
        self.write_file(
            reqwest::Method::PUT,
            path,
            json!({
                "branch": self.branch,
                "content": content,
                "commit_message": message,
                "encoding": "text",
            }),
        )
        .await
    }

    async fn delete_file(&self, path: &str, message: &str) -> Result<()> {
        self.write_file(
            reqwest::Method::DELETE,
            path,
            json!({
                "branch": self.branch,
                "commit_message": message,
            }),
        )
        .await
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(MicropubError::Upstream(format!(
        "GitLab API error: {} - {}",
        status.as_u16(),
        body
    )))
}

/// GitLab-backed post and media repository.
pub struct GitLabStore {
    client: GitLabClient,
    site_url: String,
    media_url: String,
    blog_path: String,
    media_path: String,
}

impl GitLabStore {
    pub fn new(config: &Config) -> Self {
        Self {
            client: GitLabClient::new(config),
            site_url: config.site_url.clone(),
            media_url: config.media_url.clone(),
            blog_path: config.gitlab.blog_path.clone(),
            media_path: config.gitlab.media_path.clone(),
        }
    }

    /// Map a public post URL to its repository file path. Posts live at
    /// `<blog_path>/<slug>.md` or `<blog_path>/<slug>/index.md`.
    async fn find_by_url(&self, url: &str) -> Result<String> {
        let slug = extract_slug_from_url(url, &self.site_url)
            .ok_or_else(|| MicropubError::Upstream("Invalid post URL".into()))?;

        let direct = format!("{}/{}.md", self.blog_path, slug);
        let index = format!("{}/{}/index.md", self.blog_path, slug);

        let files = self.client.list_tree(&self.blog_path).await?;
        for file in files {
            if file.kind != "blob" {
                continue;
            }
            if file.path == direct || file.path == index {
                debug!(url = %url, path = %file.path, "Resolved post file");
                return Ok(file.path);
            }
        }

        Err(MicropubError::Upstream("Post not found".into()))
    }
}

#[async_trait]
impl PostStore for GitLabStore {
    async fn create(&self, entry: &CanonicalEntry) -> Result<String> {
        let post = build_post(entry);
        let path = format!("{}/{}/{}.md", self.blog_path, post.year, post.slug);

        self.client
            .create_file(&path, &post.document, &format!("Add post: {}", post.title))
            .await?;

        let url = format!("{}/{}/", self.site_url, post.slug);
        info!(path = %path, url = %url, "Created post");
        Ok(url)
    }

    async fn update(&self, url: &str, ops: UpdateOps<'_>) -> Result<()> {
        let path = self.find_by_url(url).await?;
        let content = self.client.read_file(&path).await?;

        let document = codec::parse(&content);
        let updated = patch::apply(&document, &ops);
        let new_content = codec::serialize(&updated);

        let title = match updated.frontmatter.get("title") {
            Some(FieldValue::Scalar(t)) => t.clone(),
            _ => url.to_string(),
        };

        self.client
            .update_file(&path, &new_content, &format!("Update post: {title}"))
            .await?;
        info!(path = %path, url = %url, "Updated post");
        Ok(())
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let path = self.find_by_url(url).await?;
        self.client
            .delete_file(&path, &format!("Delete post: {url}"))
            .await?;
        info!(path = %path, url = %url, "Deleted post");
        Ok(())
    }
}

#[async_trait]
impl MediaStore for GitLabStore {
    async fn store(&self, media: &MediaObject) -> Result<String> {
        let path = format!("{}/{}", self.media_path, media.key);
        let message = format!(
            "Add media: {} ({}, originally {})",
            media.key, media.mime_type, media.original_name
        );
        self.client
            .create_binary_file(&path, &media.data, &message)
            .await?;

        let url = format!("{}/{}", self.media_url, media.key);
        info!(path = %path, url = %url, "Stored media");
        Ok(url)
    }
}

/// A post built from a create request, ready to commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub slug: String,
    pub year: i32,
    pub title: String,
    pub document: String,
}

/// Build the document for a create request: mapped front-matter, photo
/// references ahead of the text content.
pub fn build_post(entry: &CanonicalEntry) -> NewPost {
    let name = entry.first("name").filter(|s| !s.is_empty());
    let published = parse_published(entry.first("published"));

    let slug = entry
        .first("mp-slug")
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| generate_slug(name, published));

    let title = name
        .map(str::to_string)
        .unwrap_or_else(|| format!("Note: {}", published.format("%B %-d, %Y")));

    let mut frontmatter = crate::codec::Frontmatter::new();
    frontmatter.insert("title".to_string(), FieldValue::scalar(title.clone()));
    frontmatter.insert(
        "date".to_string(),
        FieldValue::scalar(published.format("%Y-%m-%d").to_string()),
    );
    if let Some(summary) = entry.first("summary").filter(|s| !s.is_empty()) {
        frontmatter.insert("description".to_string(), FieldValue::scalar(summary));
    }
    if let Some(categories) = entry.properties.get("category") {
        if !categories.is_empty() {
            frontmatter.insert(
                "tags".to_string(),
                FieldValue::Sequence(
                    categories.iter().map(|v| v.as_text().to_string()).collect(),
                ),
            );
        }
    }
    if let Some(reply_to) = entry.first("in-reply-to").filter(|s| !s.is_empty()) {
        frontmatter.insert("in-reply-to".to_string(), FieldValue::scalar(reply_to));
    }

    let mut body = String::new();
    if let Some(photos) = entry.properties.get("photo") {
        for photo in photos {
            let (url, alt) = photo.as_media();
            body.push_str(&format!("![{alt}]({url})\n\n"));
        }
    }
    body.push_str(
        entry
            .properties
            .get("content")
            .and_then(|v| v.first())
            .map(PropertyValue::as_text)
            .unwrap_or(""),
    );

    let document = codec::serialize(&StructuredDocument {
        frontmatter,
        body: body.trim_end().to_string(),
    });

    NewPost {
        slug,
        year: published.year(),
        title,
        document,
    }
}

/// Derive a URL slug from a title, or `note-<epochMillis>` when there is
/// no usable title: lowercase, non-alphanumeric runs collapse to a single
/// hyphen, no leading/trailing hyphens, at most 50 characters.
pub fn generate_slug(title: Option<&str>, published: DateTime<Utc>) -> String {
    if let Some(title) = title {
        let slug = slugify(title);
        if !slug.is_empty() {
            return slug;
        }
    }
    format!("note-{}", published.timestamp_millis())
}

fn slugify(title: &str) -> String {
    let mut slug = String::new();
    let mut pending_hyphen = false;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(c);
            pending_hyphen = false;
        } else {
            pending_hyphen = true;
        }
    }
    slug.truncate(50);
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Extract the slug from a public post URL; `None` when the URL is not on
/// this site or has no path.
pub fn extract_slug_from_url(url: &str, site_url: &str) -> Option<String> {
    let post = Url::parse(url).ok()?;
    let base = Url::parse(site_url).ok()?;
    if post.host_str()? != base.host_str()? || post.port() != base.port() {
        return None;
    }
    let slug = post.path().trim_matches('/');
    if slug.is_empty() {
        None
    } else {
        Some(slug.to_string())
    }
}

fn parse_published(value: Option<&str>) -> DateTime<Utc> {
    let Some(value) = value.filter(|s| !s.is_empty()) else {
        return Utc::now();
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(ndt) = date.and_hms_opt(0, 0, 0) {
            return DateTime::from_naive_utc_and_offset(ndt, Utc);
        }
    }
    Utc::now()
}
