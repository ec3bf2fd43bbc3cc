// SPDX-License-Identifier: Apache-2.0

//! Media upload validation and key generation.
//!
//! Uploads pass a fixed MIME allow-list and a configured size cap before
//! they are handed to the repository adapter for persistence.
//!
//! <https://www.w3.org/TR/micropub/#media-endpoint>

use chrono::Utc;

use crate::error::{MicropubError, Result};

/// Allowed MIME types. SVG is excluded: it can carry executable script.
const ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/heic",
    "image/heif",
    "video/mp4",
    "video/webm",
    "video/quicktime",
    "audio/mpeg",
    "audio/mp4",
    "audio/ogg",
];

/// A validated upload, ready for persistence. Never mutated afterward.
#[derive(Debug, Clone)]
pub struct MediaObject {
    /// Generated storage key: `<epochMillis>-<8hexrandom>.<ext>`
    pub key: String,
    pub mime_type: String,
    pub original_name: String,
    pub data: Vec<u8>,
}

pub fn is_allowed(mime_type: &str) -> bool {
    ALLOWED_TYPES.contains(&mime_type)
}

/// Validate an upload against the allow-list and size cap, generating a
/// collision-resistant storage key on success.
pub fn validate_upload(
    mime_type: &str,
    original_name: &str,
    data: Vec<u8>,
    max_size: usize,
) -> Result<MediaObject> {
    if !is_allowed(mime_type) {
        return Err(MicropubError::InvalidRequest(format!(
            "File type '{mime_type}' is not allowed. Supported types: images, video, audio"
        )));
    }

    if data.len() > max_size {
        return Err(MicropubError::PayloadTooLarge(format!(
            "File size {} exceeds maximum {}",
            format_bytes(data.len()),
            format_bytes(max_size)
        )));
    }

    Ok(MediaObject {
        key: generate_key(mime_type, original_name),
        mime_type: mime_type.to_string(),
        original_name: original_name.to_string(),
        data,
    })
}

/// Build a storage key: epoch milliseconds, an 8-hex-digit random suffix,
/// and an extension derived from the MIME type, falling back to the
/// original name's extension, falling back to `bin`.
pub fn generate_key(mime_type: &str, original_name: &str) -> String {
    let extension = extension_for_mime(mime_type)
        .map(str::to_string)
        .or_else(|| extension_from_name(original_name))
        .unwrap_or_else(|| "bin".to_string());
    let timestamp = Utc::now().timestamp_millis();
    let random: u32 = rand::random();
    format!("{timestamp}-{random:08x}.{extension}")
}

fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let ext = match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/heic" => "heic",
        "image/heif" => "heif",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        "audio/mpeg" => "mp3",
        "audio/mp4" => "m4a",
        "audio/ogg" => "ogg",
        _ => return None,
    };
    Some(ext)
}

fn extension_from_name(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_lowercase())
    }
}

fn format_bytes(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
