// SPDX-License-Identifier: Apache-2.0

//! Request normalization into a canonical Micropub entry.
//!
//! Micropub accepts three wire encodings (JSON, form-urlencoded,
//! multipart). All three are folded into [`CanonicalEntry`], in which every
//! property value is a sequence; downstream code never sees bare scalars.
//!
//! <https://www.w3.org/TR/micropub/#create>

use axum::extract::Multipart;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MicropubError, Result};

/// Property name → ordered values, preserving encounter order.
pub type PropertyMap = IndexMap<String, Vec<PropertyValue>>;

/// One Micropub property value.
///
/// The wire format is duck-typed: a value is a bare string, an object
/// carrying rendered HTML, or a media reference with an optional alt text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Html(HtmlContent),
    Media(MediaReference),
}

/// Rich content: `{"html": "...", "value": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtmlContent {
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Media reference: `{"value"|"url": "...", "alt": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

impl PropertyValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Textual rendering: plain text as-is, rich content prefers the HTML
    /// form, media references collapse to their URL.
    pub fn as_text(&self) -> &str {
        match self {
            Self::Text(s) => s,
            Self::Html(h) => &h.html,
            Self::Media(m) => m.value.as_deref().or(m.url.as_deref()).unwrap_or(""),
        }
    }

    /// URL and alt text, for photo-type properties.
    pub fn as_media(&self) -> (&str, &str) {
        match self {
            Self::Text(s) => (s, ""),
            Self::Media(m) => (
                m.value.as_deref().or(m.url.as_deref()).unwrap_or(""),
                m.alt.as_deref().unwrap_or(""),
            ),
            Self::Html(_) => ("", ""),
        }
    }
}

/// Micropub action, defaulting to `create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(MicropubError::InvalidRequest(format!(
                "Unknown action: {other}"
            ))),
        }
    }
}

/// Delete operations: either whole properties or specific values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeleteOps {
    Properties(Vec<String>),
    Values(PropertyMap),
}

/// The normalized representation of one Micropub request.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEntry {
    /// Microformat vocabulary type, e.g. `h-entry`
    pub entry_type: String,
    pub action: Action,
    /// Target post URL, for update/delete
    pub url: Option<String>,
    pub properties: PropertyMap,
    pub replace: Option<PropertyMap>,
    pub add: Option<PropertyMap>,
    pub delete: Option<DeleteOps>,
}

/// Borrowed view of an entry's update operation sets.
#[derive(Debug, Clone, Copy)]
pub struct UpdateOps<'a> {
    pub replace: Option<&'a PropertyMap>,
    pub add: Option<&'a PropertyMap>,
    pub delete: Option<&'a DeleteOps>,
}

impl UpdateOps<'_> {
    pub fn is_empty(&self) -> bool {
        self.replace.is_none() && self.add.is_none() && self.delete.is_none()
    }
}

impl CanonicalEntry {
    pub fn update_ops(&self) -> UpdateOps<'_> {
        UpdateOps {
            replace: self.replace.as_ref(),
            add: self.add.as_ref(),
            delete: self.delete.as_ref(),
        }
    }

    /// First value of a property, rendered as text.
    pub fn first(&self, property: &str) -> Option<&str> {
        self.properties
            .get(property)
            .and_then(|values| values.first())
            .map(PropertyValue::as_text)
    }
}

/// JSON request shape: properties are already sequence-valued.
#[derive(Debug, Deserialize)]
struct JsonRequest {
    #[serde(rename = "type")]
    entry_type: Option<Vec<String>>,
    action: Option<String>,
    url: Option<String>,
    properties: Option<PropertyMap>,
    replace: Option<PropertyMap>,
    add: Option<PropertyMap>,
    delete: Option<DeleteOps>,
}

/// Normalize a JSON body.
pub fn from_json(body: &[u8]) -> Result<CanonicalEntry> {
    let request: JsonRequest = serde_json::from_slice(body)
        .map_err(|e| MicropubError::InvalidRequest(format!("Invalid JSON body: {e}")))?;

    let action = match request.action.as_deref() {
        Some(s) => Action::parse(s)?,
        None => Action::Create,
    };

    let entry_type = request
        .entry_type
        .and_then(|t| t.into_iter().next())
        .unwrap_or_else(|| "h-entry".to_string());

    if action == Action::Create && request.properties.is_none() {
        return Err(MicropubError::InvalidRequest(
            "Create request missing 'properties'".into(),
        ));
    }

    Ok(CanonicalEntry {
        entry_type,
        action,
        url: request.url,
        properties: request.properties.unwrap_or_default(),
        replace: request.replace,
        add: request.add,
        delete: request.delete,
    })
}

/// Normalize a form-urlencoded body.
pub fn from_form(body: &[u8]) -> Result<CanonicalEntry> {
    let pairs = url::form_urlencoded::parse(body)
        .map(|(k, v)| (k.into_owned(), v.into_owned()));
    from_pairs(pairs)
}

/// Normalize a multipart body, folding text fields like form fields.
/// File-bearing fields are skipped; binary uploads belong to the media
/// endpoint.
pub async fn from_multipart(mut multipart: Multipart) -> Result<CanonicalEntry> {
    let mut pairs = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| MicropubError::InvalidRequest(format!("Failed to parse form data: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        if field.file_name().is_some() {
            warn!(field = %name, "Skipping file field in micropub body");
            continue;
        }
        let value = field
            .text()
            .await
            .map_err(|e| MicropubError::InvalidRequest(format!("Failed to read field: {e}")))?;
        pairs.push((name, value));
    }
    from_pairs(pairs)
}

/// Fold `(key, value)` pairs into a canonical entry.
///
/// `h` sets the type, `action`/`url` are lifted to top level, a `[]`
/// suffix marks repeatable keys, and everything else accumulates under
/// `properties` in encounter order.
pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Result<CanonicalEntry> {
    let mut entry_type = "h-entry".to_string();
    let mut action = None;
    let mut url = None;
    let mut properties = PropertyMap::new();

    for (key, value) in pairs {
        match key.as_str() {
            "h" => {
                entry_type = format!("h-{value}");
            }
            "action" => {
                action = Some(Action::parse(&value)?);
            }
            "url" => {
                url = Some(value);
            }
            _ => {
                let property = key.strip_suffix("[]").unwrap_or(&key).to_string();
                properties
                    .entry(property)
                    .or_default()
                    .push(PropertyValue::Text(value));
            }
        }
    }

    Ok(CanonicalEntry {
        entry_type,
        action: action.unwrap_or(Action::Create),
        url,
        properties,
        replace: None,
        add: None,
        delete: None,
    })
}
