// SPDX-License-Identifier: Apache-2.0

//! Front-matter document codec.
//!
//! Posts are stored as `---\n<front-matter>\n---\n\n<body>`. The
//! front-matter dialect is a small YAML subset: scalars, inline and block
//! sequences, and one level of nested mappings. This is deliberately not a
//! full YAML parser; lines it does not recognize are reported through
//! `tracing` and skipped, because hand-authored posts are informally
//! structured. Round-tripping is guaranteed for anything [`serialize`]
//! emits.

use indexmap::IndexMap;
use tracing::warn;

/// Ordered front-matter mapping.
pub type Frontmatter = IndexMap<String, FieldValue>;

/// A front-matter field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Scalar(String),
    Sequence(Vec<String>),
    Mapping(IndexMap<String, FieldValue>),
}

impl FieldValue {
    pub fn scalar(s: impl Into<String>) -> Self {
        Self::Scalar(s.into())
    }

    pub fn sequence<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Sequence(items.into_iter().map(Into::into).collect())
    }
}

/// A parsed post: structured front-matter plus free-text body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructuredDocument {
    pub frontmatter: Frontmatter,
    pub body: String,
}

/// Parse a persisted document. Text without a leading front-matter block
/// yields an empty mapping and the whole text as body; this never errors.
pub fn parse(text: &str) -> StructuredDocument {
    let Some(rest) = text.strip_prefix("---\n") else {
        return StructuredDocument {
            frontmatter: Frontmatter::new(),
            body: text.to_string(),
        };
    };

    let (raw_frontmatter, raw_body) = if let Some(idx) = rest.find("\n---\n") {
        (&rest[..idx], &rest[idx + 5..])
    } else if let Some(stripped) = rest.strip_suffix("\n---") {
        (stripped, "")
    } else {
        // Unterminated front-matter block; treat the whole text as body.
        return StructuredDocument {
            frontmatter: Frontmatter::new(),
            body: text.to_string(),
        };
    };

    StructuredDocument {
        frontmatter: parse_frontmatter(raw_frontmatter),
        body: raw_body.trim().to_string(),
    }
}

/// Serialize a document back to canonical text.
///
/// Scalars are quoted only when they contain `:`, `#`, `'` or `"`;
/// sequence items are always quoted; nested mappings recurse with two
/// extra spaces of indentation. Field order follows the mapping's order.
pub fn serialize(document: &StructuredDocument) -> String {
    let mut out = String::from("---\n");
    out.push_str(&frontmatter_to_yaml(&document.frontmatter, 0));
    out.push_str("---\n");
    if !document.body.is_empty() {
        out.push('\n');
        out.push_str(&document.body);
        out.push('\n');
    }
    out
}

fn frontmatter_to_yaml(frontmatter: &Frontmatter, indent: usize) -> String {
    let prefix = "  ".repeat(indent);
    let mut yaml = String::new();

    for (key, value) in frontmatter {
        match value {
            FieldValue::Scalar(s) => {
                yaml.push_str(&format!("{prefix}{key}: {}\n", quote_scalar(s)));
            }
            FieldValue::Sequence(items) => {
                yaml.push_str(&format!("{prefix}{key}:\n"));
                for item in items {
                    yaml.push_str(&format!("{prefix}  - {}\n", quote_always(item)));
                }
            }
            FieldValue::Mapping(map) => {
                yaml.push_str(&format!("{prefix}{key}:\n"));
                yaml.push_str(&frontmatter_to_yaml(map, indent + 1));
            }
        }
    }

    yaml
}

fn quote_scalar(value: &str) -> String {
    let needs_quotes = value.contains(':')
        || value.contains('#')
        || value.contains('\'')
        || value.contains('"');
    if needs_quotes {
        quote_always(value)
    } else {
        value.to_string()
    }
}

fn quote_always(value: &str) -> String {
    // JSON string quoting doubles as YAML double-quote style here.
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

fn parse_frontmatter(yaml: &str) -> Frontmatter {
    let lines: Vec<&str> = yaml.lines().collect();
    let mut frontmatter = Frontmatter::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() {
            i += 1;
            continue;
        }

        let Some((key, value)) = split_key_line(line) else {
            warn!(line = %line, "Skipping unrecognized front-matter line");
            i += 1;
            continue;
        };

        if value.is_empty() || value == "[]" {
            // A bare header opens a block: sequence items, a nested
            // mapping, or nothing (empty sequence).
            let mut items = Vec::new();
            let mut j = i + 1;
            while j < lines.len() {
                let Some(item) = sequence_item(lines[j]) else {
                    break;
                };
                items.push(item);
                j += 1;
            }

            if !items.is_empty() || value == "[]" {
                frontmatter.insert(key.to_string(), FieldValue::Sequence(items));
                i = j;
                continue;
            }

            let mut nested = IndexMap::new();
            let mut j = i + 1;
            while j < lines.len() {
                let l = lines[j];
                let Some(inner) = l.strip_prefix("  ") else {
                    break;
                };
                let Some((k, v)) = split_key_line(inner) else {
                    break;
                };
                if v.is_empty() || v == "[]" {
                    // Deeper nesting is out of dialect
                    break;
                }
                nested.insert(k.to_string(), FieldValue::Scalar(unquote(v)));
                j += 1;
            }

            if nested.is_empty() {
                frontmatter.insert(key.to_string(), FieldValue::Sequence(Vec::new()));
                i += 1;
            } else {
                frontmatter.insert(key.to_string(), FieldValue::Mapping(nested));
                i = j;
            }
        } else if value.starts_with('[') && value.ends_with(']') {
            let items = value[1..value.len() - 1]
                .split(',')
                .map(|s| unquote(s.trim()))
                .filter(|s| !s.is_empty())
                .collect();
            frontmatter.insert(key.to_string(), FieldValue::Sequence(items));
            i += 1;
        } else {
            frontmatter.insert(key.to_string(), FieldValue::Scalar(unquote(value)));
            i += 1;
        }
    }

    frontmatter
}

/// Split `key: value` where the key is alphabetic with `_`/`-`, at the
/// start of the line. Returns the trimmed value remainder.
fn split_key_line(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let key = &line[..colon];
    if key.is_empty()
        || !key
            .chars()
            .all(|c| c.is_ascii_alphabetic() || c == '_' || c == '-')
    {
        return None;
    }
    Some((key, line[colon + 1..].trim()))
}

/// Match an indented `  - value` sequence item line.
fn sequence_item(line: &str) -> Option<String> {
    let trimmed = line.strip_prefix("  ")?.trim_start();
    let item = trimmed.strip_prefix("- ")?;
    Some(unquote(item.trim()))
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        // Double-quoted values were JSON-encoded by serialize
        serde_json::from_str::<String>(value)
            .unwrap_or_else(|_| value[1..value.len() - 1].to_string())
    } else if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        value[1..value.len() - 1].to_string()
    } else {
        value.to_string()
    }
}
