// SPDX-License-Identifier: Apache-2.0

//! Micropub update operations against a structured document.
//!
//! Pure diff/patch algebra: [`apply`] takes a document and a set of
//! replace/add/delete operations and returns a new document. Micropub
//! property names are mapped to front-matter field names first, and the
//! `content` property targets the body rather than the front-matter.
//!
//! <https://www.w3.org/TR/micropub/#update>

use crate::codec::{FieldValue, StructuredDocument};
use crate::entry::{DeleteOps, PropertyMap, PropertyValue, UpdateOps};

/// Map a Micropub property name to its front-matter field name.
/// Unmapped properties pass through unchanged. This table is a fixed
/// contract with the site generator, not configuration.
pub fn map_property(property: &str) -> &str {
    match property {
        "name" => "title",
        "category" => "tags",
        "summary" => "description",
        "published" => "date",
        other => other,
    }
}

/// Apply replace, add and delete operation sets, in that fixed order.
/// The input document is never mutated.
pub fn apply(document: &StructuredDocument, ops: &UpdateOps<'_>) -> StructuredDocument {
    let mut frontmatter = document.frontmatter.clone();
    let mut body = document.body.clone();

    if let Some(replace) = ops.replace {
        apply_replace(&mut frontmatter, &mut body, replace);
    }
    if let Some(add) = ops.add {
        apply_add(&mut frontmatter, &mut body, add);
    }
    if let Some(delete) = ops.delete {
        apply_delete(&mut frontmatter, &mut body, delete);
    }

    StructuredDocument { frontmatter, body }
}

fn apply_replace(
    frontmatter: &mut crate::codec::Frontmatter,
    body: &mut String,
    replace: &PropertyMap,
) {
    for (property, values) in replace {
        if property == "content" {
            *body = values
                .first()
                .map(|v| v.as_text().to_string())
                .unwrap_or_default();
        } else {
            let key = map_property(property);
            frontmatter.insert(key.to_string(), collapse(values));
        }
    }
}

fn apply_add(frontmatter: &mut crate::codec::Frontmatter, body: &mut String, add: &PropertyMap) {
    for (property, values) in add {
        if property == "content" {
            let text = values.first().map(PropertyValue::as_text).unwrap_or("");
            if body.is_empty() {
                *body = text.to_string();
            } else {
                body.push_str("\n\n");
                body.push_str(text);
            }
            continue;
        }

        let key = map_property(property).to_string();
        let to_add: Vec<String> = values.iter().map(|v| v.as_text().to_string()).collect();

        match frontmatter.get_mut(&key) {
            Some(slot) => {
                *slot = match std::mem::replace(slot, FieldValue::Scalar(String::new())) {
                    FieldValue::Sequence(mut seq) => {
                        seq.extend(to_add);
                        FieldValue::Sequence(seq)
                    }
                    FieldValue::Scalar(existing) => {
                        let mut seq = vec![existing];
                        seq.extend(to_add);
                        FieldValue::Sequence(seq)
                    }
                    // Structured fields cannot accumulate values
                    FieldValue::Mapping(_) => collapse_strings(to_add),
                };
            }
            None => {
                frontmatter.insert(key, collapse_strings(to_add));
            }
        }
    }
}

fn apply_delete(
    frontmatter: &mut crate::codec::Frontmatter,
    body: &mut String,
    delete: &DeleteOps,
) {
    match delete {
        DeleteOps::Properties(properties) => {
            for property in properties {
                if property == "content" {
                    body.clear();
                } else {
                    frontmatter.shift_remove(map_property(property));
                }
            }
        }
        DeleteOps::Values(map) => {
            for (property, values) in map {
                if property == "content" {
                    body.clear();
                    continue;
                }
                let key = map_property(property);
                let to_remove: Vec<&str> = values.iter().map(PropertyValue::as_text).collect();

                match frontmatter.get(key) {
                    Some(FieldValue::Sequence(seq)) => {
                        let remaining: Vec<String> = seq
                            .iter()
                            .filter(|v| !to_remove.contains(&v.as_str()))
                            .cloned()
                            .collect();
                        if remaining.is_empty() {
                            frontmatter.shift_remove(key);
                        } else {
                            frontmatter
                                .insert(key.to_string(), FieldValue::Sequence(remaining));
                        }
                    }
                    Some(FieldValue::Scalar(s)) => {
                        if to_remove.contains(&s.as_str()) {
                            frontmatter.shift_remove(key);
                        }
                    }
                    Some(FieldValue::Mapping(_)) | None => {}
                }
            }
        }
    }
}

/// Single-element sequences collapse to a scalar; multi-element sequences
/// stay sequences.
fn collapse(values: &[PropertyValue]) -> FieldValue {
    collapse_strings(values.iter().map(|v| v.as_text().to_string()).collect())
}

fn collapse_strings(texts: Vec<String>) -> FieldValue {
    if texts.len() == 1 {
        FieldValue::Scalar(texts.into_iter().next().unwrap_or_default())
    } else {
        FieldValue::Sequence(texts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{HtmlContent, PropertyValue};
    use indexmap::IndexMap;

    fn doc(fields: Vec<(&str, FieldValue)>, body: &str) -> StructuredDocument {
        StructuredDocument {
            frontmatter: fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            body: body.to_string(),
        }
    }

    fn props(entries: Vec<(&str, Vec<&str>)>) -> PropertyMap {
        entries
            .into_iter()
            .map(|(k, vs)| {
                (
                    k.to_string(),
                    vs.into_iter().map(PropertyValue::text).collect(),
                )
            })
            .collect()
    }

    fn replace_ops(map: &PropertyMap) -> UpdateOps<'_> {
        UpdateOps {
            replace: Some(map),
            add: None,
            delete: None,
        }
    }

    #[test]
    fn test_replace_existing_property() {
        let d = doc(
            vec![
                ("title", FieldValue::scalar("Old Title")),
                ("date", FieldValue::scalar("2024-01-01")),
            ],
            "Content",
        );
        let ops = props(vec![("name", vec!["New Title"])]);
        let result = apply(&d, &replace_ops(&ops));
        assert_eq!(
            result.frontmatter.get("title"),
            Some(&FieldValue::scalar("New Title"))
        );
        assert_eq!(
            result.frontmatter.get("date"),
            Some(&FieldValue::scalar("2024-01-01"))
        );
        // Input untouched
        assert_eq!(
            d.frontmatter.get("title"),
            Some(&FieldValue::scalar("Old Title"))
        );
    }

    #[test]
    fn test_replace_creates_missing_property() {
        let d = doc(vec![("title", FieldValue::scalar("Test"))], "Content");
        let ops = props(vec![("summary", vec!["A description"])]);
        let result = apply(&d, &replace_ops(&ops));
        assert_eq!(
            result.frontmatter.get("description"),
            Some(&FieldValue::scalar("A description"))
        );
    }

    #[test]
    fn test_replace_content_body() {
        let d = doc(vec![("title", FieldValue::scalar("Test"))], "Old content");
        let ops = props(vec![("content", vec!["New content"])]);
        let result = apply(&d, &replace_ops(&ops));
        assert_eq!(result.body, "New content");
    }

    #[test]
    fn test_replace_content_html_object() {
        let d = doc(vec![("title", FieldValue::scalar("Test"))], "Old content");
        let mut ops = PropertyMap::new();
        ops.insert(
            "content".to_string(),
            vec![PropertyValue::Html(HtmlContent {
                html: "<p>HTML content</p>".to_string(),
                value: None,
            })],
        );
        let result = apply(&d, &replace_ops(&ops));
        assert_eq!(result.body, "<p>HTML content</p>");
    }

    #[test]
    fn test_replace_multi_valued_stays_sequence() {
        let d = doc(
            vec![
                ("title", FieldValue::scalar("Test")),
                ("tags", FieldValue::sequence(["old"])),
            ],
            "Content",
        );
        let ops = props(vec![("category", vec!["new1", "new2"])]);
        let result = apply(&d, &replace_ops(&ops));
        assert_eq!(
            result.frontmatter.get("tags"),
            Some(&FieldValue::sequence(["new1", "new2"]))
        );
    }

    #[test]
    fn test_replace_is_idempotent() {
        let d = doc(vec![("title", FieldValue::scalar("Old"))], "Body");
        let ops = props(vec![("name", vec!["New"]), ("content", vec!["Fresh"])]);
        let once = apply(&d, &replace_ops(&ops));
        let twice = apply(&once, &replace_ops(&ops));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_add_appends_to_sequence() {
        let d = doc(
            vec![
                ("title", FieldValue::scalar("Test")),
                ("tags", FieldValue::sequence(["web"])),
            ],
            "Content",
        );
        let ops = props(vec![("category", vec!["micropub"])]);
        let result = apply(
            &d,
            &UpdateOps {
                replace: None,
                add: Some(&ops),
                delete: None,
            },
        );
        assert_eq!(
            result.frontmatter.get("tags"),
            Some(&FieldValue::sequence(["web", "micropub"]))
        );
    }

    #[test]
    fn test_add_missing_single_value_collapses_to_scalar() {
        let d = doc(vec![("title", FieldValue::scalar("Test"))], "Content");
        let ops = props(vec![("category", vec!["new-tag"])]);
        let result = apply(
            &d,
            &UpdateOps {
                replace: None,
                add: Some(&ops),
                delete: None,
            },
        );
        assert_eq!(
            result.frontmatter.get("tags"),
            Some(&FieldValue::scalar("new-tag"))
        );
    }

    #[test]
    fn test_add_promotes_scalar_to_sequence() {
        let d = doc(
            vec![
                ("title", FieldValue::scalar("Test")),
                ("tags", FieldValue::scalar("single")),
            ],
            "Content",
        );
        let ops = props(vec![("category", vec!["new-tag"])]);
        let result = apply(
            &d,
            &UpdateOps {
                replace: None,
                add: Some(&ops),
                delete: None,
            },
        );
        assert_eq!(
            result.frontmatter.get("tags"),
            Some(&FieldValue::sequence(["single", "new-tag"]))
        );
    }

    #[test]
    fn test_add_appends_to_body_with_blank_line() {
        let d = doc(vec![("title", FieldValue::scalar("Test"))], "First part");
        let ops = props(vec![("content", vec!["Second part"])]);
        let result = apply(
            &d,
            &UpdateOps {
                replace: None,
                add: Some(&ops),
                delete: None,
            },
        );
        assert_eq!(result.body, "First part\n\nSecond part");
    }

    #[test]
    fn test_add_content_to_empty_body() {
        let d = doc(vec![], "");
        let ops = props(vec![("content", vec!["Only part"])]);
        let result = apply(
            &d,
            &UpdateOps {
                replace: None,
                add: Some(&ops),
                delete: None,
            },
        );
        assert_eq!(result.body, "Only part");
    }

    #[test]
    fn test_delete_whole_property() {
        let d = doc(
            vec![
                ("title", FieldValue::scalar("Test")),
                ("description", FieldValue::scalar("Remove me")),
            ],
            "Content",
        );
        let delete = DeleteOps::Properties(vec!["summary".to_string()]);
        let result = apply(
            &d,
            &UpdateOps {
                replace: None,
                add: None,
                delete: Some(&delete),
            },
        );
        assert!(result.frontmatter.contains_key("title"));
        assert!(!result.frontmatter.contains_key("description"));
    }

    #[test]
    fn test_delete_specific_values() {
        let d = doc(
            vec![(
                "tags",
                FieldValue::sequence(["web", "chickens", "tech"]),
            )],
            "Content",
        );
        let map = props(vec![("category", vec!["chickens"])]);
        let delete = DeleteOps::Values(map);
        let result = apply(
            &d,
            &UpdateOps {
                replace: None,
                add: None,
                delete: Some(&delete),
            },
        );
        assert_eq!(
            result.frontmatter.get("tags"),
            Some(&FieldValue::sequence(["web", "tech"]))
        );
    }

    #[test]
    fn test_delete_last_value_removes_field() {
        let d = doc(vec![("tags", FieldValue::sequence(["onlytag"]))], "Content");
        let map = props(vec![("category", vec!["onlytag"])]);
        let delete = DeleteOps::Values(map);
        let result = apply(
            &d,
            &UpdateOps {
                replace: None,
                add: None,
                delete: Some(&delete),
            },
        );
        assert!(!result.frontmatter.contains_key("tags"));
    }

    #[test]
    fn test_delete_matching_scalar_removes_field() {
        let d = doc(
            vec![("description", FieldValue::scalar("Remove me"))],
            "Content",
        );
        let map = props(vec![("summary", vec!["Remove me"])]);
        let delete = DeleteOps::Values(map);
        let result = apply(
            &d,
            &UpdateOps {
                replace: None,
                add: None,
                delete: Some(&delete),
            },
        );
        assert!(!result.frontmatter.contains_key("description"));
    }

    #[test]
    fn test_delete_content_clears_body() {
        let d = doc(vec![("title", FieldValue::scalar("Test"))], "Some content");
        let delete = DeleteOps::Properties(vec!["content".to_string()]);
        let result = apply(
            &d,
            &UpdateOps {
                replace: None,
                add: None,
                delete: Some(&delete),
            },
        );
        assert_eq!(result.body, "");
    }

    #[test]
    fn test_combined_operations_fixed_order() {
        let d = doc(
            vec![
                ("title", FieldValue::scalar("Old")),
                ("tags", FieldValue::sequence(["keep", "remove"])),
                ("description", FieldValue::scalar("Delete me")),
            ],
            "Original",
        );
        let replace = props(vec![("name", vec!["New Title"])]);
        let add = props(vec![("category", vec!["added"])]);
        let delete = DeleteOps::Values(props(vec![("category", vec!["remove"])]));
        let result = apply(
            &d,
            &UpdateOps {
                replace: Some(&replace),
                add: Some(&add),
                delete: Some(&delete),
            },
        );
        assert_eq!(
            result.frontmatter.get("title"),
            Some(&FieldValue::scalar("New Title"))
        );
        assert_eq!(
            result.frontmatter.get("tags"),
            Some(&FieldValue::sequence(["keep", "added"]))
        );
        assert_eq!(
            result.frontmatter.get("description"),
            Some(&FieldValue::scalar("Delete me"))
        );
    }

    #[test]
    fn test_property_mapping() {
        let empty = doc(vec![], "");
        for (property, field, value) in [
            ("name", "title", "Test"),
            ("summary", "description", "Desc"),
            ("published", "date", "2024-06-15"),
            ("in-reply-to", "in-reply-to", "https://example.com"),
        ] {
            let ops = props(vec![(property, vec![value])]);
            let result = apply(&empty, &replace_ops(&ops));
            assert_eq!(
                result.frontmatter.get(field),
                Some(&FieldValue::scalar(value)),
                "property {property} should map to field {field}"
            );
        }

        let ops = props(vec![("category", vec!["tag1", "tag2"])]);
        let result = apply(&empty, &replace_ops(&ops));
        assert_eq!(
            result.frontmatter.get("tags"),
            Some(&FieldValue::sequence(["tag1", "tag2"]))
        );
    }
}
