//! # Envelope Normalisation
//!
//! Servers wrap collections in different envelopes. [`normalize_page`] tries a
//! fixed list of strategies, first match wins:
//!
//! | strategy | payload shape | pagination read from |
//! |----------|---------------|----------------------|
//! | [`Envelope::FlatPaginator`] | `{"data": [..], "current_page": .., "per_page": .., "total": ..}` | the top level |
//! | [`Envelope::Enveloped`] | `{"data": [..], "meta": {..}}` | `meta.pagination` |
//! | [`Envelope::Accessor`] | `{"<accessor>": [..], ..}` | `meta.pagination` |
//! | [`Envelope::BareArray`] | `[..]` | nowhere |
//! | [`Envelope::Fallback`] | anything else | nowhere |
//!
//! The fallback never fails: the whole payload becomes the collection and a
//! [`NormalizationWarning`] is logged and returned alongside.

use crate::error::NormalizationWarning;
use crate::pagination::PageMeta;
use serde_json::{Map, Value};
use tracing::warn;

/// The strategy that recognised a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    FlatPaginator,
    Enveloped,
    Accessor,
    BareArray,
    Fallback,
}

/// A collection payload in canonical form, items still raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPage {
    pub items: Vec<Value>,
    pub pagination: Option<PageMeta>,
    pub meta: Value,
    pub envelope: Envelope,
    pub warning: Option<NormalizationWarning>,
}

/// A single-item payload in canonical form.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedItem {
    pub data: Value,
    pub meta: Value,
}

const PAGINATION_KEYS: [&str; 3] = ["current_page", "per_page", "total"];

fn meta_pagination(meta: &Value) -> Option<PageMeta> {
    meta.get("pagination")
        .and_then(|pagination| serde_json::from_value(pagination.clone()).ok())
}

fn flat_paginator(object: &mut Map<String, Value>) -> Option<NormalizedPage> {
    if !matches!(object.get("data"), Some(Value::Array(_))) || !object.contains_key("current_page")
    {
        return None;
    }
    let mut flat = Map::new();
    for key in PAGINATION_KEYS {
        if let Some(value) = object.get(key) {
            flat.insert(key.to_string(), value.clone());
        }
    }
    let pagination = serde_json::from_value(Value::Object(flat)).ok()?;
    let Some(Value::Array(items)) = object.remove("data") else {
        return None;
    };
    Some(NormalizedPage {
        items,
        pagination: Some(pagination),
        meta: Value::Object(std::mem::take(object)),
        envelope: Envelope::FlatPaginator,
        warning: None,
    })
}

fn enveloped(object: &mut Map<String, Value>) -> Option<NormalizedPage> {
    if !matches!(object.get("data"), Some(Value::Array(_))) {
        return None;
    }
    let Some(Value::Array(items)) = object.remove("data") else {
        return None;
    };
    let meta = object.remove("meta").unwrap_or(Value::Null);
    Some(NormalizedPage {
        items,
        pagination: meta_pagination(&meta),
        meta,
        envelope: Envelope::Enveloped,
        warning: None,
    })
}

fn accessor(object: &mut Map<String, Value>, key: &str) -> Option<NormalizedPage> {
    if !matches!(object.get(key), Some(Value::Array(_))) {
        return None;
    }
    let Some(Value::Array(items)) = object.remove(key) else {
        return None;
    };
    let pagination = object.get("meta").and_then(meta_pagination);
    Some(NormalizedPage {
        items,
        pagination,
        meta: Value::Object(std::mem::take(object)),
        envelope: Envelope::Accessor,
        warning: None,
    })
}

/// Turns a collection response into a [`NormalizedPage`].
pub fn normalize_page(
    payload: Value,
    accessor_key: Option<&str>,
    resource: &str,
) -> NormalizedPage {
    let payload = match payload {
        Value::Object(mut object) => {
            let matched = flat_paginator(&mut object)
                .or_else(|| enveloped(&mut object))
                .or_else(|| accessor_key.and_then(|key| accessor(&mut object, key)));
            match matched {
                Some(page) => return page,
                None => Value::Object(object),
            }
        }
        Value::Array(items) => {
            return NormalizedPage {
                items,
                pagination: None,
                meta: Value::Null,
                envelope: Envelope::BareArray,
                warning: None,
            };
        }
        other => other,
    };

    let warning = NormalizationWarning {
        resource: resource.to_string(),
    };
    warn!(resource, "{warning}");
    NormalizedPage {
        items: vec![payload],
        pagination: None,
        meta: Value::Null,
        envelope: Envelope::Fallback,
        warning: Some(warning),
    }
}

/// Turns a single-item response into a [`NormalizedItem`].
///
/// An object with a `data` key is an envelope; anything else is the item itself.
pub fn normalize_item(payload: Value) -> NormalizedItem {
    match payload {
        Value::Object(mut object) if object.contains_key("data") => {
            let data = object.remove("data").unwrap_or(Value::Null);
            let meta = object.remove("meta").unwrap_or(Value::Null);
            NormalizedItem { data, meta }
        }
        data => NormalizedItem {
            data,
            meta: Value::Null,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(current_page: u64, per_page: u64, total: u64) -> Option<PageMeta> {
        Some(PageMeta {
            per_page,
            current_page,
            total,
        })
    }

    #[test]
    fn test_flat_paginator_wins_over_enveloped() {
        let page = normalize_page(
            json!({
                "data": [{"id": 1}],
                "current_page": 2,
                "per_page": 1,
                "total": 5,
                "path": "/posts"
            }),
            None,
            "posts",
        );
        assert_eq!(page.envelope, Envelope::FlatPaginator);
        assert_eq!(page.pagination, meta(2, 1, 5));
        assert_eq!(page.items, vec![json!({"id": 1})]);
        assert_eq!(page.meta["path"], "/posts");
    }

    #[test]
    fn test_enveloped_reads_meta_pagination() {
        let page = normalize_page(
            json!({
                "data": [{"id": 1}],
                "meta": {"pagination": {"per_page": 10, "current_page": 1, "total": 20}}
            }),
            Some("posts"),
            "posts",
        );
        assert_eq!(page.envelope, Envelope::Enveloped);
        assert_eq!(page.pagination, meta(1, 10, 20));
        assert!(page.warning.is_none());
    }

    #[test]
    fn test_accessor_key_holds_items() {
        let page = normalize_page(
            json!({
                "posts": [{"id": 1}, {"id": 2}],
                "meta": {"pagination": {"per_page": 2, "current_page": 1, "total": 2}}
            }),
            Some("posts"),
            "posts",
        );
        assert_eq!(page.envelope, Envelope::Accessor);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.pagination, meta(1, 2, 2));
        assert!(page.meta.get("posts").is_none());
    }

    #[test]
    fn test_bare_array() {
        let page = normalize_page(json!([1, 2, 3]), None, "numbers");
        assert_eq!(page.envelope, Envelope::BareArray);
        assert_eq!(page.items.len(), 3);
        assert!(page.pagination.is_none());
    }

    #[test]
    fn test_unrecognised_payload_falls_back_with_warning() {
        let page = normalize_page(json!({"rows": [1]}), Some("items"), "things");
        assert_eq!(page.envelope, Envelope::Fallback);
        assert_eq!(page.items, vec![json!({"rows": [1]})]);
        assert_eq!(
            page.warning,
            Some(NormalizationWarning {
                resource: "things".to_string()
            })
        );
    }

    #[test]
    fn test_item_envelope_and_bare_item() {
        let wrapped = normalize_item(json!({"data": {"id": 3}, "meta": {"etag": "x"}}));
        assert_eq!(wrapped.data, json!({"id": 3}));
        assert_eq!(wrapped.meta, json!({"etag": "x"}));

        let bare = normalize_item(json!({"id": 3}));
        assert_eq!(bare.data, json!({"id": 3}));
        assert_eq!(bare.meta, Value::Null);
    }
}
