//! Typed JSON encoding used by the Firestore REST API.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::store::{Document, FieldValue, Fields, Query, StoreError};

pub fn encode_value(value: &FieldValue) -> Result<Value, StoreError> {
    Ok(match value {
        FieldValue::Null => json!({ "nullValue": null }),
        FieldValue::Boolean(b) => json!({ "booleanValue": b }),
        FieldValue::Integer(i) => json!({ "integerValue": i.to_string() }),
        FieldValue::Double(d) if d.is_finite() => json!({ "doubleValue": d }),
        FieldValue::Double(d) => {
            return Err(StoreError::Encoding(format!(
                "non-finite double {} cannot be stored",
                d
            )))
        }
        FieldValue::String(s) => json!({ "stringValue": s }),
        FieldValue::Timestamp(ts) => {
            json!({ "timestampValue": ts.to_rfc3339_opts(SecondsFormat::AutoSi, true) })
        }
        FieldValue::Array(items) => {
            let values = items.iter().map(encode_value).collect::<Result<Vec<_>, _>>()?;
            json!({ "arrayValue": { "values": values } })
        }
        FieldValue::Map(entries) => json!({ "mapValue": { "fields": encode_fields(entries)? } }),
        FieldValue::ServerTimestamp => {
            return Err(StoreError::Encoding(
                "server timestamp must be sent as a field transform".into(),
            ))
        }
    })
}

pub fn encode_fields(fields: &BTreeMap<String, FieldValue>) -> Result<Map<String, Value>, StoreError> {
    fields
        .iter()
        .map(|(name, value)| Ok((name.clone(), encode_value(value)?)))
        .collect()
}

pub fn decode_value(value: &Value) -> Result<FieldValue, StoreError> {
    let object = value
        .as_object()
        .ok_or_else(|| StoreError::Encoding(format!("expected typed value, got {}", value)))?;
    let (kind, inner) = object
        .iter()
        .next()
        .ok_or_else(|| StoreError::Encoding("empty typed value".into()))?;

    match kind.as_str() {
        "nullValue" => Ok(FieldValue::Null),
        "booleanValue" => inner
            .as_bool()
            .map(FieldValue::Boolean)
            .ok_or_else(|| bad(kind, inner)),
        "integerValue" => match inner {
            Value::String(s) => s.parse().map(FieldValue::Integer).map_err(|_| bad(kind, inner)),
            Value::Number(n) => n.as_i64().map(FieldValue::Integer).ok_or_else(|| bad(kind, inner)),
            _ => Err(bad(kind, inner)),
        },
        "doubleValue" => match inner {
            Value::Number(n) => n.as_f64().map(FieldValue::Double).ok_or_else(|| bad(kind, inner)),
            // NaN and the infinities travel as strings
            Value::String(s) => s.parse().map(FieldValue::Double).map_err(|_| bad(kind, inner)),
            _ => Err(bad(kind, inner)),
        },
        "stringValue" => inner
            .as_str()
            .map(|s| FieldValue::String(s.to_string()))
            .ok_or_else(|| bad(kind, inner)),
        "timestampValue" => inner
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| FieldValue::Timestamp(ts.with_timezone(&Utc)))
            .ok_or_else(|| bad(kind, inner)),
        "arrayValue" => {
            let values = match inner.get("values") {
                Some(Value::Array(values)) => values.iter().map(decode_value).collect::<Result<_, _>>()?,
                _ => Vec::new(),
            };
            Ok(FieldValue::Array(values))
        }
        "mapValue" => Ok(FieldValue::Map(decode_fields(inner.get("fields"))?)),
        // Types the domain never reads are kept as opaque strings.
        "referenceValue" | "bytesValue" => Ok(FieldValue::String(
            inner.as_str().unwrap_or_default().to_string(),
        )),
        "geoPointValue" => Ok(FieldValue::String(inner.to_string())),
        other => Err(StoreError::Encoding(format!("unknown value type {}", other))),
    }
}

pub fn decode_fields(fields: Option<&Value>) -> Result<Fields, StoreError> {
    match fields {
        None | Some(Value::Null) => Ok(Fields::new()),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, value)| Ok((name.clone(), decode_value(value)?)))
            .collect(),
        Some(other) => Err(StoreError::Encoding(format!("expected field map, got {}", other))),
    }
}

fn bad(kind: &str, inner: &Value) -> StoreError {
    StoreError::Encoding(format!("malformed {}: {}", kind, inner))
}

/// Document resource as returned by `GET` and `runQuery`.
#[derive(Debug, Deserialize)]
pub struct DocumentResource {
    pub name: String,
    #[serde(default)]
    pub fields: Option<Value>,
}

impl DocumentResource {
    pub fn into_document(self) -> Result<Document, StoreError> {
        let mut segments = self.name.rsplit('/');
        let id = segments.next().unwrap_or_default().to_string();
        let collection = segments.next().unwrap_or_default().to_string();
        if id.is_empty() || collection.is_empty() {
            return Err(StoreError::Encoding(format!(
                "unexpected document name {}",
                self.name
            )));
        }
        Ok(Document::new(collection, id, decode_fields(self.fields.as_ref())?))
    }
}

/// One element of the `runQuery` response stream.
#[derive(Debug, Deserialize)]
pub struct RunQueryItem {
    #[serde(default)]
    pub document: Option<DocumentResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub commit_time: String,
}

impl CommitResponse {
    pub fn commit_time(&self) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(&self.commit_time)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| StoreError::Encoding(format!("bad commit time: {}", e)))
    }
}

/// Quotes a field path segment unless it is a simple identifier.
pub fn quote_field_path(field: &str) -> String {
    let mut chars = field.chars();
    let simple = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        field.to_string()
    } else {
        format!("`{}`", field.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

pub fn structured_query(query: &Query) -> Result<Value, StoreError> {
    let filters = query
        .filters()
        .iter()
        .map(|(field, value)| {
            Ok(json!({
                "fieldFilter": {
                    "field": { "fieldPath": quote_field_path(field) },
                    "op": "EQUAL",
                    "value": encode_value(value)?,
                }
            }))
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    let mut structured = json!({
        "from": [{ "collectionId": query.collection_name() }],
    });
    match filters.len() {
        0 => {}
        1 => structured["where"] = filters.into_iter().next().unwrap_or_default(),
        _ => {
            structured["where"] = json!({
                "compositeFilter": { "op": "AND", "filters": filters }
            })
        }
    }
    if let Some(limit) = query.max_results() {
        structured["limit"] = json!(limit);
    }
    Ok(json!({ "structuredQuery": structured }))
}

/// Splits a write's fields into stored values and server-timestamp transforms.
pub fn split_transforms(fields: Fields) -> (Fields, Vec<String>) {
    let mut transforms = Vec::new();
    let values = fields
        .into_iter()
        .filter_map(|(name, value)| match value {
            FieldValue::ServerTimestamp => {
                transforms.push(name);
                None
            }
            other => Some((name, other)),
        })
        .collect();
    (values, transforms)
}

pub fn transforms_json(transforms: &[String]) -> Vec<Value> {
    transforms
        .iter()
        .map(|field| {
            json!({
                "fieldPath": quote_field_path(field),
                "setToServerValue": "REQUEST_TIME",
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Maps a non-success response to a [`StoreError`].
pub fn map_error(http_status: u16, body: &str) -> StoreError {
    let (status, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.status, envelope.error.message),
        Err(_) => (String::new(), body.trim().to_string()),
    };
    match (status.as_str(), http_status) {
        ("NOT_FOUND", _) | ("", 404) => StoreError::NotFound(message),
        ("ALREADY_EXISTS", _) | ("", 409) => StoreError::AlreadyExists(message),
        ("UNAUTHENTICATED", _) | ("PERMISSION_DENIED", _) | ("", 401) | ("", 403) => {
            StoreError::Unauthorized(message)
        }
        _ => StoreError::Rejected {
            status: if status.is_empty() {
                http_status.to_string()
            } else {
                status
            },
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn integers_travel_as_strings() {
        assert_eq!(
            encode_value(&FieldValue::Integer(-42)).unwrap(),
            json!({ "integerValue": "-42" })
        );
        assert_eq!(
            decode_value(&json!({ "integerValue": "7" })).unwrap(),
            FieldValue::Integer(7)
        );
    }

    #[test]
    fn timestamps_use_rfc3339() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let encoded = encode_value(&FieldValue::Timestamp(ts)).unwrap();
        assert_eq!(encoded, json!({ "timestampValue": "2024-03-01T12:30:00Z" }));
        assert_eq!(
            decode_value(&json!({ "timestampValue": "2024-03-01T12:30:00.123456Z" })).unwrap(),
            FieldValue::Timestamp(ts + chrono::Duration::microseconds(123_456))
        );
    }

    #[test]
    fn server_timestamp_is_not_a_value() {
        assert!(encode_value(&FieldValue::ServerTimestamp).is_err());
        let mut fields = Fields::new();
        fields.insert("name".into(), FieldValue::from("x"));
        fields.insert("updatedAt".into(), FieldValue::ServerTimestamp);
        let (values, transforms) = split_transforms(fields);
        assert_eq!(values.len(), 1);
        assert_eq!(transforms, vec!["updatedAt".to_string()]);
    }

    #[test]
    fn field_paths_are_quoted_when_needed() {
        assert_eq!(quote_field_path("stockOnHand"), "stockOnHand");
        assert_eq!(quote_field_path("id_producto"), "id_producto");
        assert_eq!(quote_field_path("1st"), "`1st`");
        assert_eq!(quote_field_path("a-b"), "`a-b`");
    }

    #[test]
    fn composite_query_uses_and() {
        let query = Query::collection("products")
            .where_eq("active", true)
            .where_eq("categoryId", 3)
            .limit(1);
        let body = structured_query(&query).unwrap();
        let sq = &body["structuredQuery"];
        assert_eq!(sq["from"][0]["collectionId"], "products");
        assert_eq!(sq["where"]["compositeFilter"]["op"], "AND");
        assert_eq!(sq["limit"], 1);

        let single = structured_query(&Query::collection("products").where_eq("barcode", "B1")).unwrap();
        assert_eq!(
            single["structuredQuery"]["where"]["fieldFilter"]["value"]["stringValue"],
            "B1"
        );
    }

    #[test]
    fn document_names_split_into_collection_and_id() {
        let resource = DocumentResource {
            name: "projects/p/databases/(default)/documents/products/abc123".into(),
            fields: Some(json!({ "name": { "stringValue": "Mouse" } })),
        };
        let doc = resource.into_document().unwrap();
        assert_eq!(doc.collection, "products");
        assert_eq!(doc.id, "abc123");
        assert_eq!(doc.get("name"), Some(&FieldValue::from("Mouse")));
    }

    #[test]
    fn error_statuses_map_to_store_errors() {
        let body = r#"{"error":{"code":404,"message":"No document to update","status":"NOT_FOUND"}}"#;
        assert!(matches!(map_error(404, body), StoreError::NotFound(_)));

        let body = r#"{"error":{"code":403,"message":"denied","status":"PERMISSION_DENIED"}}"#;
        assert!(matches!(map_error(403, body), StoreError::Unauthorized(_)));

        let body = r#"{"error":{"code":400,"message":"needs index","status":"FAILED_PRECONDITION"}}"#;
        match map_error(400, body) {
            StoreError::Rejected { status, message } => {
                assert_eq!(status, "FAILED_PRECONDITION");
                assert_eq!(message, "needs index");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(matches!(map_error(503, "upstream"), StoreError::Rejected { .. }));
    }
}
