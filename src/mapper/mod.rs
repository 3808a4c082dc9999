/*!
 * # Document mapping
 *
 * Converts domain values to and from loosely-typed store documents.
 *
 * Writes always use the canonical camelCase field names. Reads look up the
 * canonical name first, then each legacy alias in order, then fall back to a
 * typed default. Numbers are accepted as integer or double, timestamps as
 * native instants or integer epoch milliseconds. A field that is present but
 * holds an incompatible type makes the whole document undecodable.
 */

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;
use tracing::warn;

use crate::ids::{stable_hash, EntityId};
use crate::store::{Document, FieldValue, Fields};

pub mod category;
pub mod product;
pub mod supplier;

pub use category::CategoryMapper;
pub use product::ProductMapper;
pub use supplier::SupplierMapper;

/// Canonical field name plus the legacy names accepted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub canonical: &'static str,
    pub aliases: &'static [&'static str],
}

impl FieldSpec {
    pub const fn new(canonical: &'static str, aliases: &'static [&'static str]) -> Self {
        Self { canonical, aliases }
    }

    /// Canonical name followed by the aliases, in lookup order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.canonical).chain(self.aliases.iter().copied())
    }
}

/// Opaque document id as recorded inside the document.
pub const DOCUMENT_ID: FieldSpec =
    FieldSpec::new("documentId", &["document_id", "firestore_id", "firestoreId"]);

#[derive(Debug, Error, Clone, PartialEq)]
#[error("could not decode {collection}/{document_id}: {reason}")]
pub struct DecodeError {
    pub collection: String,
    pub document_id: String,
    pub reason: String,
}

/// Two-way conversion between a domain entity and a store document.
pub trait DocumentMapper {
    type Entity;

    const COLLECTION: &'static str;
    /// Field holding the numeric id.
    const ID: FieldSpec;

    /// Canonical field map for `entity`, including `id` and `documentId`.
    fn to_document(entity: &Self::Entity) -> Fields;

    fn from_document(doc: &Document) -> Result<Self::Entity, DecodeError>;

    fn entity_id(entity: &Self::Entity) -> &EntityId;
}

/// Tolerant field access over one document.
pub struct FieldReader<'a> {
    doc: &'a Document,
}

impl<'a> FieldReader<'a> {
    pub fn new(doc: &'a Document) -> Self {
        Self { doc }
    }

    pub fn error(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError {
            collection: self.doc.collection.clone(),
            document_id: self.doc.id.clone(),
            reason: reason.into(),
        }
    }

    /// First non-null value under the canonical name or an alias.
    pub fn lookup(&self, spec: FieldSpec) -> Option<(&'static str, &'a FieldValue)> {
        spec.names().find_map(|name| {
            self.doc
                .fields
                .get(name)
                .filter(|value| !value.is_null())
                .map(|value| (name, value))
        })
    }

    fn mismatch(&self, name: &str, expected: &str, found: &FieldValue) -> DecodeError {
        self.error(format!(
            "field {} holds {}, expected {}",
            name,
            found.type_name(),
            expected
        ))
    }

    pub fn string(&self, spec: FieldSpec) -> Result<String, DecodeError> {
        match self.lookup(spec) {
            None => Ok(String::new()),
            Some((_, FieldValue::String(s))) => Ok(s.clone()),
            Some((name, other)) => Err(self.mismatch(name, "string", other)),
        }
    }

    pub fn optional_i32(&self, spec: FieldSpec) -> Result<Option<i32>, DecodeError> {
        match self.lookup(spec) {
            None => Ok(None),
            Some((name, FieldValue::Integer(i))) => i32::try_from(*i)
                .map(Some)
                .map_err(|_| self.error(format!("field {} out of range: {}", name, i))),
            Some((name, FieldValue::Double(d))) => {
                if d.is_finite() && *d >= f64::from(i32::MIN) && *d <= f64::from(i32::MAX) {
                    Ok(Some(d.trunc() as i32))
                } else {
                    Err(self.error(format!("field {} out of range: {}", name, d)))
                }
            }
            Some((name, other)) => Err(self.mismatch(name, "number", other)),
        }
    }

    pub fn i32(&self, spec: FieldSpec) -> Result<i32, DecodeError> {
        Ok(self.optional_i32(spec)?.unwrap_or(0))
    }

    pub fn f64(&self, spec: FieldSpec) -> Result<f64, DecodeError> {
        match self.lookup(spec) {
            None => Ok(0.0),
            Some((_, FieldValue::Integer(i))) => Ok(*i as f64),
            Some((_, FieldValue::Double(d))) if d.is_finite() => Ok(*d),
            Some((name, FieldValue::Double(d))) => {
                Err(self.error(format!("field {} is not finite: {}", name, d)))
            }
            Some((name, other)) => Err(self.mismatch(name, "number", other)),
        }
    }

    pub fn bool(&self, spec: FieldSpec, default: bool) -> Result<bool, DecodeError> {
        match self.lookup(spec) {
            None => Ok(default),
            Some((_, FieldValue::Boolean(b))) => Ok(*b),
            Some((name, other)) => Err(self.mismatch(name, "boolean", other)),
        }
    }

    /// Native instant, or integer epoch milliseconds written by older clients.
    pub fn timestamp(&self, spec: FieldSpec) -> Result<Option<DateTime<Utc>>, DecodeError> {
        match self.lookup(spec) {
            None => Ok(None),
            Some((_, FieldValue::Timestamp(ts))) => Ok(Some(*ts)),
            Some((name, FieldValue::Integer(millis))) => Utc
                .timestamp_millis_opt(*millis)
                .single()
                .map(Some)
                .ok_or_else(|| self.error(format!("field {} out of range: {}", name, millis))),
            Some((name, other)) => Err(self.mismatch(name, "timestamp", other)),
        }
    }

    /// Numeric id from `spec`, or synthesized from the opaque document id when
    /// the document never recorded one. The synthesized id is not written back.
    pub fn entity_id(&self, spec: FieldSpec) -> Result<EntityId, DecodeError> {
        if let Some((name, FieldValue::String(recorded))) = self.lookup(DOCUMENT_ID) {
            if recorded != &self.doc.id {
                warn!(
                    collection = %self.doc.collection,
                    document_id = %self.doc.id,
                    field = name,
                    recorded = %recorded,
                    "Recorded document id disagrees with the document path"
                );
            }
        }
        let value = match self.optional_i32(spec)? {
            Some(value) => value,
            None => stable_hash(&self.doc.id),
        };
        Ok(EntityId::new(value, self.doc.id.clone()))
    }
}

/// Builder for canonical field maps.
#[derive(Debug, Default)]
pub struct FieldWriter {
    fields: Fields,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, spec: FieldSpec, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(spec.canonical.to_string(), value.into());
        self
    }

    /// Absent strings are written as `""`.
    pub fn text(self, spec: FieldSpec, value: Option<&str>) -> Self {
        self.set(spec, value.unwrap_or_default())
    }

    pub fn server_time(self, spec: FieldSpec) -> Self {
        self.set(spec, FieldValue::ServerTimestamp)
    }

    /// Instant if known, otherwise nothing is written.
    pub fn instant(self, spec: FieldSpec, value: Option<DateTime<Utc>>) -> Self {
        match value {
            Some(ts) => self.set(spec, ts),
            None => self,
        }
    }

    pub fn identity(self, id_spec: FieldSpec, id: &EntityId) -> Self {
        self.set(id_spec, id.value())
            .set(DOCUMENT_ID, id.document_id())
    }

    pub fn build(self) -> Fields {
        self.fields
    }
}
