//! Profile document store
//!
//! User profiles are loosely typed JSON documents keyed by wallet address.
//! Writers never replace a whole document: they send a [`PartialUpdate`] of
//! field primitives (set, increment, max, array union) addressed by dotted
//! paths such as `bestScores.tetris`.

pub mod memory;
pub mod rocks;

pub use memory::MemoryProfileStore;
pub use rocks::{open_database, RocksProfileStore};

use crate::errors::{ArcadeResult, PreconditionError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub type Document = Map<String, Value>;

/// Atomic read-modify-write body: sees the current document, returns the
/// fields to merge. An `Err` aborts without writing.
pub type AtomicUpdate<'a> = &'a (dyn Fn(Option<&Document>) -> ArcadeResult<PartialUpdate> + Send + Sync);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    #[error("Field path '{0}' crosses a non-object value")]
    InvalidPath(String),
}

/// Field update primitive
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(Value),
    /// Commutative add; a missing or non-numeric field counts as 0
    Increment(i64),
    /// Keep the larger of the stored number and the operand
    Max(i64),
    /// Append values not already present
    ArrayUnion(Vec<Value>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialUpdate {
    fields: Vec<(String, FieldUpdate)>,
}

impl PartialUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(path, FieldUpdate::Set(value.into()))
    }

    pub fn increment(self, path: impl Into<String>, by: i64) -> Self {
        self.with(path, FieldUpdate::Increment(by))
    }

    pub fn max(self, path: impl Into<String>, value: i64) -> Self {
        self.with(path, FieldUpdate::Max(value))
    }

    pub fn array_union(self, path: impl Into<String>, values: Vec<Value>) -> Self {
        self.with(path, FieldUpdate::ArrayUnion(values))
    }

    pub fn with(mut self, path: impl Into<String>, update: FieldUpdate) -> Self {
        self.fields.push((path.into(), update));
        self
    }

    pub fn fields(&self) -> &[(String, FieldUpdate)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Apply every field of `update` to `doc`, creating intermediate objects.
/// On error `doc` may be partially updated; callers apply to a copy.
pub fn apply_update(doc: &mut Document, update: &PartialUpdate) -> Result<(), StoreError> {
    for (path, field) in update.fields() {
        let slot = field_slot(doc, path)?;
        match field {
            FieldUpdate::Set(value) => *slot = value.clone(),
            FieldUpdate::Increment(by) => {
                let current = slot.as_i64().unwrap_or(0);
                *slot = Value::from(current.saturating_add(*by));
            }
            FieldUpdate::Max(value) => match slot.as_i64() {
                Some(current) if current >= *value => {}
                _ => *slot = Value::from(*value),
            },
            FieldUpdate::ArrayUnion(values) => {
                if !slot.is_array() {
                    *slot = Value::Array(Vec::new());
                }
                if let Value::Array(items) = slot {
                    for value in values {
                        if !items.contains(value) {
                            items.push(value.clone());
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn field_slot<'a>(doc: &'a mut Document, path: &str) -> Result<&'a mut Value, StoreError> {
    let mut segments = path.split('.');
    let first = segments
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
    let mut slot = doc.entry(first).or_insert(Value::Null);

    for segment in segments {
        if segment.is_empty() {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        slot = match slot {
            Value::Object(map) => map.entry(segment).or_insert(Value::Null),
            _ => return Err(StoreError::InvalidPath(path.to_string())),
        };
    }
    Ok(slot)
}

/// Read a field by dotted path
pub fn get_field<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut value = doc.get(segments.next()?)?;
    for segment in segments {
        value = value.as_object()?.get(segment)?;
    }
    Some(value)
}

/// Integer field by dotted path, treating missing as absent
pub fn get_i64(doc: &Document, path: &str) -> Option<i64> {
    get_field(doc, path).and_then(Value::as_i64)
}

/// Lowercase `0x` + 40 hex digits
pub fn normalize_address(address: &str) -> Result<String, PreconditionError> {
    let trimmed = address.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| PreconditionError::InvalidAddress(address.to_string()))?;

    if digits.len() != 40 || hex::decode(digits).is_err() {
        return Err(PreconditionError::InvalidAddress(address.to_string()));
    }
    Ok(format!("0x{}", digits.to_ascii_lowercase()))
}

/// Persistence collaborator holding one document per user
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user: &str) -> Result<Option<Document>, StoreError>;

    /// Merge-write; fields not named in `update` are left alone
    async fn set_merge(&self, user: &str, update: &PartialUpdate) -> Result<(), StoreError>;

    /// Read-modify-write under the store's own lock
    async fn run_atomic(&self, user: &str, update: AtomicUpdate<'_>) -> ArcadeResult<()>;

    /// Up to `limit` documents ordered by user key
    async fn list(&self, limit: usize) -> Result<Vec<(String, Document)>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_nested_paths_created() {
        let mut d = Document::new();
        let update = PartialUpdate::new()
            .increment("miles", 50)
            .increment("gamesPlayed.slots", 1)
            .set("lastPlayedAt", "2024-01-01T00:00:00Z");
        apply_update(&mut d, &update).unwrap();

        assert_eq!(Value::Object(d.clone()), json!({
            "miles": 50,
            "gamesPlayed": { "slots": 1 },
            "lastPlayedAt": "2024-01-01T00:00:00Z",
        }));

        apply_update(&mut d, &PartialUpdate::new().increment("gamesPlayed.slots", 2)).unwrap();
        assert_eq!(get_i64(&d, "gamesPlayed.slots"), Some(3));
    }

    #[test]
    fn test_max_keeps_larger() {
        let mut d = doc(json!({ "bestScores": { "tetris": 400 } }));
        apply_update(&mut d, &PartialUpdate::new().max("bestScores.tetris", 300)).unwrap();
        assert_eq!(get_i64(&d, "bestScores.tetris"), Some(400));

        apply_update(&mut d, &PartialUpdate::new().max("bestScores.tetris", 500)).unwrap();
        assert_eq!(get_i64(&d, "bestScores.tetris"), Some(500));

        apply_update(&mut d, &PartialUpdate::new().max("bestScores.slots", 50)).unwrap();
        assert_eq!(get_i64(&d, "bestScores.slots"), Some(50));
    }

    #[test]
    fn test_array_union_has_set_semantics() {
        let mut d = doc(json!({ "claimedBadges": ["kitten"] }));
        let update = PartialUpdate::new().array_union("claimedBadges", vec![json!("kitten"), json!("tomcat")]);
        apply_update(&mut d, &update).unwrap();
        assert_eq!(d["claimedBadges"], json!(["kitten", "tomcat"]));
    }

    #[test]
    fn test_path_through_scalar_rejected() {
        let mut d = doc(json!({ "miles": 5 }));
        let err = apply_update(&mut d, &PartialUpdate::new().set("miles.extra", 1)).unwrap_err();
        assert_eq!(err, StoreError::InvalidPath("miles.extra".to_string()));

        let err = apply_update(&mut d, &PartialUpdate::new().set("a..b", 1)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
    }

    #[test]
    fn test_address_normalization() {
        let mixed = "0xABCDEF0123456789abcdef0123456789ABCDEF01";
        assert_eq!(
            normalize_address(mixed).unwrap(),
            "0xabcdef0123456789abcdef0123456789abcdef01"
        );
        assert!(normalize_address("abcdef0123456789abcdef0123456789abcdef01").is_err());
        assert!(normalize_address("0x1234").is_err());
        assert!(normalize_address("0xZZcdef0123456789abcdef0123456789abcdef01").is_err());
    }
}
