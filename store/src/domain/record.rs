//! Ordered Record Entity
//!
//! A record that participates in a scope-wide ordering through its
//! `position` value. Everything else about the record lives in an opaque
//! JSON payload (image URL, title, category name, ...).

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::{DomainError, DomainResult, Entity};

/// Arbitrary record fields, opaque to the ordering logic
pub type Payload = Map<String, Value>;

/// Store-assigned record identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A record ordered by `position` within its scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedRecord {
    /// Unique identifier, immutable once assigned
    pub id: RecordId,
    /// Sort key within the scope (ascending)
    pub position: i32,
    /// Creation time, when the store tracks it. Breaks position ties.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payload: Payload,
}

impl OrderedRecord {
    pub fn new(id: impl Into<RecordId>, position: i32) -> Self {
        Self {
            id: id.into(),
            position,
            created_at: None,
            payload: Payload::new(),
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// String value of a payload field, if present
    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }

    /// Display order: position, then creation time, then id.
    ///
    /// Records without a creation time sort after those with one on a tie.
    pub fn display_cmp(&self, other: &Self) -> Ordering {
        self.position
            .cmp(&other.position)
            .then_with(|| match (&self.created_at, &other.created_at) {
                (Some(a), Some(b)) => a.cmp(b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl Entity for OrderedRecord {
    type Id = RecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Fields for a record that does not exist yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecord {
    pub position: i32,
    pub payload: Payload,
}

impl NewRecord {
    pub fn new(position: i32, payload: Payload) -> DomainResult<Self> {
        if position < 0 {
            return Err(DomainError::InvalidInput(format!(
                "position must be non-negative, got {}",
                position
            )));
        }
        Ok(Self { position, payload })
    }
}

/// Partial update of one record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordChanges {
    pub position: Option<i32>,
    /// Fields merged into the existing payload
    pub fields: Payload,
}

impl RecordChanges {
    pub fn position(position: i32) -> Self {
        Self {
            position: Some(position),
            fields: Payload::new(),
        }
    }

    pub fn fields(fields: Payload) -> Self {
        Self {
            position: None,
            fields,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.fields.is_empty()
    }

    pub fn validate(&self) -> DomainResult<()> {
        match self.position {
            Some(p) if p < 0 => Err(DomainError::InvalidInput(format!(
                "position must be non-negative, got {}",
                p
            ))),
            _ => Ok(()),
        }
    }

    /// Apply to an in-memory record
    pub fn apply_to(&self, record: &mut OrderedRecord) {
        if let Some(p) = self.position {
            record.position = p;
        }
        for (k, v) in &self.fields {
            record.payload.insert(k.clone(), v.clone());
        }
    }
}

/// New position value for one record, as part of a reorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: RecordId,
    pub position: i32,
}

impl PositionUpdate {
    pub fn new(id: RecordId, position: i32) -> Self {
        Self { id, position }
    }
}

/// Sort records into display order in place
pub fn sort_records(records: &mut [OrderedRecord]) {
    records.sort_by(OrderedRecord::display_cmp);
}

/// Position for a record appended after `records`.
///
/// `start` is used when the collection is empty.
pub fn next_position(records: &[OrderedRecord], start: i32) -> DomainResult<i32> {
    match records.iter().map(|r| r.position).max() {
        Some(max) => max
            .checked_add(1)
            .ok_or_else(|| DomainError::Conflict("position space exhausted".to_string())),
        None => Ok(start),
    }
}

/// Positions held by more than one record, with the ids sharing each.
pub fn find_duplicate_positions(records: &[OrderedRecord]) -> BTreeMap<i32, Vec<RecordId>> {
    let mut by_position: BTreeMap<i32, Vec<RecordId>> = BTreeMap::new();
    for r in records {
        by_position.entry(r.position).or_default().push(r.id.clone());
    }
    by_position.retain(|_, ids| ids.len() > 1);
    by_position
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rec(id: &str, position: i32) -> OrderedRecord {
        OrderedRecord::new(id, position)
    }

    #[test]
    fn test_next_position_appends_after_max() {
        let records = vec![rec("a", 5), rec("b", 9)];
        assert_eq!(next_position(&records, 0).unwrap(), 10);
    }

    #[test]
    fn test_next_position_uses_start_when_empty() {
        assert_eq!(next_position(&[], 0).unwrap(), 0);
        assert_eq!(next_position(&[], 1).unwrap(), 1);
    }

    #[test]
    fn test_next_position_overflow_is_conflict() {
        let records = vec![rec("a", i32::MAX)];
        assert!(matches!(next_position(&records, 0), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn test_sort_breaks_ties_by_creation_time() {
        let mut older = rec("z", 3);
        older.created_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let mut newer = rec("a", 3);
        newer.created_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());

        let mut records = vec![newer, rec("m", 1), older];
        sort_records(&mut records);

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["m", "z", "a"]);
    }

    #[test]
    fn test_find_duplicate_positions() {
        let records = vec![rec("a", 0), rec("b", 1), rec("c", 1), rec("d", 4)];
        let dups = find_duplicate_positions(&records);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[&1], vec![RecordId::from("b"), RecordId::from("c")]);
    }

    #[test]
    fn test_changes_merge_fields() {
        let mut record = rec("a", 0);
        record.payload.insert("title".into(), Value::from("old"));
        record.payload.insert("alt".into(), Value::from("keep"));

        let mut fields = Payload::new();
        fields.insert("title".into(), Value::from("new"));
        RecordChanges::fields(fields).apply_to(&mut record);

        assert_eq!(record.field_str("title"), Some("new"));
        assert_eq!(record.field_str("alt"), Some("keep"));
        assert_eq!(record.position, 0);
    }

    #[test]
    fn test_negative_position_rejected() {
        assert!(NewRecord::new(-1, Payload::new()).is_err());
        assert!(RecordChanges::position(-3).validate().is_err());
    }
}
