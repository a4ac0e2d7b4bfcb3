//! Collection Scope
//!
//! A scope bounds which records share one ordering invariant, e.g. all
//! homepage grid images, or the items of one carousel.

use serde::{Deserialize, Serialize};

use super::entity::{DomainError, DomainResult};

/// Filter restricting a collection to one partition (`field = value`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    pub field: String,
    pub value: String,
}

/// Identifying context for one ordered collection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    /// Backing collection (table) name
    pub collection: String,
    #[serde(default)]
    pub partition: Option<Partition>,
    /// Name of the ordering column (`position`, `display_order`, ...)
    #[serde(default = "default_position_field")]
    pub position_field: String,
    /// Position given to the first record of an empty collection
    #[serde(default)]
    pub start_position: i32,
    /// Payload field holding the public URL of an uploaded asset
    #[serde(default)]
    pub asset_field: Option<String>,
    /// Storage bucket the asset URL points into
    #[serde(default)]
    pub asset_bucket: Option<String>,
    /// Creation timestamp column used to break position ties; `null` when
    /// the collection has none
    #[serde(default = "default_created_at_field")]
    pub created_at_field: Option<String>,
}

fn default_position_field() -> String {
    "position".to_string()
}

fn default_created_at_field() -> Option<String> {
    Some("created_at".to_string())
}

impl Scope {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            partition: None,
            position_field: default_position_field(),
            start_position: 0,
            asset_field: None,
            asset_bucket: None,
            created_at_field: default_created_at_field(),
        }
    }

    pub fn with_position_field(mut self, field: impl Into<String>) -> Self {
        self.position_field = field.into();
        self
    }

    pub fn with_start_position(mut self, start: i32) -> Self {
        self.start_position = start;
        self
    }

    pub fn with_partition(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.partition = Some(Partition {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_asset(mut self, field: impl Into<String>, bucket: impl Into<String>) -> Self {
        self.asset_field = Some(field.into());
        self.asset_bucket = Some(bucket.into());
        self
    }

    /// Column holding creation time, or `None` to order by position alone
    pub fn with_created_at_field(mut self, field: Option<&str>) -> Self {
        self.created_at_field = field.map(str::to_string);
        self
    }

    /// Stable key identifying this scope in a single shared table
    pub fn key(&self) -> String {
        match &self.partition {
            Some(p) => format!("{}:{}={}", self.collection, p.field, p.value),
            None => self.collection.clone(),
        }
    }

    /// Check identifiers that adapters interpolate into queries and URLs
    pub fn validate(&self) -> DomainResult<()> {
        check_identifier("collection", &self.collection)?;
        check_identifier("position_field", &self.position_field)?;
        if let Some(p) = &self.partition {
            check_identifier("partition field", &p.field)?;
        }
        if let Some(f) = &self.asset_field {
            check_identifier("asset_field", f)?;
        }
        if let Some(f) = &self.created_at_field {
            check_identifier("created_at_field", f)?;
        }
        if self.start_position < 0 {
            return Err(DomainError::InvalidInput(format!(
                "start_position must be non-negative, got {}",
                self.start_position
            )));
        }
        Ok(())
    }
}

fn check_identifier(what: &str, value: &str) -> DomainResult<()> {
    let valid = !value.is_empty()
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !value.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(DomainError::InvalidInput(format!("invalid {}: {:?}", what, value)))
    }
}
