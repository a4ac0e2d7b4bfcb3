//! REST Record Store
//!
//! Adapter for the hosted backend-as-a-service. Collections are exposed as
//! PostgREST-style tables under `/rest/v1/<collection>`; filters travel as
//! `field=eq.value` query parameters. The service offers single-row writes
//! only, so `reorder` keeps the sequential default.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::traits::RecordStore;
use crate::domain::{
    DomainError, DomainResult, NewRecord, OrderedRecord, Payload, RecordChanges, RecordId, Scope,
};

const ID_FIELD: &str = "id";

/// Connection settings for the hosted backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestConfig {
    /// Project URL, e.g. `https://project.supabase.co`
    pub base_url: String,
    pub api_key: String,
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }
}

/// Attach the service's auth headers
pub(super) fn authorize(builder: RequestBuilder, config: &RestConfig) -> RequestBuilder {
    builder
        .header("apikey", &config.api_key)
        .bearer_auth(&config.api_key)
}

/// Map a non-success response to a domain error
pub(super) async fn check_response(response: Response, action: &str) -> DomainResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let msg = format!("{} failed ({}): {}", action, status, body.trim());
    Err(match status {
        StatusCode::NOT_FOUND => DomainError::NotFound(msg),
        StatusCode::CONFLICT => DomainError::Conflict(msg),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => DomainError::InvalidInput(msg),
        _ => DomainError::Unavailable(msg),
    })
}

/// REST implementation of the record store
pub struct RestRecordStore {
    client: Client,
    config: RestConfig,
}

impl RestRecordStore {
    pub fn new(config: RestConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: RestConfig) -> Self {
        Self { client, config }
    }

    fn table_url(&self, scope: &Scope) -> String {
        format!("{}/rest/v1/{}", self.config.base_url, scope.collection)
    }

    fn request(&self, method: reqwest::Method, scope: &Scope) -> RequestBuilder {
        authorize(self.client.request(method, self.table_url(scope)), &self.config)
    }

    /// Rows returned by a write with `Prefer: return=representation`
    async fn representation(response: Response) -> DomainResult<Vec<Payload>> {
        Ok(response.json::<Vec<Payload>>().await?)
    }
}

/// Filter pinning a request to one row of the scope
fn row_filter(scope: &Scope, id: &RecordId) -> Vec<(String, String)> {
    let mut query = vec![(ID_FIELD.to_string(), format!("eq.{}", id))];
    if let Some(p) = &scope.partition {
        query.push((p.field.clone(), format!("eq.{}", p.value)));
    }
    query
}

/// Position ascending, then creation time when the collection has one
fn order_clause(scope: &Scope) -> String {
    match &scope.created_at_field {
        Some(field) => format!("{}.asc,{}.asc", scope.position_field, field),
        None => format!("{}.asc", scope.position_field),
    }
}

/// Convert one service row into a record
pub(super) fn row_to_record(scope: &Scope, mut row: Payload) -> DomainResult<OrderedRecord> {
    let id = match row.remove(ID_FIELD) {
        Some(Value::String(s)) => RecordId::new(s),
        Some(Value::Number(n)) => RecordId::new(n.to_string()),
        other => {
            return Err(DomainError::Internal(format!(
                "{} row without usable id: {:?}",
                scope.collection, other
            )))
        }
    };

    let position = row
        .remove(&scope.position_field)
        .and_then(|v| v.as_i64())
        .and_then(|p| i32::try_from(p).ok())
        .ok_or_else(|| {
            DomainError::Internal(format!(
                "{} row {} has no integer {}",
                scope.collection, id, scope.position_field
            ))
        })?;

    let created_at = scope
        .created_at_field
        .as_ref()
        .and_then(|field| row.remove(field))
        .and_then(|v| v.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok()))
        .map(|dt| dt.with_timezone(&Utc));

    Ok(OrderedRecord {
        id,
        position,
        created_at,
        payload: row,
    })
}

/// JSON body for a write: payload fields plus the scope's own columns
pub(super) fn write_body(scope: &Scope, position: Option<i32>, fields: &Payload) -> Payload {
    let mut body = fields.clone();
    body.remove(ID_FIELD);
    if let Some(field) = &scope.created_at_field {
        body.remove(field);
    }
    if let Some(p) = position {
        body.insert(scope.position_field.clone(), Value::from(p));
    }
    if let Some(partition) = &scope.partition {
        body.insert(partition.field.clone(), Value::from(partition.value.clone()));
    }
    body
}

#[async_trait]
impl RecordStore for RestRecordStore {
    async fn fetch_all(&self, scope: &Scope) -> DomainResult<Vec<OrderedRecord>> {
        let mut query = vec![
            ("select".to_string(), "*".to_string()),
            ("order".to_string(), order_clause(scope)),
        ];
        if let Some(p) = &scope.partition {
            query.push((p.field.clone(), format!("eq.{}", p.value)));
        }

        let response = self.request(reqwest::Method::GET, scope).query(&query).send().await?;
        let rows: Vec<Payload> = check_response(response, "fetch").await?.json().await?;

        rows.into_iter().map(|row| row_to_record(scope, row)).collect()
    }

    async fn create(&self, scope: &Scope, record: &NewRecord) -> DomainResult<OrderedRecord> {
        let body = write_body(scope, Some(record.position), &record.payload);
        let response = self
            .request(reqwest::Method::POST, scope)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;

        let rows = Self::representation(check_response(response, "create").await?).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::Internal("create returned no row".to_string()))?;
        row_to_record(scope, row)
    }

    async fn update(&self, scope: &Scope, id: &RecordId, changes: &RecordChanges) -> DomainResult<()> {
        changes.validate()?;
        if changes.is_empty() {
            return Ok(());
        }

        let mut body = write_body(scope, changes.position, &changes.fields);
        if let Some(p) = &scope.partition {
            body.remove(&p.field);
        }

        let response = self
            .request(reqwest::Method::PATCH, scope)
            .query(&row_filter(scope, id))
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;

        let rows = Self::representation(check_response(response, "update").await?).await?;
        if rows.is_empty() {
            return Err(DomainError::NotFound(format!("Record {} not found", id)));
        }
        Ok(())
    }

    async fn delete(&self, scope: &Scope, id: &RecordId) -> DomainResult<()> {
        let response = self
            .request(reqwest::Method::DELETE, scope)
            .query(&row_filter(scope, id))
            .header("Prefer", "return=representation")
            .send()
            .await?;

        let rows = Self::representation(check_response(response, "delete").await?).await?;
        if rows.is_empty() {
            return Err(DomainError::NotFound(format!("Record {} not found", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_row_to_record_splits_columns() {
        let scope = Scope::new("categories").with_position_field("display_order");
        let row = payload(json!({
            "id": 42,
            "display_order": 3,
            "created_at": "2024-03-01T10:00:00+00:00",
            "name": "Tinctures"
        }));

        let record = row_to_record(&scope, row).unwrap();
        assert_eq!(record.id.as_str(), "42");
        assert_eq!(record.position, 3);
        assert!(record.created_at.is_some());
        assert_eq!(record.field_str("name"), Some("Tinctures"));
        assert!(!record.payload.contains_key("display_order"));
    }

    #[test]
    fn test_row_without_position_is_error() {
        let scope = Scope::new("grid_images");
        let row = payload(json!({"id": "abc", "image_url": "x"}));
        assert!(row_to_record(&scope, row).is_err());
    }

    #[test]
    fn test_write_body_adds_scope_columns() {
        let scope = Scope::new("carousel_items").with_partition("carousel_id", "home");
        let fields = payload(json!({"title": "Hero", "id": "ignored"}));

        let body = write_body(&scope, Some(7), &fields);
        assert_eq!(body.get("position"), Some(&json!(7)));
        assert_eq!(body.get("carousel_id"), Some(&json!("home")));
        assert_eq!(body.get("title"), Some(&json!("Hero")));
        assert!(!body.contains_key("id"));
    }

    #[test]
    fn test_row_filter_pins_partition() {
        let scope = Scope::new("carousel_items").with_partition("carousel_id", "home");
        let filter = row_filter(&scope, &RecordId::from("9"));
        assert_eq!(
            filter,
            vec![
                ("id".to_string(), "eq.9".to_string()),
                ("carousel_id".to_string(), "eq.home".to_string()),
            ]
        );
    }

    #[test]
    fn test_order_clause_without_created_at_column() {
        let scope = Scope::new("categories").with_position_field("display_order");
        assert_eq!(order_clause(&scope), "display_order.asc,created_at.asc");

        let bare = Scope::new("legacy_banners").with_created_at_field(None);
        assert_eq!(order_clause(&bare), "position.asc");

        let row = payload(json!({"id": 1, "position": 0, "created_at": "2024-03-01T10:00:00+00:00"}));
        let record = row_to_record(&bare, row).unwrap();
        assert!(record.created_at.is_none());
        assert!(record.payload.contains_key("created_at"));
    }

    #[test]
    fn test_config_trims_trailing_slash() {
        let config = RestConfig::new("https://example.supabase.co/", "key");
        assert_eq!(config.base_url, "https://example.supabase.co");
    }
}
