//! Analytics beacons
//!
//! Whether beacons go out is decided by the [`AnalyticsConfig`] handed to
//! each [`AnalyticsSender`], and by that sender's own failure count. There is
//! no process-wide switch: a sender that gave up only silences itself, and
//! says so through [`AnalyticsStatus`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use site_store::{DomainError, DomainResult, Payload};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Consecutive failures after which the sender stops; 0 never stops
    #[serde(default = "default_max_failures")]
    pub max_consecutive_failures: u32,
}

fn default_max_failures() -> u32 {
    3
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            max_consecutive_failures: default_max_failures(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisabledReason {
    /// Turned off in configuration
    Configured,
    NoEndpoint,
    TooManyFailures { failures: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsStatus {
    Enabled,
    Disabled(DisabledReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Skipped(DisabledReason),
    Failed { consecutive: u32, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsEvent {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(skip_serializing_if = "Payload::is_empty")]
    pub properties: Payload,
    pub timestamp: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            page: None,
            properties: Payload::new(),
            timestamp: Utc::now(),
        }
    }

    /// Dashboard page the event happened on, e.g. `admin/grid_images`
    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    pub fn with_property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }
}

/// Delivers one event to an endpoint
#[async_trait]
pub trait BeaconTransport: Send + Sync {
    async fn deliver(&self, endpoint: &str, event: &AnalyticsEvent) -> DomainResult<()>;
}

/// JSON POST over HTTP
pub struct HttpBeacon {
    client: reqwest::Client,
}

impl HttpBeacon {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpBeacon {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BeaconTransport for HttpBeacon {
    async fn deliver(&self, endpoint: &str, event: &AnalyticsEvent) -> DomainResult<()> {
        let response = self.client.post(endpoint).json(event).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DomainError::Unavailable(format!("beacon rejected with {}", status)))
        }
    }
}

pub struct AnalyticsSender {
    config: AnalyticsConfig,
    transport: Arc<dyn BeaconTransport>,
    consecutive_failures: AtomicU32,
}

impl AnalyticsSender {
    pub fn new(config: AnalyticsConfig, transport: Arc<dyn BeaconTransport>) -> Self {
        Self {
            config,
            transport,
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn status(&self) -> AnalyticsStatus {
        if !self.config.enabled {
            return AnalyticsStatus::Disabled(DisabledReason::Configured);
        }
        if self.config.endpoint.is_none() {
            return AnalyticsStatus::Disabled(DisabledReason::NoEndpoint);
        }
        let failures = self.consecutive_failures.load(Ordering::Relaxed);
        let limit = self.config.max_consecutive_failures;
        if limit > 0 && failures >= limit {
            return AnalyticsStatus::Disabled(DisabledReason::TooManyFailures { failures });
        }
        AnalyticsStatus::Enabled
    }

    pub async fn send(&self, event: &AnalyticsEvent) -> SendOutcome {
        if let AnalyticsStatus::Disabled(reason) = self.status() {
            return SendOutcome::Skipped(reason);
        }
        let Some(endpoint) = self.config.endpoint.as_deref() else {
            return SendOutcome::Skipped(DisabledReason::NoEndpoint);
        };

        match self.transport.deliver(endpoint, event).await {
            Ok(()) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                SendOutcome::Sent
            }
            Err(e) => {
                let consecutive = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!("Analytics beacon {} failed ({} in a row): {}", event.name, consecutive, e);
                if matches!(self.status(), AnalyticsStatus::Disabled(_)) {
                    log::warn!("Analytics disabled for this session after {} failures", consecutive);
                }
                SendOutcome::Failed {
                    consecutive,
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct FakeTransport {
        fail: AtomicBool,
        delivered: AtomicU32,
    }

    #[async_trait]
    impl BeaconTransport for FakeTransport {
        async fn deliver(&self, _endpoint: &str, _event: &AnalyticsEvent) -> DomainResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(DomainError::Unavailable("offline".into()));
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn enabled(max: u32) -> AnalyticsConfig {
        AnalyticsConfig {
            enabled: true,
            endpoint: Some("https://stats.example.com/beacon".into()),
            max_consecutive_failures: max,
        }
    }

    #[tokio::test]
    async fn test_disabled_by_config_sends_nothing() {
        let transport = Arc::new(FakeTransport::default());
        let sender = AnalyticsSender::new(AnalyticsConfig::default(), transport.clone());

        let outcome = sender.send(&AnalyticsEvent::new("page_view")).await;

        assert_eq!(outcome, SendOutcome::Skipped(DisabledReason::Configured));
        assert_eq!(transport.delivered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_reported() {
        let config = AnalyticsConfig { endpoint: None, ..enabled(3) };
        let sender = AnalyticsSender::new(config, Arc::new(FakeTransport::default()));
        assert_eq!(sender.status(), AnalyticsStatus::Disabled(DisabledReason::NoEndpoint));
    }

    #[tokio::test]
    async fn test_consecutive_failures_disable_sender() {
        let transport = Arc::new(FakeTransport::default());
        transport.fail.store(true, Ordering::SeqCst);
        let sender = AnalyticsSender::new(enabled(2), transport.clone());

        assert!(matches!(sender.send(&AnalyticsEvent::new("a")).await, SendOutcome::Failed { consecutive: 1, .. }));
        assert!(matches!(sender.send(&AnalyticsEvent::new("b")).await, SendOutcome::Failed { consecutive: 2, .. }));
        assert_eq!(
            sender.status(),
            AnalyticsStatus::Disabled(DisabledReason::TooManyFailures { failures: 2 })
        );

        transport.fail.store(false, Ordering::SeqCst);
        assert!(matches!(sender.send(&AnalyticsEvent::new("c")).await, SendOutcome::Skipped(_)));

        // Another sender with its own config is unaffected
        let fresh = AnalyticsSender::new(enabled(2), transport.clone());
        assert_eq!(fresh.send(&AnalyticsEvent::new("d")).await, SendOutcome::Sent);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let transport = Arc::new(FakeTransport::default());
        let sender = AnalyticsSender::new(enabled(2), transport.clone());

        transport.fail.store(true, Ordering::SeqCst);
        sender.send(&AnalyticsEvent::new("a")).await;
        transport.fail.store(false, Ordering::SeqCst);
        assert_eq!(sender.send(&AnalyticsEvent::new("b")).await, SendOutcome::Sent);
        transport.fail.store(true, Ordering::SeqCst);
        sender.send(&AnalyticsEvent::new("c")).await;

        assert_eq!(sender.status(), AnalyticsStatus::Enabled);
    }

    #[test]
    fn test_event_serialization_skips_empty_fields() {
        let event = AnalyticsEvent::new("admin_action").with_property("scope", "grid_images");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["name"], "admin_action");
        assert_eq!(json["properties"]["scope"], "grid_images");
        assert!(json.get("page").is_none());

        let on_page = AnalyticsEvent::new("admin_action").with_page("admin/categories");
        let json = serde_json::to_value(&on_page).unwrap();
        assert_eq!(json["page"], "admin/categories");
        assert!(json.get("properties").is_none());
    }
}
