//! Wiring from configuration to live stores and managers

use std::sync::Arc;

use site_store::repository::{
    init_db, LocalAssetStore, MemoryRecordStore, RestAssetStore, RestConfig, RestRecordStore,
    SqliteRecordStore,
};
use site_store::{AssetStore, DomainError, RecordStore};
use thiserror::Error;

use crate::analytics::{AnalyticsEvent, AnalyticsSender, HttpBeacon, SendOutcome};
use crate::config::{AdminConfig, AssetConfig, BackendConfig, ConfigError};
use crate::manager::PositionedCollectionManager;
use crate::notify::Notifier;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("store: {0}")]
    Store(#[from] DomainError),
}

pub struct AdminApp {
    config: AdminConfig,
    store: Arc<dyn RecordStore>,
    assets: Option<Arc<dyn AssetStore>>,
    notifier: Arc<dyn Notifier>,
    analytics: AnalyticsSender,
}

fn rest_config(kind: &'static str, base_url: &str, api_key: &Option<String>) -> Result<RestConfig, ConfigError> {
    let key = api_key.as_deref().ok_or(ConfigError::MissingApiKey(kind))?;
    Ok(RestConfig::new(base_url, key))
}

impl AdminApp {
    /// Open the configured backend
    pub async fn open(config: AdminConfig, notifier: Arc<dyn Notifier>) -> Result<Self, AppError> {
        let store: Arc<dyn RecordStore> = match &config.backend {
            BackendConfig::Sqlite { path } => {
                let state = init_db(path).await?;
                Arc::new(SqliteRecordStore::from_state(&state))
            }
            BackendConfig::Rest { base_url, api_key } => {
                Arc::new(RestRecordStore::new(rest_config("rest", base_url, api_key)?))
            }
            BackendConfig::Memory => {
                log::warn!("Using in-memory store; changes are lost on exit");
                Arc::new(MemoryRecordStore::new())
            }
        };

        let assets: Option<Arc<dyn AssetStore>> = match &config.assets {
            AssetConfig::None => None,
            AssetConfig::Local { root } => Some(Arc::new(LocalAssetStore::new(root.clone()))),
            AssetConfig::Rest { base_url, api_key } => Some(Arc::new(RestAssetStore::new(rest_config(
                "asset",
                base_url,
                api_key,
            )?))),
        };

        let analytics = AnalyticsSender::new(config.analytics.clone(), Arc::new(HttpBeacon::new()));
        log::debug!("Analytics status: {:?}", analytics.status());

        Ok(Self::from_parts(config, store, assets, notifier, analytics))
    }

    pub fn from_parts(
        config: AdminConfig,
        store: Arc<dyn RecordStore>,
        assets: Option<Arc<dyn AssetStore>>,
        notifier: Arc<dyn Notifier>,
        analytics: AnalyticsSender,
    ) -> Self {
        Self {
            config,
            store,
            assets,
            notifier,
            analytics,
        }
    }

    pub fn config(&self) -> &AdminConfig {
        &self.config
    }

    /// Manager for a configured scope, with asset cleanup when the scope has assets
    pub fn manager(&self, scope_name: &str) -> Result<PositionedCollectionManager, AppError> {
        let scope = self.config.scope(scope_name)?.clone();
        let has_assets = scope.asset_field.is_some();
        let mut manager = PositionedCollectionManager::new(scope, self.store.clone(), self.notifier.clone())?;
        if let (true, Some(assets)) = (has_assets, &self.assets) {
            manager = manager.with_assets(assets.clone());
        }
        Ok(manager)
    }

    pub async fn track(&self, event: AnalyticsEvent) -> SendOutcome {
        self.analytics.send(&event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{AnalyticsConfig, DisabledReason};
    use crate::notify::ChannelNotifier;
    use site_store::OrderedRecord;

    fn quiet() -> Arc<dyn Notifier> {
        Arc::new(ChannelNotifier::channel().0)
    }

    fn memory_config() -> AdminConfig {
        AdminConfig {
            backend: BackendConfig::Memory,
            ..AdminConfig::default()
        }
    }

    #[tokio::test]
    async fn test_open_memory_backend_and_build_manager() {
        let app = AdminApp::open(memory_config(), quiet()).await.unwrap();
        let manager = app.manager("grid_images").unwrap();

        let created = manager.append(serde_json::Map::new()).await.unwrap();
        assert_eq!(created.position, 1);
        assert!(matches!(app.manager("missing"), Err(AppError::Config(ConfigError::UnknownScope(_)))));
    }

    #[tokio::test]
    async fn test_rest_backend_requires_key() {
        let config = AdminConfig {
            backend: BackendConfig::Rest {
                base_url: "https://p.supabase.co".into(),
                api_key: None,
            },
            ..AdminConfig::default()
        };
        let err = AdminApp::open(config, quiet()).await.err().unwrap();
        assert!(matches!(err, AppError::Config(ConfigError::MissingApiKey("rest"))));
    }

    #[tokio::test]
    async fn test_sqlite_backend_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let config = AdminConfig {
            backend: BackendConfig::Sqlite {
                path: dir.path().join("admin.db"),
            },
            ..AdminConfig::default()
        };

        {
            let app = AdminApp::open(config.clone(), quiet()).await.unwrap();
            let manager = app.manager("categories").unwrap();
            manager.append(serde_json::Map::new()).await.unwrap();
            manager.append(serde_json::Map::new()).await.unwrap();
        }

        let app = AdminApp::open(config, quiet()).await.unwrap();
        let manager = app.manager("categories").unwrap();
        let loaded: Vec<i32> = manager.load().await.unwrap().iter().map(|r: &OrderedRecord| r.position).collect();
        assert_eq!(loaded, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_track_respects_disabled_analytics() {
        let mut config = memory_config();
        config.analytics = AnalyticsConfig::default();
        let app = AdminApp::open(config, quiet()).await.unwrap();
        let outcome = app.track(AnalyticsEvent::new("admin_action")).await;
        assert_eq!(outcome, SendOutcome::Skipped(DisabledReason::Configured));
    }
}
