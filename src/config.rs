//! Admin configuration
//!
//! JSON file plus a couple of environment overrides. Every scope the
//! dashboard manages has a built-in definition; the file may add scopes or
//! override them by name.

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use site_store::{DomainError, Scope};
use thiserror::Error;

use crate::analytics::AnalyticsConfig;

pub const ENV_API_KEY: &str = "SITE_ADMIN_API_KEY";
pub const ENV_DB_PATH: &str = "SITE_ADMIN_DB";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("invalid config {0}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),
    #[error("unknown scope {0:?}")]
    UnknownScope(String),
    #[error("scope {0:?}: {1}")]
    InvalidScope(String, #[source] DomainError),
    #[error("{0} backend needs an API key (set {ENV_API_KEY})")]
    MissingApiKey(&'static str),
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// The named file did not exist
    Defaults(PathBuf),
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "loaded config from {}", path.display()),
            ConfigSource::Defaults(path) => write!(f, "{} not found, using default config", path.display()),
        }
    }
}

/// Where records live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Sqlite {
        path: PathBuf,
    },
    Rest {
        base_url: String,
        #[serde(default)]
        api_key: Option<String>,
    },
    Memory,
}

/// Where uploaded files live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetConfig {
    None,
    Local {
        root: PathBuf,
    },
    Rest {
        base_url: String,
        #[serde(default)]
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub backend: BackendConfig,
    pub assets: AssetConfig,
    pub scopes: BTreeMap<String, Scope>,
    pub analytics: AnalyticsConfig,
    pub log_dir: PathBuf,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Sqlite {
                path: PathBuf::from("site-admin.db"),
            },
            assets: AssetConfig::None,
            scopes: default_scopes(),
            analytics: AnalyticsConfig::default(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

/// Scopes managed by the dashboard out of the box
pub fn default_scopes() -> BTreeMap<String, Scope> {
    [
        ("grid_images", Scope::new("grid_images").with_start_position(1).with_asset("image_url", "images")),
        ("media_carousel", Scope::new("media_carousel_items").with_asset("media_url", "media")),
        ("categories", Scope::new("categories").with_position_field("display_order")),
        ("vertical_carousel", Scope::new("vertical_carousel_items").with_asset("image_url", "images")),
    ]
    .into_iter()
    .map(|(name, scope)| (name.to_string(), scope))
    .collect()
}

impl AdminConfig {
    /// Read a config file; missing built-in scopes are filled in
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let mut config: AdminConfig =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        for (name, scope) in default_scopes() {
            config.scopes.entry(name).or_insert(scope);
        }
        Ok(config)
    }

    /// `load` if the file exists, defaults otherwise.
    ///
    /// Runs before logging is installed, so nothing is logged here; the
    /// returned [`ConfigSource`] is for the caller to report.
    pub fn load_or_default(path: &Path) -> Result<(Self, ConfigSource), ConfigError> {
        if path.exists() {
            Ok((Self::load(path)?, ConfigSource::File(path.to_path_buf())))
        } else {
            Ok((Self::default(), ConfigSource::Defaults(path.to_path_buf())))
        }
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(env::var(ENV_API_KEY).ok(), env::var(ENV_DB_PATH).ok());
    }

    fn apply_overrides(&mut self, api_key: Option<String>, db_path: Option<String>) {
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            if let BackendConfig::Rest { api_key, .. } = &mut self.backend {
                api_key.get_or_insert_with(|| key.clone());
            }
            if let AssetConfig::Rest { api_key, .. } = &mut self.assets {
                api_key.get_or_insert_with(|| key.clone());
            }
        }

        if let Some(path) = db_path {
            match &mut self.backend {
                BackendConfig::Sqlite { path: current } => {
                    log::info!("{} overrides database path with {}", ENV_DB_PATH, path);
                    *current = PathBuf::from(path);
                }
                _ => log::warn!("{} is set but the backend is not sqlite; ignored", ENV_DB_PATH),
            }
        }
    }

    /// Validated scope by its configured name
    pub fn scope(&self, name: &str) -> Result<&Scope, ConfigError> {
        let scope = self
            .scopes
            .get(name)
            .ok_or_else(|| ConfigError::UnknownScope(name.to_string()))?;
        scope
            .validate()
            .map_err(|e| ConfigError::InvalidScope(name.to_string(), e))?;
        Ok(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scopes_are_valid() {
        let config = AdminConfig::default();
        for name in config.scopes.keys() {
            assert!(config.scope(name).is_ok(), "{} invalid", name);
        }
        assert_eq!(config.scope("grid_images").unwrap().start_position, 1);
        assert_eq!(config.scope("categories").unwrap().position_field, "display_order");
        assert!(matches!(config.scope("nope"), Err(ConfigError::UnknownScope(_))));
    }

    #[test]
    fn test_load_merges_file_scopes_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin.json");
        std::fs::write(
            &path,
            r#"{
                "backend": {"kind": "rest", "base_url": "https://p.supabase.co"},
                "scopes": {
                    "categories": {"collection": "product_categories"},
                    "home_carousel": {"collection": "carousel_items",
                                      "partition": {"field": "carousel_id", "value": "home"}}
                }
            }"#,
        )
        .unwrap();

        let config = AdminConfig::load(&path).unwrap();
        assert_eq!(config.scope("categories").unwrap().collection, "product_categories");
        assert_eq!(config.scope("home_carousel").unwrap().key(), "carousel_items:carousel_id=home");
        assert!(config.scope("grid_images").is_ok());
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_load_or_default_reports_source() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        let (config, source) = AdminConfig::load_or_default(&missing).unwrap();
        assert_eq!(config, AdminConfig::default());
        assert_eq!(source, ConfigSource::Defaults(missing.clone()));
        assert!(source.to_string().contains("using default config"));

        let present = dir.path().join("admin.json");
        std::fs::write(&present, r#"{"log_dir": "/var/log/site-admin"}"#).unwrap();
        let (config, source) = AdminConfig::load_or_default(&present).unwrap();
        assert_eq!(config.log_dir, PathBuf::from("/var/log/site-admin"));
        assert_eq!(source, ConfigSource::File(present));
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = AdminConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_overrides_fill_missing_api_key() {
        let mut config = AdminConfig {
            backend: BackendConfig::Rest {
                base_url: "https://p.supabase.co".into(),
                api_key: None,
            },
            assets: AssetConfig::Rest {
                base_url: "https://p.supabase.co".into(),
                api_key: Some("explicit".into()),
            },
            ..AdminConfig::default()
        };

        config.apply_overrides(Some("from-env".into()), Some("ignored.db".into()));

        assert_eq!(
            config.backend,
            BackendConfig::Rest { base_url: "https://p.supabase.co".into(), api_key: Some("from-env".into()) }
        );
        assert_eq!(
            config.assets,
            AssetConfig::Rest { base_url: "https://p.supabase.co".into(), api_key: Some("explicit".into()) }
        );
    }

    #[test]
    fn test_db_override_for_sqlite() {
        let mut config = AdminConfig::default();
        config.apply_overrides(None, Some("/tmp/other.db".into()));
        assert_eq!(config.backend, BackendConfig::Sqlite { path: PathBuf::from("/tmp/other.db") });
    }
}
