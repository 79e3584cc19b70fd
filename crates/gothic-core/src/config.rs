//! Session configuration management.
//!
//! Holds the OAuth client id, API key, authorization scope and discovery
//! documents a session needs before any sign-in flow can run.
//!
//! Configuration is stored at `~/.config/gothic/config.json` and can be
//! overridden from `GOTHIC_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "gothic";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub scope: String,
    /// Discovery documents; a single string is accepted as a one-element list
    #[serde(default, deserialize_with = "one_or_many")]
    pub discovery: Vec<String>,
    /// Where the recognition marker lives (defaults to the cache directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker_dir: Option<PathBuf>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(doc) => vec![doc],
        OneOrMany::Many(docs) => docs,
    })
}

impl Config {
    pub fn new(
        client_id: impl Into<String>,
        api_key: impl Into<String>,
        scope: impl Into<String>,
        discovery: Vec<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            api_key: api_key.into(),
            scope: scope.into(),
            discovery,
            marker_dir: None,
        }
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Override fields from `GOTHIC_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("GOTHIC_CLIENT_ID") {
            self.client_id = v;
        }
        if let Some(v) = var("GOTHIC_API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = var("GOTHIC_SCOPE") {
            self.scope = v;
        }
        if let Some(v) = var("GOTHIC_DISCOVERY") {
            self.discovery = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Missing("client_id"));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("api_key"));
        }
        if self.scope.trim().is_empty() {
            return Err(ConfigError::Missing("scope"));
        }
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn marker_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.marker_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_discovery_accepts_single_string() {
        let config: Config = serde_json::from_str(
            r#"{"client_id":"cid","api_key":"key","scope":"s","discovery":"doc"}"#,
        )
        .unwrap();
        assert_eq!(config.discovery, vec!["doc".to_string()]);
    }

    #[test]
    fn test_discovery_accepts_list() {
        let config: Config =
            serde_json::from_str(r#"{"client_id":"cid","discovery":["a","b"]}"#).unwrap();
        assert_eq!(config.discovery, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(config.api_key, "");
    }

    #[test]
    fn test_validate_requires_fields() {
        let mut config = Config::new("cid", "key", "scope", vec![]);
        assert!(config.validate().is_ok());

        config.scope = " ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::Missing("scope")));

        config.client_id.clear();
        assert_eq!(config.validate(), Err(ConfigError::Missing("client_id")));
    }

    #[test]
    fn test_apply_vars_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("GOTHIC_CLIENT_ID", "env-cid"),
            ("GOTHIC_DISCOVERY", "one, two,,"),
        ]);
        let mut config = Config::new("cid", "key", "scope", vec!["old".to_string()]);
        config.apply_vars(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.client_id, "env-cid");
        assert_eq!(config.api_key, "key");
        assert_eq!(config.discovery, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"client_id":"cid","api_key":"key","scope":"s","marker_dir":"/tmp/m"}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.client_id, "cid");
        assert_eq!(config.marker_dir().unwrap(), PathBuf::from("/tmp/m"));
    }
}
