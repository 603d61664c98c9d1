// Authentication configuration
//
// The core reads configuration through ConfigSource with dotted keys:
// - auth.defaults.guard   → default guard name
// - auth.guards.<name>    → GuardConfig for that guard
//
// AuthConfig is the typed form of the `auth` section. Loading it from files or
// the environment is left to the embedding binary.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{AuthError, AuthResult};

/// Key-value configuration lookup
pub trait ConfigSource: Send + Sync {
    /// Value at a dotted key, if present
    fn get(&self, key: &str) -> Option<Value>;
}

/// ConfigSource over an in-memory JSON tree
#[derive(Debug, Clone, Default)]
pub struct ConfigRepository {
    root: Value,
}

impl ConfigRepository {
    pub fn new(root: Value) -> Self {
        Self { root }
    }
}

impl ConfigSource for ConfigRepository {
    fn get(&self, key: &str) -> Option<Value> {
        let mut node = &self.root;
        for segment in key.split('.') {
            node = node.as_object()?.get(segment)?;
        }
        if node.is_null() {
            None
        } else {
            Some(node.clone())
        }
    }
}

/// Configuration for a single named guard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Driver identifier registered in the GuardRegistry ("jwt", "token", ...)
    #[serde(default)]
    pub driver: Option<String>,
    /// Name of the user provider
    #[serde(default)]
    pub provider: Option<String>,
    /// Driver-specific options
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl GuardConfig {
    pub fn new(driver: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            driver: Some(driver.into()),
            provider: Some(provider.into()),
            options: Map::new(),
        }
    }

    /// Set a driver option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Parse a raw config value for the named guard
    pub fn from_value(name: &str, value: Value) -> AuthResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| AuthError::config(format!("Auth guard [{}] is malformed: {}", name, e)))
    }
}

/// Default selections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthDefaults {
    /// Guard used when none is named
    #[serde(default)]
    pub guard: Option<String>,
}

/// The `auth` configuration section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub defaults: AuthDefaults,
    #[serde(default)]
    pub guards: BTreeMap<String, GuardConfig>,
}

impl AuthConfig {
    /// Set the default guard name
    pub fn with_default_guard(mut self, name: impl Into<String>) -> Self {
        self.defaults.guard = Some(name.into());
        self
    }

    /// Add or replace a guard
    pub fn with_guard(mut self, name: impl Into<String>, guard: GuardConfig) -> Self {
        self.guards.insert(name.into(), guard);
        self
    }

    /// Wrap this section under the `auth` key for dotted lookups
    pub fn into_source(self) -> AuthResult<ConfigRepository> {
        let section = serde_json::to_value(self)
            .map_err(|e| AuthError::config(format!("Failed to serialize auth config: {}", e)))?;

        let mut root = Map::new();
        root.insert("auth".to_string(), section);
        Ok(ConfigRepository::new(Value::Object(root)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_repository_dotted_lookup() {
        let repo = ConfigRepository::new(json!({
            "auth": {
                "defaults": { "guard": "api" },
                "guards": { "api": { "driver": "jwt" } }
            }
        }));

        assert_eq!(repo.get("auth.defaults.guard"), Some(json!("api")));
        assert_eq!(repo.get("auth.guards.api.driver"), Some(json!("jwt")));
        assert_eq!(repo.get("auth.guards.web"), None);
        assert_eq!(repo.get("auth.defaults.guard.nested"), None);
    }

    #[test]
    fn test_auth_config_into_source() {
        let source = AuthConfig::default()
            .with_default_guard("api")
            .with_guard(
                "api",
                GuardConfig::new("jwt", "users").with_option("secret", "s3cr3t"),
            )
            .into_source()
            .unwrap();

        assert_eq!(source.get("auth.defaults.guard"), Some(json!("api")));
        let guard = GuardConfig::from_value("api", source.get("auth.guards.api").unwrap()).unwrap();
        assert_eq!(guard.driver.as_deref(), Some("jwt"));
        assert_eq!(guard.provider.as_deref(), Some("users"));
        assert_eq!(guard.options["secret"], json!("s3cr3t"));
    }

    #[test]
    fn test_guard_config_missing_fields_default() {
        let guard = GuardConfig::from_value("ghost", json!({ "provider": "users" })).unwrap();
        assert!(guard.driver.is_none());
        assert!(guard.options.is_empty());
    }

    #[test]
    fn test_guard_config_malformed() {
        let result = GuardConfig::from_value("bad", json!({ "driver": 42 }));
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }
}
