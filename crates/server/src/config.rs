// Server configuration
// Decision: A YAML file named by GATEHOUSE_CONFIG wins; otherwise AUTH_* environment variables
// Decision: Without AUTH_JWT_SECRET the server still starts, with a loud warning and an insecure secret

use anyhow::{Context, Result};
use gatehouse_core::{token::DEFAULT_TTL_SECS, AuthConfig, GuardConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the in-memory user provider guards refer to
pub const USERS_PROVIDER: &str = "users";

const INSECURE_SECRET: &str = "insecure-dev-secret-change-me";

/// Initial admin user
#[derive(Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    pub email: String,
    pub password: String,
    /// Opaque API token for the `token` guard
    #[serde(default)]
    pub api_token: Option<String>,
}

impl fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminConfig")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Complete server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Guard definitions and defaults
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub admin: Option<AdminConfig>,
    /// Guard used by the login route to issue tokens (must use the jwt driver)
    #[serde(default = "default_login_guard")]
    pub login_guard: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Allowed CORS origins; empty disables CORS
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_login_guard() -> String {
    "api".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:9000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            auth: AuthConfig::default(),
            admin: None,
            login_guard: default_login_guard(),
            bind_addr: default_bind_addr(),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Load from GATEHOUSE_CONFIG if set, else from the environment
    pub fn load() -> Result<Self> {
        match std::env::var("GATEHOUSE_CONFIG") {
            Ok(path) if !path.is_empty() => {
                tracing::info!("Loading configuration from {}", path);
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path))?;
                Self::from_yaml_str(&raw)
                    .with_context(|| format!("Failed to parse config file {}", path))
            }
            _ => Ok(Self::from_env()),
        }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).context("Invalid YAML configuration")
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| var(key).filter(|value| !value.is_empty());
        let flag = |key: &str| {
            non_empty(key)
                .map(|s| s.to_lowercase() == "true" || s == "1")
                .unwrap_or(false)
        };

        let secret = non_empty("AUTH_JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("AUTH_JWT_SECRET not set, using insecure default");
            INSECURE_SECRET.to_string()
        });
        let ttl = non_empty("AUTH_JWT_TTL")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TTL_SECS);

        let mut jwt = GuardConfig::new("jwt", USERS_PROVIDER)
            .with_option("secret", secret)
            .with_option("ttl", ttl);
        if let Some(app_name) = non_empty("AUTH_APP_NAME") {
            jwt = jwt.with_option("app_name", app_name);
        }

        let tokens =
            GuardConfig::new("token", USERS_PROVIDER).with_option("hash", flag("AUTH_TOKEN_HASH"));

        let auth = AuthConfig::default()
            .with_default_guard(non_empty("AUTH_DEFAULT_GUARD").unwrap_or_else(default_login_guard))
            .with_guard("api", jwt)
            .with_guard("tokens", tokens);

        let admin = match (non_empty("AUTH_ADMIN_EMAIL"), non_empty("AUTH_ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminConfig {
                email,
                password,
                api_token: non_empty("AUTH_ADMIN_API_TOKEN"),
            }),
            _ => None,
        };

        let cors_origins = non_empty("CORS_ALLOWED_ORIGINS")
            .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_default();

        Self {
            auth,
            admin,
            login_guard: default_login_guard(),
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(default_bind_addr),
            cors_origins,
        }
    }

    /// Whether opaque API tokens are stored as sha256 hashes
    pub fn hashes_api_tokens(&self) -> bool {
        self.auth
            .guards
            .values()
            .filter(|guard| guard.driver.as_deref() == Some("token"))
            .any(|guard| guard.options.get("hash").and_then(|v| v.as_bool()) == Some(true))
    }
}
