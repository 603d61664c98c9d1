// Core traits for pluggable collaborators
//
// The core never stores users itself. The embedding application supplies:
// - Authenticatable: the principal type (only identifier and remember token are used)
// - UserProvider: lookups by id, remember token or credential set
// - ProviderFactory: turns a configured provider name into a UserProvider

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{AuthError, AuthResult};

/// Credentials supplied for validation, in insertion order (field name → value)
pub type Credentials = Map<String, Value>;

/// Shared handle to an authenticated principal
pub type Principal = Arc<dyn Authenticatable>;

// ============================================================================
// Authenticatable - The principal contract
// ============================================================================

/// An entity that can be authenticated
///
/// Principals are shared behind `Arc`, so the remember-token setter takes
/// `&self`; implementations keep the token behind interior mutability.
pub trait Authenticatable: Send + Sync + fmt::Debug {
    /// Name of the identifier field (e.g. "id")
    fn auth_identifier_name(&self) -> &str {
        "id"
    }

    /// Unique identifier of the principal
    fn auth_identifier(&self) -> String;

    /// Current "remember me" token, if any
    fn remember_token(&self) -> Option<String> {
        None
    }

    /// Replace the "remember me" token
    fn set_remember_token(&self, _token: &str) {}

    /// Name of the remember-token field
    fn remember_token_name(&self) -> &str {
        "remember_token"
    }

    /// Access the concrete principal type
    fn as_any(&self) -> &dyn Any;
}

// ============================================================================
// UserProvider - Principal lookup and credential validation
// ============================================================================

/// Trait for looking up principals
///
/// `Ok(None)` means "no such principal". `Err` is reserved for hard failures
/// (storage unavailable, etc.) and is surfaced to the caller unchanged.
#[async_trait]
pub trait UserProvider: Send + Sync {
    /// Retrieve a principal by unique identifier
    async fn retrieve_by_id(&self, identifier: &str) -> AuthResult<Option<Principal>>;

    /// Retrieve a principal by identifier and "remember me" token
    async fn retrieve_by_token(
        &self,
        identifier: &str,
        token: &str,
    ) -> AuthResult<Option<Principal>>;

    /// Persist a new "remember me" token for the principal
    async fn update_remember_token(&self, user: &dyn Authenticatable, token: &str)
        -> AuthResult<()>;

    /// Retrieve a principal matching the credential set
    async fn retrieve_by_credentials(
        &self,
        credentials: &Credentials,
    ) -> AuthResult<Option<Principal>>;

    /// Check the credentials (e.g. password) against the principal
    async fn validate_credentials(
        &self,
        user: &dyn Authenticatable,
        credentials: &Credentials,
    ) -> AuthResult<bool>;
}

// ============================================================================
// ProviderFactory - Provider construction by configured name
// ============================================================================

/// Builds the user provider named by a guard's `provider` key
pub trait ProviderFactory: Send + Sync {
    fn create(&self, name: &str) -> AuthResult<Arc<dyn UserProvider>>;
}

/// Provider factory backed by a fixed name → provider table
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn UserProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Register a provider under a name (replaces any previous one)
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn UserProvider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Builder-style registration
    pub fn with(mut self, name: impl Into<String>, provider: Arc<dyn UserProvider>) -> Self {
        self.register(name, provider);
        self
    }

    /// Check if a provider is registered
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }
}

impl ProviderFactory for ProviderRegistry {
    fn create(&self, name: &str) -> AuthResult<Arc<dyn UserProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| AuthError::config(format!("User provider [{}] is not defined.", name)))
    }
}
