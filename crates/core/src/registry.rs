// Guard driver registry
//
// Maps a driver identifier ("jwt", "token", ...) to a factory that builds a
// guard from its GuardContext. Embedders register custom drivers at startup;
// unknown identifiers fail closed with a configuration error.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AuthError, AuthResult};
use crate::guard::{Guard, GuardContext, JwtGuard, TokenGuard};

/// Type alias for guard factory functions
pub type GuardFactory = Arc<dyn Fn(GuardContext) -> AuthResult<Arc<dyn Guard>> + Send + Sync>;

/// Registry of guard drivers
#[derive(Clone, Default)]
pub struct GuardRegistry {
    factories: HashMap<String, GuardFactory>,
}

impl GuardRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in `jwt` and `token` drivers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(JwtGuard::DRIVER, |context| {
            Ok(Arc::new(JwtGuard::from_context(context)?) as Arc<dyn Guard>)
        });
        registry.register(TokenGuard::DRIVER, |context| {
            Ok(Arc::new(TokenGuard::from_context(context)?) as Arc<dyn Guard>)
        });
        registry
    }

    /// Register a driver factory (replaces any previous one with the same id)
    pub fn register<F>(&mut self, driver: impl Into<String>, factory: F)
    where
        F: Fn(GuardContext) -> AuthResult<Arc<dyn Guard>> + Send + Sync + 'static,
    {
        self.factories.insert(driver.into(), Arc::new(factory));
    }

    /// Check if a driver is registered
    pub fn has_driver(&self, driver: &str) -> bool {
        self.factories.contains_key(driver)
    }

    /// Registered driver ids, sorted
    pub fn registered_drivers(&self) -> Vec<&str> {
        let mut drivers: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        drivers.sort_unstable();
        drivers
    }

    /// Build a guard with the named driver
    pub fn create(&self, driver: &str, context: GuardContext) -> AuthResult<Arc<dyn Guard>> {
        let factory = self.factories.get(driver).ok_or_else(|| {
            AuthError::config(format!(
                "Auth driver [{}] for guard [{}] is not defined.",
                driver, context.name
            ))
        })?;
        factory(context)
    }
}

impl std::fmt::Debug for GuardRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardRegistry")
            .field("drivers", &self.registered_drivers())
            .finish()
    }
}
