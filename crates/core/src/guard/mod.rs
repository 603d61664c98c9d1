// Guards
//
// A guard derives the current request's principal from transport evidence and
// memoizes the result for its own lifetime (one request). Shared behaviour
// (check/guest/id/authenticate/set_user/forget_user) lives in provided trait
// methods on top of GuardState; drivers supply derivation and validation.

pub mod jwt;
pub mod token;

pub use jwt::JwtGuard;
pub use token::{hash_token, TokenGuard, TokenGuardOptions};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{AuthError, AuthResult};
use crate::events::{AuthEvent, EventSink};
use crate::traits::{Credentials, Principal, UserProvider};
use crate::transport::Transport;

// ============================================================================
// GuardState - Memoized resolution
// ============================================================================

#[derive(Debug, Default)]
enum Resolution {
    #[default]
    Unresolved,
    Anonymous,
    Authenticated(Principal),
}

/// Cached principal of a single guard
///
/// Moves out of `Unresolved` at most once per derivation; the lock is held
/// while deriving so concurrent callers on the same guard share one lookup.
/// A derivation error leaves the state unresolved.
#[derive(Debug, Default)]
pub struct GuardState {
    resolution: Mutex<Resolution>,
}

impl GuardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized principal, deriving it on first use
    pub async fn resolve_with<F, Fut>(&self, derive: F) -> AuthResult<Option<Principal>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = AuthResult<Option<Principal>>> + Send,
    {
        let mut resolution = self.resolution.lock().await;
        match &*resolution {
            Resolution::Authenticated(user) => return Ok(Some(user.clone())),
            Resolution::Anonymous => return Ok(None),
            Resolution::Unresolved => {}
        }

        let user = derive().await?;
        *resolution = match &user {
            Some(user) => Resolution::Authenticated(user.clone()),
            None => Resolution::Anonymous,
        };
        Ok(user)
    }

    /// Cached principal, without deriving
    pub async fn current(&self) -> Option<Principal> {
        match &*self.resolution.lock().await {
            Resolution::Authenticated(user) => Some(user.clone()),
            _ => None,
        }
    }

    /// Whether derivation has already run (or a principal was set)
    pub async fn is_resolved(&self) -> bool {
        !matches!(&*self.resolution.lock().await, Resolution::Unresolved)
    }

    pub async fn set(&self, user: Principal) {
        *self.resolution.lock().await = Resolution::Authenticated(user);
    }

    /// Reset to unresolved, returning the principal that was cached
    pub async fn forget(&self) -> Option<Principal> {
        match std::mem::take(&mut *self.resolution.lock().await) {
            Resolution::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

// ============================================================================
// Guard trait
// ============================================================================

/// Authentication strategy bound to one request
#[async_trait]
pub trait Guard: Send + Sync + 'static {
    /// Configured guard name
    fn name(&self) -> &str;

    /// Driver identifier this guard was built from
    fn driver(&self) -> &'static str;

    /// User provider backing this guard
    fn provider(&self) -> Arc<dyn UserProvider>;

    fn state(&self) -> &GuardState;

    fn events(&self) -> &dyn EventSink;

    /// Access the concrete guard (see `downcast_ref`)
    fn as_any(&self) -> &dyn Any;

    /// Derive the principal from the request. Not memoized; use `user()`.
    async fn user_from_request(&self) -> AuthResult<Option<Principal>>;

    /// Check whether the provider knows these credentials. Never touches cached state.
    async fn validate(&self, credentials: &Credentials) -> AuthResult<bool>;

    /// Currently authenticated principal (memoized)
    async fn user(&self) -> AuthResult<Option<Principal>> {
        self.state()
            .resolve_with(|| async move {
                let user = self.user_from_request().await?;
                if let Some(user) = &user {
                    self.events().dispatch(AuthEvent::Authenticated {
                        guard: self.name().to_string(),
                        user: user.clone(),
                    });
                }
                Ok(user)
            })
            .await
    }

    async fn check(&self) -> AuthResult<bool> {
        Ok(self.user().await?.is_some())
    }

    async fn guest(&self) -> AuthResult<bool> {
        Ok(!self.check().await?)
    }

    /// Identifier of the current principal
    async fn id(&self) -> AuthResult<Option<String>> {
        Ok(self.user().await?.map(|user| user.auth_identifier()))
    }

    /// Current principal, or `Unauthenticated`
    async fn authenticate(&self) -> AuthResult<Principal> {
        self.user()
            .await?
            .ok_or_else(|| AuthError::unauthenticated(self.name()))
    }

    /// Whether a principal is cached. Never triggers derivation.
    async fn has_user(&self) -> bool {
        self.state().current().await.is_some()
    }

    /// Force the cached principal (e.g. after a successful login)
    async fn set_user(&self, user: Principal) {
        self.state().set(user.clone()).await;
        self.events().dispatch(AuthEvent::Login {
            guard: self.name().to_string(),
            user,
            remember: false,
        });
    }

    /// Drop the cached principal; the next `user()` derives again
    async fn forget_user(&self) {
        if let Some(user) = self.state().forget().await {
            self.events().dispatch(AuthEvent::Logout {
                guard: self.name().to_string(),
                user,
            });
        }
    }
}

impl dyn Guard {
    /// Downcast to a concrete guard type
    pub fn downcast_ref<T: Guard>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl std::fmt::Debug for dyn Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guard")
            .field("name", &self.name())
            .field("driver", &self.driver())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// GuardContext - Construction input for driver factories
// ============================================================================

/// Everything a driver factory receives to build a guard
#[derive(Clone)]
pub struct GuardContext {
    /// Guard name from configuration
    pub name: String,
    pub provider: Arc<dyn UserProvider>,
    /// Driver options from configuration
    pub options: Map<String, Value>,
    /// The current request
    pub transport: Arc<dyn Transport>,
    pub events: Arc<dyn EventSink>,
}

impl GuardContext {
    /// Deserialize the driver options into a typed struct
    pub fn options_as<T: DeserializeOwned>(&self) -> AuthResult<T> {
        serde_json::from_value(Value::Object(self.options.clone())).map_err(|e| {
            AuthError::config(format!("Invalid options for guard [{}]: {}", self.name, e))
        })
    }
}

// ============================================================================
// Shared validation flow
// ============================================================================

/// Run a provider lookup for credentials, emitting attempting/validated/failed
pub(crate) async fn validate_with_events(
    guard: &str,
    provider: &dyn UserProvider,
    events: &dyn EventSink,
    reported: &Credentials,
    lookup: &Credentials,
) -> AuthResult<bool> {
    events.dispatch(AuthEvent::Attempting {
        guard: guard.to_string(),
        credentials: reported.clone(),
        remember: false,
    });

    match provider.retrieve_by_credentials(lookup).await? {
        Some(user) => {
            events.dispatch(AuthEvent::Validated {
                guard: guard.to_string(),
                user,
            });
            Ok(true)
        }
        None => {
            events.dispatch(AuthEvent::Failed {
                guard: guard.to_string(),
                user: None,
                credentials: reported.clone(),
            });
            Ok(false)
        }
    }
}
