// Request-scoped authentication state
//
// A RequestContext is created when a request starts and dropped when it ends.
// It owns the guards resolved for that request, the per-request default guard
// override and the user resolver. Nothing in here is shared across requests.

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::error::AuthResult;
use crate::guard::Guard;
use crate::traits::Principal;
use crate::transport::Transport;

/// Resolves the current principal for an optional guard name
pub type UserResolver =
    Arc<dyn Fn(Option<String>) -> BoxFuture<'static, AuthResult<Option<Principal>>> + Send + Sync>;

struct ContextInner {
    transport: Arc<dyn Transport>,
    guards: Mutex<HashMap<String, Arc<dyn Guard>>>,
    default_guard: RwLock<Option<String>>,
    user_resolver: RwLock<Option<UserResolver>>,
}

/// Per-request scope (cheap to clone, clones share state)
#[derive(Clone)]
pub struct RequestContext {
    inner: Arc<ContextInner>,
}

impl RequestContext {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                transport,
                guards: Mutex::new(HashMap::new()),
                default_guard: RwLock::new(None),
                user_resolver: RwLock::new(None),
            }),
        }
    }

    /// The request this context belongs to
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.inner.transport.clone()
    }

    /// Guard already resolved under this name, if any
    pub fn cached_guard(&self, name: &str) -> Option<Arc<dyn Guard>> {
        self.inner.guards.lock().get(name).cloned()
    }

    /// Names of guards resolved so far, sorted
    pub fn resolved_guards(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.guards.lock().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Return the cached guard or build and cache it
    ///
    /// The cache lock is held while building, so a name is constructed at most
    /// once per context. A failed build caches nothing.
    pub fn guard_or_insert_with<F>(&self, name: &str, build: F) -> AuthResult<Arc<dyn Guard>>
    where
        F: FnOnce() -> AuthResult<Arc<dyn Guard>>,
    {
        let mut guards = self.inner.guards.lock();
        if let Some(guard) = guards.get(name) {
            return Ok(guard.clone());
        }

        let guard = build()?;
        guards.insert(name.to_string(), guard.clone());
        Ok(guard)
    }

    /// Per-request default guard override
    pub fn default_guard(&self) -> Option<String> {
        self.inner.default_guard.read().clone()
    }

    pub fn set_default_guard(&self, name: impl Into<String>) {
        *self.inner.default_guard.write() = Some(name.into());
    }

    pub fn user_resolver(&self) -> Option<UserResolver> {
        self.inner.user_resolver.read().clone()
    }

    pub fn set_user_resolver(&self, resolver: UserResolver) {
        *self.inner.user_resolver.write() = Some(resolver);
    }

    /// Non-owning handle (for closures stored inside the context)
    pub fn downgrade(&self) -> WeakRequestContext {
        WeakRequestContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same request scope
    pub fn same_request(&self, other: &RequestContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("guards", &self.resolved_guards())
            .field("default_guard", &self.default_guard())
            .finish_non_exhaustive()
    }
}

/// Weak handle to a RequestContext
#[derive(Clone)]
pub struct WeakRequestContext {
    inner: Weak<ContextInner>,
}

impl WeakRequestContext {
    /// Upgrade while the request is still alive
    pub fn upgrade(&self) -> Option<RequestContext> {
        self.inner.upgrade().map(|inner| RequestContext { inner })
    }
}
