// AuthManager - guard resolution and per-request caching
//
// The manager is built once at startup and shared behind Arc. It never holds
// request state: guards, the default-guard override and the user resolver all
// live in the RequestContext passed into each call.

use futures::FutureExt;
use std::sync::Arc;

use crate::config::{ConfigSource, GuardConfig};
use crate::context::{RequestContext, UserResolver};
use crate::error::{AuthError, AuthResult};
use crate::events::{EventSink, NoopEventSink};
use crate::guard::{Guard, GuardContext};
use crate::registry::GuardRegistry;
use crate::traits::{Credentials, Principal, ProviderFactory};
use crate::transport::Transport;

/// Config key of the default guard name
pub const DEFAULT_GUARD_KEY: &str = "auth.defaults.guard";

/// Config key prefix of guard definitions
pub const GUARDS_KEY: &str = "auth.guards";

/// Resolves named guards for each request
pub struct AuthManager {
    config: Arc<dyn ConfigSource>,
    providers: Arc<dyn ProviderFactory>,
    drivers: GuardRegistry,
    events: Arc<dyn EventSink>,
}

impl AuthManager {
    /// Manager with the built-in drivers and no event delivery
    pub fn new(config: Arc<dyn ConfigSource>, providers: Arc<dyn ProviderFactory>) -> Self {
        Self {
            config,
            providers,
            drivers: GuardRegistry::with_defaults(),
            events: Arc::new(NoopEventSink),
        }
    }

    /// Replace the driver registry
    pub fn with_drivers(mut self, drivers: GuardRegistry) -> Self {
        self.drivers = drivers;
        self
    }

    /// Register an additional driver
    pub fn with_driver<F>(mut self, driver: impl Into<String>, factory: F) -> Self
    where
        F: Fn(GuardContext) -> AuthResult<Arc<dyn Guard>> + Send + Sync + 'static,
    {
        self.drivers.register(driver, factory);
        self
    }

    /// Set the sink guards emit their events into
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn drivers(&self) -> &GuardRegistry {
        &self.drivers
    }

    pub fn events(&self) -> Arc<dyn EventSink> {
        self.events.clone()
    }

    // ========================================================================
    // Request scope
    // ========================================================================

    /// Start a request scope with the default user resolver installed
    pub fn request_context(self: &Arc<Self>, transport: Arc<dyn Transport>) -> RequestContext {
        let ctx = RequestContext::new(transport);
        ctx.set_user_resolver(self.default_user_resolver(&ctx));
        ctx
    }

    /// Guard by name (or the default guard), built at most once per request
    pub fn guard(&self, ctx: &RequestContext, name: Option<&str>) -> AuthResult<Arc<dyn Guard>> {
        let name = match name {
            Some(name) => name.to_string(),
            None => self.default_guard_name(ctx)?,
        };

        ctx.guard_or_insert_with(&name, || self.resolve(ctx, &name))
    }

    /// Default guard name for this request
    ///
    /// A per-request override wins; otherwise the configured default is read
    /// and pinned into the context.
    pub fn default_guard_name(&self, ctx: &RequestContext) -> AuthResult<String> {
        if let Some(name) = ctx.default_guard() {
            return Ok(name);
        }

        let name = self
            .config
            .get(DEFAULT_GUARD_KEY)
            .and_then(|value| value.as_str().map(str::to_string))
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AuthError::config("No default auth guard is configured."))?;

        ctx.set_default_guard(name.clone());
        Ok(name)
    }

    /// Override the default guard for this request
    pub fn set_default_guard(&self, ctx: &RequestContext, name: impl Into<String>) {
        ctx.set_default_guard(name);
    }

    /// Make `name` the request's default guard and point the user resolver at it
    ///
    /// An absent or empty name keeps the current default.
    pub fn should_use(self: &Arc<Self>, ctx: &RequestContext, name: Option<&str>) -> AuthResult<()> {
        let name = match name.filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => self.default_guard_name(ctx)?,
        };

        tracing::debug!(guard = %name, "Switching default guard");
        ctx.set_default_guard(name);
        ctx.set_user_resolver(self.default_user_resolver(ctx));
        Ok(())
    }

    /// Replace the request's user resolver
    pub fn resolve_users_using(&self, ctx: &RequestContext, resolver: UserResolver) -> &Self {
        ctx.set_user_resolver(resolver);
        self
    }

    pub fn user_resolver(&self, ctx: &RequestContext) -> Option<UserResolver> {
        ctx.user_resolver()
    }

    /// Resolver that asks the named (or default) guard of this request
    fn default_user_resolver(self: &Arc<Self>, ctx: &RequestContext) -> UserResolver {
        // Weak: the resolver is stored inside the context it points at
        let manager = Arc::clone(self);
        let weak = ctx.downgrade();

        Arc::new(move |name: Option<String>| {
            let manager = manager.clone();
            let weak = weak.clone();
            async move {
                let Some(ctx) = weak.upgrade() else {
                    return Ok(None);
                };
                let guard = manager.guard(&ctx, name.as_deref())?;
                guard.user().await
            }
            .boxed()
        })
    }

    /// Build a guard from its configuration
    pub(crate) fn resolve(&self, ctx: &RequestContext, name: &str) -> AuthResult<Arc<dyn Guard>> {
        let result = self.build_guard(ctx, name);
        match &result {
            Ok(guard) => {
                tracing::debug!(guard = %name, driver = guard.driver(), "Resolved auth guard")
            }
            Err(e) => tracing::warn!(guard = %name, error = %e, "Failed to resolve auth guard"),
        }
        result
    }

    fn build_guard(&self, ctx: &RequestContext, name: &str) -> AuthResult<Arc<dyn Guard>> {
        let raw = self
            .config
            .get(&format!("{}.{}", GUARDS_KEY, name))
            .ok_or_else(|| AuthError::config(format!("Auth guard [{}] is not defined.", name)))?;
        let config = GuardConfig::from_value(name, raw)?;

        let driver = config
            .driver
            .filter(|driver| !driver.is_empty())
            .ok_or_else(|| {
                AuthError::config(format!("Auth guard [{}] has no driver configured.", name))
            })?;
        let provider_name = config
            .provider
            .filter(|provider| !provider.is_empty())
            .ok_or_else(|| {
                AuthError::config(format!("Auth guard [{}] has no provider configured.", name))
            })?;
        let provider = self.providers.create(&provider_name)?;

        self.drivers.create(
            &driver,
            GuardContext {
                name: name.to_string(),
                provider,
                options: config.options,
                transport: ctx.transport(),
                events: self.events.clone(),
            },
        )
    }

    // ========================================================================
    // Default guard delegation
    // ========================================================================

    pub async fn user(&self, ctx: &RequestContext) -> AuthResult<Option<Principal>> {
        self.guard(ctx, None)?.user().await
    }

    pub async fn check(&self, ctx: &RequestContext) -> AuthResult<bool> {
        self.guard(ctx, None)?.check().await
    }

    pub async fn guest(&self, ctx: &RequestContext) -> AuthResult<bool> {
        self.guard(ctx, None)?.guest().await
    }

    pub async fn id(&self, ctx: &RequestContext) -> AuthResult<Option<String>> {
        self.guard(ctx, None)?.id().await
    }

    pub async fn authenticate(&self, ctx: &RequestContext) -> AuthResult<Principal> {
        self.guard(ctx, None)?.authenticate().await
    }

    pub async fn validate(&self, ctx: &RequestContext, credentials: &Credentials) -> AuthResult<bool> {
        self.guard(ctx, None)?.validate(credentials).await
    }

    pub async fn set_user(&self, ctx: &RequestContext, user: Principal) -> AuthResult<()> {
        self.guard(ctx, None)?.set_user(user).await;
        Ok(())
    }

    pub async fn forget_user(&self, ctx: &RequestContext) -> AuthResult<()> {
        self.guard(ctx, None)?.forget_user().await;
        Ok(())
    }

    pub async fn has_user(&self, ctx: &RequestContext) -> AuthResult<bool> {
        Ok(self.guard(ctx, None)?.has_user().await)
    }
}

impl std::fmt::Debug for AuthManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthManager")
            .field("drivers", &self.drivers)
            .finish_non_exhaustive()
    }
}
