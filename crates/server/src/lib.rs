// Gatehouse reference server
//
// Wires configuration, the in-memory user store and the auth routes into an
// axum router. main.rs adds tracing, CORS and the listener.

pub mod config;
pub mod password;
pub mod routes;
pub mod users;

use anyhow::{Context, Result};
use axum::Router;
use gatehouse_core::{AuthManager, ProviderRegistry, TracingEventSink};
use std::sync::Arc;

use crate::config::{ServerConfig, USERS_PROVIDER};
use crate::routes::RoutesState;

/// Build the auth manager for a configuration
pub fn build_manager(config: &ServerConfig) -> Result<Arc<AuthManager>> {
    let users = users::seed_users(config).context("Failed to seed users")?;
    let providers = ProviderRegistry::new().with(USERS_PROVIDER, Arc::new(users));
    let source = config
        .auth
        .clone()
        .into_source()
        .context("Invalid auth configuration")?;

    Ok(Arc::new(
        AuthManager::new(Arc::new(source), Arc::new(providers))
            .with_events(Arc::new(TracingEventSink)),
    ))
}

/// Build the application router (without transport-level layers)
pub fn build_router(config: &ServerConfig) -> Result<Router> {
    let manager = build_manager(config)?;
    tracing::info!(
        drivers = ?manager.drivers().registered_drivers(),
        guards = ?config.auth.guards.keys().collect::<Vec<_>>(),
        "Auth manager ready"
    );

    let routes = routes::routes(RoutesState {
        login_guard: config.login_guard.clone(),
    });
    Ok(gatehouse_axum::with_auth(routes, manager))
}
