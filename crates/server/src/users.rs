// In-memory user store seeded at startup

use anyhow::Result;
use gatehouse_core::{hash_token, GenericUser, InMemoryUserProvider};

use crate::config::ServerConfig;
use crate::password::{hash_password, password_matches};

/// Identifier of the seeded admin user
pub const ADMIN_ID: &str = "1";

/// Build the user provider, seeding the admin user when configured
pub fn seed_users(config: &ServerConfig) -> Result<InMemoryUserProvider> {
    let mut provider = InMemoryUserProvider::new().with_password_verifier(password_matches);

    if let Some(admin) = &config.admin {
        let mut user = GenericUser::new(ADMIN_ID)
            .with_attribute("email", admin.email.clone())
            .with_attribute("name", "Admin")
            .with_attribute("password", hash_password(&admin.password)?);

        if let Some(token) = &admin.api_token {
            let stored = if config.hashes_api_tokens() {
                hash_token(token)
            } else {
                token.clone()
            };
            user = user.with_attribute("api_token", stored);
        }

        provider = provider.with_user(user);
        tracing::info!(email = %admin.email, "Seeded admin user");
    } else {
        tracing::warn!("No admin user configured (AUTH_ADMIN_EMAIL / AUTH_ADMIN_PASSWORD)");
    }

    Ok(provider)
}
