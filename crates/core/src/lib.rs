// Request Authentication Core
//
// This crate resolves, per inbound request, which authentication strategy
// ("guard") applies, caches it for the lifetime of that request, and exposes a
// uniform contract for fetching and setting the authenticated principal.
//
// Key design decisions:
// - AuthManager is immutable and shared; all request state lives in RequestContext
// - Guards are built from configuration through a registry of driver factories
// - Transport, UserProvider, ConfigSource and EventSink are traits so HTTP
//   frameworks, storage and event delivery plug in from outside
// - TokenCodec backs the bearer guard: HMAC-signed, time-bounded tokens with an
//   injectable clock
// - Errors distinguish configuration mistakes from token and provider failures

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod guard;
pub mod manager;
pub mod registry;
pub mod token;
pub mod traits;
pub mod transport;

// In-memory implementations for small deployments and testing
pub mod memory;

// Re-exports for convenience
pub use config::{AuthConfig, AuthDefaults, ConfigRepository, ConfigSource, GuardConfig};
pub use context::{RequestContext, UserResolver, WeakRequestContext};
pub use error::{AuthError, AuthResult};
pub use events::{AuthEvent, EventSink, NoopEventSink, RecordingEventSink, TracingEventSink};
pub use guard::{
    hash_token, Guard, GuardContext, GuardState, JwtGuard, TokenGuard, TokenGuardOptions,
};
pub use manager::AuthManager;
pub use memory::{GenericUser, InMemoryUserProvider};
pub use registry::{GuardFactory, GuardRegistry};
pub use token::{Clock, FixedClock, SystemClock, TokenCodec, TokenConfig};
pub use traits::{
    Authenticatable, Credentials, Principal, ProviderFactory, ProviderRegistry, UserProvider,
};
pub use transport::{basic_password, bearer_token, StaticTransport, Transport};
