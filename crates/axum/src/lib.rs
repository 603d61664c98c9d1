// Axum integration for gatehouse-core
//
// - request_scope middleware opens a RequestContext per request
// - AuthScope, CurrentUser and OptionalUser extract it in handlers
// - HttpAuthError maps AuthError onto HTTP status codes

pub mod error;
pub mod extract;
pub mod middleware;
pub mod transport;

pub use error::HttpAuthError;
pub use extract::{CurrentUser, OptionalUser};
pub use middleware::{request_scope, with_auth, AuthScope, MAX_FORM_BODY_BYTES};
pub use transport::HttpTransport;
