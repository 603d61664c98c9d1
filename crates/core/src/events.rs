// Authentication events
//
// Guards emit plain event records into an EventSink. Delivery (bus, queue,
// audit log) is the sink's business; dispatch must not fail the caller.

use parking_lot::Mutex;

use crate::traits::{Credentials, Principal};

/// Event type names, as used in logs
pub const ATTEMPTING: &str = "auth.attempting";
pub const VALIDATED: &str = "auth.validated";
pub const LOGIN: &str = "auth.login";
pub const AUTHENTICATED: &str = "auth.authenticated";
pub const LOGOUT: &str = "auth.logout";
pub const FAILED: &str = "auth.failed";

/// Notification emitted by a guard
#[derive(Debug, Clone)]
pub enum AuthEvent {
    /// Credentials are about to be validated
    Attempting {
        guard: String,
        credentials: Credentials,
        remember: bool,
    },
    /// The provider matched the credentials
    Validated { guard: String, user: Principal },
    /// A principal was set on the guard explicitly
    Login {
        guard: String,
        user: Principal,
        remember: bool,
    },
    /// The guard resolved a principal from the request
    Authenticated { guard: String, user: Principal },
    /// A cached principal was cleared
    Logout { guard: String, user: Principal },
    /// Validation or request derivation found no match
    Failed {
        guard: String,
        user: Option<Principal>,
        credentials: Credentials,
    },
}

impl AuthEvent {
    /// Event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            AuthEvent::Attempting { .. } => ATTEMPTING,
            AuthEvent::Validated { .. } => VALIDATED,
            AuthEvent::Login { .. } => LOGIN,
            AuthEvent::Authenticated { .. } => AUTHENTICATED,
            AuthEvent::Logout { .. } => LOGOUT,
            AuthEvent::Failed { .. } => FAILED,
        }
    }

    /// Name of the guard that emitted the event
    pub fn guard(&self) -> &str {
        match self {
            AuthEvent::Attempting { guard, .. }
            | AuthEvent::Validated { guard, .. }
            | AuthEvent::Login { guard, .. }
            | AuthEvent::Authenticated { guard, .. }
            | AuthEvent::Logout { guard, .. }
            | AuthEvent::Failed { guard, .. } => guard,
        }
    }

    /// Principal the event refers to, if any
    pub fn user(&self) -> Option<&Principal> {
        match self {
            AuthEvent::Validated { user, .. }
            | AuthEvent::Login { user, .. }
            | AuthEvent::Authenticated { user, .. }
            | AuthEvent::Logout { user, .. } => Some(user),
            AuthEvent::Failed { user, .. } => user.as_ref(),
            AuthEvent::Attempting { .. } => None,
        }
    }
}

/// Receiver for authentication events
pub trait EventSink: Send + Sync {
    fn dispatch(&self, event: AuthEvent);
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn dispatch(&self, _event: AuthEvent) {}
}

/// Sink that logs each event through tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn dispatch(&self, event: AuthEvent) {
        let user = event.user().map(|u| u.auth_identifier());
        match &event {
            AuthEvent::Failed { .. } => tracing::info!(
                event = event.event_type(),
                guard = event.guard(),
                user = ?user,
                "Authentication failed"
            ),
            _ => tracing::debug!(
                event = event.event_type(),
                guard = event.guard(),
                user = ?user,
                "Authentication event"
            ),
        }
    }
}

/// Sink that keeps every event in memory (for tests)
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<AuthEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events
    pub fn events(&self) -> Vec<AuthEvent> {
        self.events.lock().clone()
    }

    /// Recorded event type names, in order
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(AuthEvent::event_type).collect()
    }

    /// Drop all recorded events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingEventSink {
    fn dispatch(&self, event: AuthEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::GenericUser;
    use std::sync::Arc;

    #[test]
    fn test_event_accessors() {
        let user: Principal = Arc::new(GenericUser::new("7"));
        let event = AuthEvent::Login {
            guard: "api".to_string(),
            user: user.clone(),
            remember: false,
        };

        assert_eq!(event.event_type(), LOGIN);
        assert_eq!(event.guard(), "api");
        assert_eq!(event.user().unwrap().auth_identifier(), "7");

        let attempting = AuthEvent::Attempting {
            guard: "api".to_string(),
            credentials: Credentials::new(),
            remember: false,
        };
        assert!(attempting.user().is_none());
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingEventSink::new();
        sink.dispatch(AuthEvent::Failed {
            guard: "web".to_string(),
            user: None,
            credentials: Credentials::new(),
        });

        assert_eq!(sink.event_types(), vec![FAILED]);
        sink.clear();
        assert!(sink.events().is_empty());
    }
}
