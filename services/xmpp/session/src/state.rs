//! Login state machine values and caller-facing notifications.

use crate::error::LoginError;
use std::fmt;

/// Full login state of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoginState {
    /// No login attempted yet
    #[default]
    NotStarted,
    /// Transport connecting and negotiating
    ProcessingLogin,
    /// Stream usable
    LoggedIn,
    /// Tearing down an established session
    ProcessingLogout,
    /// Session ended
    LoggedOut,
}

impl LoginState {
    /// Collapsed two-state view
    pub fn status(self) -> LoginStatus {
        match self {
            LoginState::LoggedIn => LoginStatus::LoggedIn,
            _ => LoginStatus::LoggedOut,
        }
    }

    /// Whether a login or logout is in flight
    pub fn is_transitioning(self) -> bool {
        matches!(self, LoginState::ProcessingLogin | LoginState::ProcessingLogout)
    }
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoginState::NotStarted => "not started",
            LoginState::ProcessingLogin => "processing login",
            LoginState::LoggedIn => "logged in",
            LoginState::ProcessingLogout => "processing logout",
            LoginState::LoggedOut => "logged out",
        };
        f.write_str(name)
    }
}

/// Collapsed login status reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    /// Session usable
    LoggedIn,
    /// Anything else
    LoggedOut,
}

/// Transport-level change reported through the event queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Stream authenticated and bound
    Connect,
    /// Stream opened without authentication (raw login mode)
    RawConnect,
    /// Stream closed
    Disconnect,
    /// Connection or negotiation failed
    Fail(String),
}

impl ConnectionEvent {
    /// Whether the event makes the session usable
    pub fn is_connect(&self) -> bool {
        matches!(self, ConnectionEvent::Connect | ConnectionEvent::RawConnect)
    }

    /// Error reported to callers for a terminating event
    pub fn to_error(&self) -> Option<LoginError> {
        match self {
            ConnectionEvent::Disconnect => Some(LoginError::Disconnected),
            ConnectionEvent::Fail(reason) => Some(LoginError::ConnectionFailed(reason.clone())),
            _ => None,
        }
    }
}

/// Trait for receiving login notifications
///
/// Notifications are delivered on the thread that drives the connection,
/// never on a transport thread.
pub trait ConnectionEventHandler: Send + Sync + fmt::Debug {
    /// A login attempt finished
    fn on_login_complete(&self, user: &str, success: bool, error: Option<&LoginError>);
    /// An established session changed status without a logout request
    fn on_login_changed(&self, user: &str, status: LoginStatus);
    /// A logout of an established session finished
    fn on_logout_complete(&self, user: &str, success: bool, error: Option<&LoginError>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_collapse() {
        assert_eq!(LoginState::LoggedIn.status(), LoginStatus::LoggedIn);
        for state in [
            LoginState::NotStarted,
            LoginState::ProcessingLogin,
            LoginState::ProcessingLogout,
            LoginState::LoggedOut,
        ] {
            assert_eq!(state.status(), LoginStatus::LoggedOut, "{}", state);
        }
    }

    #[test]
    fn test_event_errors() {
        assert!(ConnectionEvent::RawConnect.is_connect());
        assert_eq!(ConnectionEvent::Connect.to_error(), None);
        assert_eq!(
            ConnectionEvent::Fail("refused".to_string()).to_error(),
            Some(LoginError::ConnectionFailed("refused".to_string()))
        );
    }
}
