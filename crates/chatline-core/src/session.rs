//! Session manager for the Chatline client
//!
//! Holds whichever identity the authentication service says is current. The
//! login flow itself is external: a login link is requested for an email, and
//! the service later confirms a session out of band.

use tracing::info;

use crate::types::{AuthorId, Session};

// ----------------------------------------------------------------------------
// Session Manager
// ----------------------------------------------------------------------------

/// Tracks the current session and any login in flight
#[derive(Debug, Default)]
pub struct SessionManager {
    session: Session,
    /// Email a login link was requested for, until a session is confirmed
    pending_login: Option<String>,
}

impl SessionManager {
    /// Start out anonymous
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize from the session the service already knows about
    ///
    /// A returning, already verified user keeps their identity.
    pub fn restore(&mut self, existing: Option<Session>) {
        match existing {
            Some(Session::Authenticated { identity }) => {
                info!(identity = %identity, "Restored existing session");
                self.confirm(identity);
            }
            Some(Session::Anonymous) | None => {
                info!("No existing session, starting anonymous");
                self.session = Session::Anonymous;
            }
        }
    }

    /// Record that a login link was requested
    pub fn mark_login_requested(&mut self, email: impl Into<String>) {
        let email = email.into();
        info!(email = %email, "Login link requested");
        self.pending_login = Some(email);
    }

    /// Adopt an identity confirmed by the service
    pub fn confirm(&mut self, identity: AuthorId) {
        if self.session.identity() != Some(&identity) {
            info!(identity = %identity, "Session authenticated");
        }
        self.pending_login = None;
        self.session = Session::Authenticated { identity };
    }

    /// Drop back to anonymous
    pub fn clear(&mut self) {
        if let Some(identity) = self.session.identity() {
            info!(identity = %identity, "Session ended");
        }
        self.pending_login = None;
        self.session = Session::Anonymous;
    }

    /// Apply whatever the service currently reports
    ///
    /// Returns `true` if the session changed.
    pub fn apply(&mut self, reported: Option<Session>) -> bool {
        let before = self.session.clone();
        match reported {
            Some(Session::Authenticated { identity }) => self.confirm(identity),
            // A pending login stays pending until the link is used
            Some(Session::Anonymous) | None => {
                if self.session.is_authenticated() {
                    self.clear();
                }
            }
        }
        before != self.session
    }

    pub fn current(&self) -> &Session {
        &self.session
    }

    pub fn identity(&self) -> Option<&AuthorId> {
        self.session.identity()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn pending_login(&self) -> Option<&str> {
        self.pending_login.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_existing_session() {
        let mut manager = SessionManager::new();
        manager.restore(Some(Session::authenticated("ada@example.com")));
        assert!(manager.is_authenticated());
        assert_eq!(manager.identity(), Some(&AuthorId::from("ada@example.com")));

        let mut manager = SessionManager::new();
        manager.restore(None);
        assert_eq!(manager.current(), &Session::Anonymous);
    }

    #[test]
    fn test_login_flow() {
        let mut manager = SessionManager::new();
        manager.mark_login_requested("ada@example.com");
        assert_eq!(manager.pending_login(), Some("ada@example.com"));
        assert!(!manager.is_authenticated());

        // Service has not confirmed yet
        assert!(!manager.apply(None));
        assert_eq!(manager.pending_login(), Some("ada@example.com"));

        assert!(manager.apply(Some(Session::authenticated("ada@example.com"))));
        assert!(manager.is_authenticated());
        assert!(manager.pending_login().is_none());

        // Same identity reported again is not a change
        assert!(!manager.apply(Some(Session::authenticated("ada@example.com"))));
    }

    #[test]
    fn test_logout() {
        let mut manager = SessionManager::new();
        manager.confirm(AuthorId::from("ada@example.com"));
        manager.clear();
        assert_eq!(manager.current(), &Session::Anonymous);
        assert!(manager.identity().is_none());
    }

    #[test]
    fn test_apply_revoked_session() {
        let mut manager = SessionManager::new();
        manager.confirm(AuthorId::from("ada@example.com"));
        assert!(manager.apply(None));
        assert!(!manager.is_authenticated());
    }
}
