//! Per-connection session state.
//!
//! Owned by the connection task; never shared.

use hotel_protocol::{OpCode, Reply};
use hotel_storage::EntityStore;

/// What the session should do once the pending reply has been written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Keep,
    /// Successful login: attach the username.
    Authenticate(String),
    /// Successful logout: back to anonymous.
    Clear,
}

/// A handler result waiting to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub op: OpCode,
    pub reply: Reply,
    pub effect: Effect,
}

#[derive(Debug, Default)]
pub struct Session {
    username: Option<String>,
    pending: Option<Pending>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }

    /// True if the session is logged in as exactly `username`.
    pub fn is(&self, username: &str) -> bool {
        self.username.as_deref() == Some(username)
    }

    pub fn set_pending(&mut self, pending: Pending) {
        self.pending = Some(pending);
    }

    pub fn take_pending(&mut self) -> Option<Pending> {
        self.pending.take()
    }

    /// Apply the post-write retention rule.
    pub fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Keep => {}
            Effect::Authenticate(username) => self.username = Some(username),
            Effect::Clear => self.username = None,
        }
    }

    /// Release everything this session holds in the store. Called when the
    /// connection closes.
    pub fn release(&mut self, store: &EntityStore) {
        if let Some(Pending {
            effect: Effect::Authenticate(username),
            ..
        }) = self.pending.take()
        {
            store.deactivate(&username);
        }
        if let Some(username) = self.username.take() {
            store.deactivate(&username);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_rule() {
        let mut s = Session::new();
        s.apply(Effect::Keep);
        assert!(!s.is_authenticated());

        s.apply(Effect::Authenticate("alice".into()));
        assert!(s.is("alice"));
        s.apply(Effect::Keep);
        assert_eq!(s.username(), Some("alice"));

        s.apply(Effect::Clear);
        assert!(!s.is_authenticated());
    }

    #[test]
    fn test_release_frees_login_and_pending_login() {
        let store = EntityStore::new();
        let mut s = Session::new();

        assert!(store.try_activate("alice"));
        s.apply(Effect::Authenticate("alice".into()));
        s.release(&store);
        assert!(!store.is_active("alice"));
        assert!(!s.is_authenticated());

        // Login accepted but the reply never made it out.
        assert!(store.try_activate("bob"));
        s.set_pending(Pending {
            op: OpCode::Login,
            reply: Reply::ok(),
            effect: Effect::Authenticate("bob".into()),
        });
        s.release(&store);
        assert!(!store.is_active("bob"));
    }
}
