//! Admin policy
//!
//! A pure predicate deciding who may delete messages. The decision depends only
//! on the configured allow-list.

use hashbrown::HashSet;

use crate::config::AdminPolicyConfig;
use crate::types::{AuthorId, Session};

#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    allowlist: HashSet<String>,
}

impl AdminPolicy {
    pub fn new(config: &AdminPolicyConfig) -> Self {
        Self {
            allowlist: config.allowlist.iter().cloned().collect(),
        }
    }

    /// Whether `identity` is on the allow-list (exact match)
    pub fn is_admin(&self, identity: &str) -> bool {
        self.allowlist.contains(identity)
    }

    /// Whether the given session may delete messages
    pub fn permits_delete(&self, session: &Session) -> bool {
        session
            .identity()
            .map(AuthorId::as_str)
            .is_some_and(|identity| self.is_admin(identity))
    }

    pub fn admin_count(&self) -> usize {
        self.allowlist.len()
    }
}

impl From<AdminPolicyConfig> for AdminPolicy {
    fn from(config: AdminPolicyConfig) -> Self {
        Self::new(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AdminPolicy {
        AdminPolicy::new(&AdminPolicyConfig::with_admins(["root@example.com"]))
    }

    #[test]
    fn test_membership() {
        let policy = policy();
        assert!(policy.is_admin("root@example.com"));
        assert!(!policy.is_admin("ada@example.com"));
        assert!(!policy.is_admin("ROOT@example.com"));
        assert!(!policy.is_admin(""));
    }

    #[test]
    fn test_decision_is_stable() {
        let policy = policy();
        let first = policy.is_admin("root@example.com");
        for _ in 0..3 {
            assert_eq!(policy.is_admin("root@example.com"), first);
        }
    }

    #[test]
    fn test_session_gate() {
        let policy = policy();
        assert!(!policy.permits_delete(&Session::Anonymous));
        assert!(!policy.permits_delete(&Session::authenticated("ada@example.com")));
        assert!(policy.permits_delete(&Session::authenticated("root@example.com")));
    }

    #[test]
    fn test_empty_allowlist_denies_everyone() {
        let policy = AdminPolicy::default();
        assert_eq!(policy.admin_count(), 0);
        assert!(!policy.is_admin("root@example.com"));
    }
}
