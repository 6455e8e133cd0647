//! The device's signed-in principal, as far as eligibility cares.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl LocalIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Source of the current principal. Read per event, so a sign-out takes
/// effect on the very next alert.
pub trait IdentityProvider: Send + Sync {
    fn current(&self) -> Option<LocalIdentity>;
}

/// Identity held in memory and swapped by the host on sign-in/sign-out.
#[derive(Debug, Default)]
pub struct StaticIdentity {
    current: RwLock<Option<LocalIdentity>>,
}

impl StaticIdentity {
    pub fn new(identity: Option<LocalIdentity>) -> Self {
        Self {
            current: RwLock::new(identity),
        }
    }

    pub fn signed_in(identity: LocalIdentity) -> Self {
        Self::new(Some(identity))
    }

    pub fn sign_in(&self, identity: LocalIdentity) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(identity);
    }

    pub fn sign_out(&self) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

impl IdentityProvider for StaticIdentity {
    fn current(&self) -> Option<LocalIdentity> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_and_out() {
        let provider = StaticIdentity::default();
        assert_eq!(provider.current(), None);
        provider.sign_in(LocalIdentity::new("u1").with_email("u1@example.com"));
        assert_eq!(provider.current().map(|i| i.user_id), Some("u1".to_string()));
        provider.sign_out();
        assert_eq!(provider.current(), None);
    }
}
