//! Authentication collaborator boundary.
//!
//! The real provider is an external service; the pipeline only ever asks
//! three questions, so three methods is the whole interface. The pipeline
//! gates on `is_authenticated` before doing any work.

use std::sync::RwLock;

/// The authenticated user, reduced to what the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub identifier: String,
}

/// External authentication provider.
pub trait AuthProvider: Send + Sync {
    fn is_authenticated(&self) -> bool;

    /// The signed-in user, `None` when unauthenticated.
    fn current_user(&self) -> Option<User>;

    fn sign_out(&self);
}

/// Fixed-identity provider for the CLI and tests.
///
/// Starts signed in (or out) and only changes via `sign_out`.
pub struct StaticAuth {
    user: RwLock<Option<User>>,
}

impl StaticAuth {
    /// A provider already signed in as `identifier`.
    pub fn signed_in(identifier: impl Into<String>) -> Self {
        Self {
            user: RwLock::new(Some(User {
                identifier: identifier.into(),
            })),
        }
    }

    /// A provider with no session.
    pub fn signed_out() -> Self {
        Self {
            user: RwLock::new(None),
        }
    }
}

impl AuthProvider for StaticAuth {
    fn is_authenticated(&self) -> bool {
        self.user.read().unwrap().is_some()
    }

    fn current_user(&self) -> Option<User> {
        self.user.read().unwrap().clone()
    }

    fn sign_out(&self) {
        self.user.write().unwrap().take();
    }
}
