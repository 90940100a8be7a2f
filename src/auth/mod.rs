//! Identity and authentication
//!
//! The chat core only needs a user id to scope stored conversations. That id
//! comes from an [`IdentityProvider`]; when nobody is signed in the anonymous
//! [`LOCAL_USER_ID`] is used so history still works offline.

use serde::{Deserialize, Serialize};

pub mod backend;
pub mod credentials;
pub mod session;

pub use backend::{AuthBackend, FirebaseAuthBackend};
pub use credentials::CredentialStore;
pub use session::Session;

/// User id used when nobody is signed in
pub const LOCAL_USER_ID: &str = "local_user";

/// Progress of the most recent authentication request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Nothing requested yet, or signed out
    #[default]
    Initial,
    /// A request is in flight
    Loading,
    /// The last request succeeded
    Success,
    /// The last request failed with a user-facing message
    Error(String),
}

impl AuthState {
    /// Returns true while a request is in flight
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }
}

/// A signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Stable user id; scopes all stored conversations
    pub uid: String,
    /// E-mail address, when the account has one
    #[serde(default)]
    pub email: Option<String>,
    /// Display name, when known
    #[serde(default)]
    pub display_name: Option<String>,
    /// Short-lived ID token
    #[serde(default)]
    pub id_token: Option<String>,
    /// Refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl AuthUser {
    /// Name shown in the UI: display name, else e-mail, else the uid
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.email.as_deref())
            .unwrap_or(&self.uid)
    }
}

/// Source of the current user id
pub trait IdentityProvider: Send + Sync {
    /// Id of the signed-in user, if any
    fn current_user_id(&self) -> Option<String>;

    /// Name to address the user by, if known
    fn display_name(&self) -> Option<String> {
        None
    }

    /// Id used to scope storage: the signed-in user or [`LOCAL_USER_ID`]
    ///
    /// # Examples
    ///
    /// ```
    /// use mentesa::auth::{AnonymousIdentity, IdentityProvider};
    ///
    /// assert_eq!(AnonymousIdentity.effective_user_id(), "local_user");
    /// ```
    fn effective_user_id(&self) -> String {
        self.current_user_id()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| LOCAL_USER_ID.to_string())
    }
}

/// Identity used when authentication is not configured
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousIdentity;

impl IdentityProvider for AnonymousIdentity {
    fn current_user_id(&self) -> Option<String> {
        None
    }
}
