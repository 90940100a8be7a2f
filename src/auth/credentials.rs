//! Persisted sign-in
//!
//! The signed-in user is stored as JSON in the OS keyring so the terminal
//! front-end remembers the login between runs.

use crate::auth::AuthUser;
use crate::error::{MenteSaError, Result};

/// Keyring-backed store for the signed-in user
#[derive(Debug, Clone)]
pub struct CredentialStore {
    service: String,
    account: String,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new("mentesa", "session")
    }
}

impl CredentialStore {
    /// Create a store for the given keyring service and account names
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        Ok(keyring::Entry::new(&self.service, &self.account).map_err(MenteSaError::Keyring)?)
    }

    /// Saves the user, replacing any previous login
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use mentesa::auth::{AuthUser, CredentialStore};
    ///
    /// let store = CredentialStore::default();
    /// let user = AuthUser {
    ///     uid: "abc".to_string(),
    ///     email: Some("ana@exemplo.com".to_string()),
    ///     display_name: None,
    ///     id_token: None,
    ///     refresh_token: None,
    /// };
    /// store.save(&user).unwrap();
    /// ```
    pub fn save(&self, user: &AuthUser) -> Result<()> {
        let json = serde_json::to_string(user)?;
        self.entry()?
            .set_password(&json)
            .map_err(MenteSaError::Keyring)?;
        tracing::debug!("Saved session for user {}", user.uid);
        Ok(())
    }

    /// Loads the saved user, if any
    ///
    /// Returns `Ok(None)` when nothing was saved.
    pub fn load(&self) -> Result<Option<AuthUser>> {
        match self.entry()?.get_password() {
            Ok(json) if json.trim().is_empty() => Ok(None),
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(MenteSaError::Keyring(e).into()),
        }
    }

    /// Removes the saved user; a no-op when nothing was saved
    pub fn clear(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(MenteSaError::Keyring(e).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let store = CredentialStore::default();
        assert_eq!(store.service, "mentesa");
        assert_eq!(store.account, "session");
    }

    #[test]
    fn test_custom_names() {
        let store = CredentialStore::new("svc", "acct");
        assert_eq!(store.service, "svc");
        assert_eq!(store.account, "acct");
    }
}
