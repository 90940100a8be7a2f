//! Signed-in session
//!
//! [`Session`] owns the current user and publishes three observable values:
//! the user itself, the [`AuthState`] of the last request, and a logout
//! counter that ticks once per logout so views can reset themselves.

use crate::auth::backend::{GOOGLE_FAILED, LOGIN_FAILED, REGISTER_FAILED, RESET_FAILED};
use crate::auth::{AuthBackend, AuthState, AuthUser, CredentialStore, IdentityProvider};
use crate::error::{MenteSaError, Result};
use regex::Regex;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::sync::watch;

/// Message shown for a malformed e-mail address
pub const INVALID_EMAIL: &str = "Informe um e-mail válido.";
/// Message shown for an empty password
pub const EMPTY_PASSWORD: &str = "Informe a senha.";
/// Message shown when no authentication backend is configured
pub const AUTH_UNAVAILABLE: &str = "Autenticação não configurada.";

fn email_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
}

/// Returns true if `email` looks like an e-mail address
///
/// # Examples
///
/// ```
/// use mentesa::auth::session::is_valid_email;
///
/// assert!(is_valid_email("ana@exemplo.com"));
/// assert!(!is_valid_email("ana@exemplo"));
/// ```
pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_some_and(|p| p.is_match(email.trim()))
}

/// Extracts the user-facing text of an authentication failure
fn failure_message(error: &anyhow::Error, fallback: &str) -> String {
    match error.downcast_ref::<MenteSaError>() {
        Some(MenteSaError::Auth(message)) => message.clone(),
        Some(MenteSaError::MissingCredentials(_)) => AUTH_UNAVAILABLE.to_string(),
        _ => fallback.to_string(),
    }
}

/// Current user plus observable authentication state
pub struct Session {
    backend: Option<Arc<dyn AuthBackend>>,
    credentials: Option<CredentialStore>,
    user: watch::Sender<Option<AuthUser>>,
    state: watch::Sender<AuthState>,
    logouts: watch::Sender<u64>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &*self.user.borrow())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl Session {
    /// Create a signed-out session backed by `backend`
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self::build(Some(backend))
    }

    /// Create a session that cannot sign in; every request fails with
    /// [`AUTH_UNAVAILABLE`]
    pub fn offline() -> Self {
        Self::build(None)
    }

    fn build(backend: Option<Arc<dyn AuthBackend>>) -> Self {
        let (user, _) = watch::channel(None);
        let (state, _) = watch::channel(AuthState::Initial);
        let (logouts, _) = watch::channel(0);
        Self {
            backend,
            credentials: None,
            user,
            state,
            logouts,
        }
    }

    /// Persist logins in `store` and restore a previously saved user
    ///
    /// A keyring failure is logged and the session starts signed out.
    pub fn with_credentials(mut self, store: CredentialStore) -> Self {
        match store.load() {
            Ok(Some(user)) => {
                tracing::info!("Restored session for user {}", user.uid);
                self.user.send_replace(Some(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Could not read saved session: {}", e),
        }
        self.credentials = Some(store);
        self
    }

    /// Start the session already signed in as `user`
    pub fn with_user(self, user: AuthUser) -> Self {
        self.user.send_replace(Some(user));
        self
    }

    /// The signed-in user, if any
    pub fn current_user(&self) -> Option<AuthUser> {
        self.user.borrow().clone()
    }

    /// Returns true if someone is signed in
    pub fn is_logged_in(&self) -> bool {
        self.user.borrow().is_some()
    }

    /// Observe the signed-in user
    pub fn user_changes(&self) -> watch::Receiver<Option<AuthUser>> {
        self.user.subscribe()
    }

    /// Observe the state of the last authentication request
    pub fn state(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Observe logouts; the value increases by one on every logout
    pub fn logout_events(&self) -> watch::Receiver<u64> {
        self.logouts.subscribe()
    }

    fn backend(&self) -> Result<Arc<dyn AuthBackend>> {
        self.backend
            .clone()
            .ok_or_else(|| MenteSaError::MissingCredentials("firebase".to_string()).into())
    }

    fn reject(&self, message: &str) -> anyhow::Error {
        self.state.send_replace(AuthState::Error(message.to_string()));
        MenteSaError::Auth(message.to_string()).into()
    }

    fn validate_credentials(&self, email: &str, password: &str) -> Result<()> {
        if !is_valid_email(email) {
            return Err(self.reject(INVALID_EMAIL));
        }
        if password.is_empty() {
            return Err(self.reject(EMPTY_PASSWORD));
        }
        Ok(())
    }

    async fn run<T, F, Fut>(&self, fallback: &str, request: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn AuthBackend>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.state.send_replace(AuthState::Loading);

        let outcome = match self.backend() {
            Ok(backend) => request(backend).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(value) => {
                self.state.send_replace(AuthState::Success);
                Ok(value)
            }
            Err(e) => {
                let message = failure_message(&e, fallback);
                tracing::error!("Authentication request failed: {}", e);
                self.state.send_replace(AuthState::Error(message.clone()));
                Err(MenteSaError::Auth(message).into())
            }
        }
    }

    fn sign_in(&self, user: AuthUser) {
        if let Some(store) = &self.credentials {
            if let Err(e) = store.save(&user) {
                tracing::warn!("Could not save session: {}", e);
            }
        }
        tracing::info!("Signed in as {}", user.uid);
        self.user.send_replace(Some(user));
    }

    /// Sign in with e-mail and password
    pub async fn login_with_email(&self, email: &str, password: &str) -> Result<AuthUser> {
        self.validate_credentials(email, password)?;
        let email = email.trim();
        let user = self
            .run(LOGIN_FAILED, |backend| async move {
                backend.sign_in_with_email(email, password).await
            })
            .await?;
        self.sign_in(user.clone());
        Ok(user)
    }

    /// Create an account with e-mail and password and sign in
    pub async fn register_with_email(&self, email: &str, password: &str) -> Result<AuthUser> {
        self.validate_credentials(email, password)?;
        let email = email.trim();
        let user = self
            .run(REGISTER_FAILED, |backend| async move {
                backend.register_with_email(email, password).await
            })
            .await?;
        self.sign_in(user.clone());
        Ok(user)
    }

    /// Sign in with a Google ID token
    pub async fn sign_in_with_google(&self, id_token: &str) -> Result<AuthUser> {
        if id_token.trim().is_empty() {
            return Err(self.reject(GOOGLE_FAILED));
        }
        let user = self
            .run(GOOGLE_FAILED, |backend| async move {
                backend.sign_in_with_google(id_token.trim()).await
            })
            .await?;
        self.sign_in(user.clone());
        Ok(user)
    }

    /// Send a password reset e-mail
    pub async fn reset_password(&self, email: &str) -> Result<()> {
        if !is_valid_email(email) {
            return Err(self.reject(INVALID_EMAIL));
        }
        let email = email.trim();
        self.run(RESET_FAILED, |backend| async move {
            backend.send_password_reset(email).await
        })
        .await
    }

    /// Sign out
    ///
    /// Clears the user and the saved login and resets the state to
    /// [`AuthState::Initial`]. Stored conversations are kept.
    pub fn logout(&self) {
        self.logouts.send_modify(|n| *n += 1);
        if let Some(store) = &self.credentials {
            if let Err(e) = store.clear() {
                tracing::warn!("Could not clear saved session: {}", e);
            }
        }
        self.user.send_replace(None);
        self.state.send_replace(AuthState::Initial);
        tracing::info!("User signed out");
    }
}

impl IdentityProvider for Session {
    fn current_user_id(&self) -> Option<String> {
        self.user.borrow().as_ref().map(|u| u.uid.clone())
    }

    fn display_name(&self) -> Option<String> {
        self.user
            .borrow()
            .as_ref()
            .and_then(|u| u.display_name.clone())
    }
}
