//! Authentication backends
//!
//! [`FirebaseAuthBackend`] talks to the Identity Toolkit REST API. Failures
//! are reported as [`MenteSaError::Auth`] carrying a Portuguese message that
//! can be shown to the user as is.

use crate::auth::AuthUser;
use crate::error::{MenteSaError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fallback message for a failed e-mail sign-in
pub const LOGIN_FAILED: &str = "Erro desconhecido no login";
/// Fallback message for a failed registration
pub const REGISTER_FAILED: &str = "Erro desconhecido no registro";
/// Fallback message for a failed Google sign-in
pub const GOOGLE_FAILED: &str = "Erro ao autenticar com Google";
/// Fallback message for a failed password reset
pub const RESET_FAILED: &str = "Erro ao enviar email de recuperação";

/// Remote authentication service
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Sign in with e-mail and password
    async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<AuthUser>;

    /// Create an account with e-mail and password and sign in
    async fn register_with_email(&self, email: &str, password: &str) -> Result<AuthUser>;

    /// Sign in with a Google ID token
    async fn sign_in_with_google(&self, id_token: &str) -> Result<AuthUser>;

    /// Send a password reset e-mail
    async fn send_password_reset(&self, email: &str) -> Result<()>;
}

/// Identity Toolkit (Firebase Authentication) REST client
#[derive(Debug, Clone)]
pub struct FirebaseAuthBackend {
    client: Client,
    api_key: String,
    api_base: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest {
    post_body: String,
    request_uri: &'static str,
    return_idp_credential: bool,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OobRequest<'a> {
    request_type: &'static str,
    email: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl From<SignInResponse> for AuthUser {
    fn from(r: SignInResponse) -> Self {
        Self {
            uid: r.local_id,
            email: r.email.filter(|e| !e.is_empty()),
            display_name: r.display_name.filter(|n| !n.is_empty()),
            id_token: r.id_token,
            refresh_token: r.refresh_token,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Maps an Identity Toolkit error code to a user-facing message
///
/// Codes may carry a detail suffix (`WEAK_PASSWORD : Password should be...`);
/// only the part before ` : ` is matched.
///
/// # Examples
///
/// ```
/// use mentesa::auth::backend::{error_message, LOGIN_FAILED};
///
/// assert_eq!(error_message("INVALID_PASSWORD", LOGIN_FAILED), "Senha incorreta.");
/// assert_eq!(error_message("SOMETHING_NEW", LOGIN_FAILED), LOGIN_FAILED);
/// ```
pub fn error_message(code: &str, fallback: &str) -> String {
    let code = code.split(" : ").next().unwrap_or(code).trim();
    let message = match code {
        "EMAIL_NOT_FOUND" => "Nenhuma conta encontrada com este e-mail.",
        "INVALID_PASSWORD" => "Senha incorreta.",
        "INVALID_LOGIN_CREDENTIALS" => "E-mail ou senha incorretos.",
        "EMAIL_EXISTS" => "Este e-mail já está em uso.",
        "WEAK_PASSWORD" => "A senha deve ter pelo menos 6 caracteres.",
        "INVALID_EMAIL" => "E-mail inválido.",
        "MISSING_PASSWORD" => "Informe a senha.",
        "USER_DISABLED" => "Esta conta foi desativada.",
        "TOO_MANY_ATTEMPTS_TRY_LATER" => "Muitas tentativas. Tente novamente mais tarde.",
        "INVALID_IDP_RESPONSE" => "Não foi possível autenticar com o Google.",
        "OPERATION_NOT_ALLOWED" => "Este método de login não está habilitado.",
        _ => fallback,
    };
    message.to_string()
}

impl FirebaseAuthBackend {
    /// Create a new backend for the given web API key
    ///
    /// # Errors
    ///
    /// Returns error if the API key is blank or the HTTP client cannot be built
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(MenteSaError::MissingCredentials("firebase".to_string()).into());
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("mentesa/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MenteSaError::Auth(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    /// Builds a backend from the `auth` section of the configuration
    pub fn from_config(config: &crate::config::AuthConfig) -> Result<Self> {
        let api_key = config
            .firebase_api_key
            .clone()
            .ok_or_else(|| MenteSaError::MissingCredentials("firebase".to_string()))?;
        Self::new(api_key, config.identity_api_base.clone())
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/v1/accounts:{}?key={}", self.api_base, method, self.api_key)
    }

    async fn post<B, T>(&self, method: &str, body: &B, fallback: &str) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: for<'de> Deserialize<'de>,
    {
        tracing::debug!("Identity Toolkit request: accounts:{}", method);

        let response = self
            .client
            .post(self.endpoint(method))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Identity Toolkit unreachable: {}", e);
                MenteSaError::Auth(fallback.to_string())
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            tracing::error!("Failed to read Identity Toolkit response: {}", e);
            MenteSaError::Auth(fallback.to_string())
        })?;

        if !status.is_success() {
            let code = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|env| env.error.message)
                .unwrap_or_default();
            tracing::warn!("accounts:{} failed with {} ({})", method, status, code);
            return Err(MenteSaError::Auth(error_message(&code, fallback)).into());
        }

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!("Unexpected Identity Toolkit response: {}", e);
            MenteSaError::Auth(fallback.to_string()).into()
        })
    }
}

#[async_trait]
impl AuthBackend for FirebaseAuthBackend {
    async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<AuthUser> {
        let body = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: SignInResponse = self
            .post("signInWithPassword", &body, LOGIN_FAILED)
            .await?;
        Ok(response.into())
    }

    async fn register_with_email(&self, email: &str, password: &str) -> Result<AuthUser> {
        let body = PasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response: SignInResponse = self.post("signUp", &body, REGISTER_FAILED).await?;
        Ok(response.into())
    }

    async fn sign_in_with_google(&self, id_token: &str) -> Result<AuthUser> {
        let body = IdpRequest {
            post_body: format!("id_token={}&providerId=google.com", id_token),
            request_uri: "http://localhost",
            return_idp_credential: true,
            return_secure_token: true,
        };
        let response: SignInResponse = self.post("signInWithIdp", &body, GOOGLE_FAILED).await?;
        Ok(response.into())
    }

    async fn send_password_reset(&self, email: &str) -> Result<()> {
        let body = OobRequest {
            request_type: "PASSWORD_RESET",
            email,
        };
        let _: serde_json::Value = self.post("sendOobCode", &body, RESET_FAILED).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_strips_detail_suffix() {
        assert_eq!(
            error_message(
                "WEAK_PASSWORD : Password should be at least 6 characters",
                REGISTER_FAILED
            ),
            "A senha deve ter pelo menos 6 caracteres."
        );
    }

    #[test]
    fn test_error_message_fallback() {
        assert_eq!(error_message("", GOOGLE_FAILED), GOOGLE_FAILED);
    }

    #[test]
    fn test_new_rejects_blank_key() {
        assert!(FirebaseAuthBackend::new("  ", "http://localhost").is_err());
    }

    #[test]
    fn test_endpoint_format() {
        let backend = FirebaseAuthBackend::new("abc", "http://localhost:1234/").unwrap();
        assert_eq!(
            backend.endpoint("signUp"),
            "http://localhost:1234/v1/accounts:signUp?key=abc"
        );
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = crate::config::AuthConfig::default();
        assert!(FirebaseAuthBackend::from_config(&config).is_err());
    }

    #[test]
    fn test_sign_in_response_mapping() {
        let response: SignInResponse = serde_json::from_str(
            r#"{"localId":"u1","email":"a@b.com","displayName":"","idToken":"t","refreshToken":"r"}"#,
        )
        .unwrap();
        let user: AuthUser = response.into();
        assert_eq!(user.uid, "u1");
        assert_eq!(user.email.as_deref(), Some("a@b.com"));
        assert!(user.display_name.is_none());
        assert_eq!(user.refresh_token.as_deref(), Some("r"));
    }

    #[test]
    fn test_password_request_serialization() {
        let body = PasswordRequest {
            email: "a@b.com",
            password: "segredo",
            return_secure_token: true,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["returnSecureToken"], true);
        assert_eq!(json["email"], "a@b.com");
    }
}
