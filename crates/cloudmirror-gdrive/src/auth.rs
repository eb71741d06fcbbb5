//! Credentials file authentication for Google Drive
//!
//! Reads a Google-style credentials JSON file and turns it into a bearer
//! credential. Supported `type`s:
//!
//! - `authorized_user` - `client_id`, `client_secret` and `refresh_token`
//!   (the format written by `gcloud auth application-default login`),
//!   exchanged for an access token with the OAuth2 refresh-token grant
//! - `service_account` - a service account key; an RS256-signed JWT
//!   assertion is exchanged for an access token with the JWT-bearer grant
//!   (RFC 7523)
//! - `access_token` - a token minted elsewhere, used as-is

use std::error::Error;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use cloudmirror_core::domain::errors::AuthError;
use cloudmirror_core::ports::authenticator::{IAuthenticator, TransportCredential};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use oauth2::basic::{BasicClient, BasicErrorResponse};
use oauth2::{ClientId, ClientSecret, RefreshToken, RequestTokenError, TokenResponse, TokenUrl};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Google's OAuth2 token endpoint
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scope requested for service accounts: full Drive access
pub const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// `grant_type` of the JWT-bearer exchange
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime of a signed assertion; Google accepts at most one hour
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Credential material, discriminated by its `type` field
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default)]
        token_uri: Option<String>,
    },
    AccessToken {
        access_token: String,
        #[serde(default)]
        expires_at: Option<DateTime<Utc>>,
    },
    ServiceAccount {
        client_email: String,
        /// PEM-encoded RSA private key
        private_key: String,
        #[serde(default)]
        private_key_id: Option<String>,
        #[serde(default)]
        token_uri: Option<String>,
    },
}

/// Claims of the JWT-bearer assertion
#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    /// Service account email
    pub iss: String,
    pub scope: String,
    /// Token endpoint the assertion is sent to
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

/// Successful token endpoint response
#[derive(Debug, Deserialize)]
struct BearerTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// RFC 6749 error response
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Authenticator reading credential material from a JSON file
pub struct CredentialsFileAuthenticator {
    http: reqwest::Client,
    token_url: Option<String>,
}

impl CredentialsFileAuthenticator {
    pub fn new() -> Self {
        // The token endpoint must not redirect credentials elsewhere.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap_or_default();
        Self {
            http,
            token_url: None,
        }
    }

    /// Overrides the token endpoint, including any `token_uri` in the file
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    async fn load(path: &Path) -> Result<CredentialsFile, AuthError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| AuthError::Unreadable {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|e| AuthError::Invalid(e.to_string()))
    }

    /// The override, else the file's `token_uri`, else Google's endpoint
    fn resolve_token_url(&self, token_uri: Option<String>) -> String {
        self.token_url
            .clone()
            .or(token_uri)
            .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string())
    }

    /// Exchanges a refresh token for an access token
    async fn refresh(
        &self,
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_url: String,
    ) -> Result<TransportCredential, AuthError> {
        let token_url = TokenUrl::new(token_url)
            .map_err(|e| AuthError::Invalid(format!("token_uri: {e}")))?;
        let client = BasicClient::new(ClientId::new(client_id))
            .set_client_secret(ClientSecret::new(client_secret))
            .set_token_uri(token_url);

        info!("Refreshing access token");
        let token = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token))
            .request_async(&self.http)
            .await
            .map_err(|e| AuthError::Exchange(describe_exchange_error(&e)))?;

        let expires_at = token
            .expires_in()
            .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64));
        debug!(?expires_at, "Obtained access token");
        Ok(TransportCredential::new(
            token.access_token().secret().to_string(),
            expires_at,
        ))
    }

    /// Signs an assertion for the service account and exchanges it for an
    /// access token
    async fn exchange_assertion(
        &self,
        client_email: &str,
        private_key: &str,
        private_key_id: Option<String>,
        token_url: &str,
    ) -> Result<TransportCredential, AuthError> {
        let assertion =
            sign_assertion(client_email, private_key, private_key_id, token_url, Utc::now())?;

        info!(client_email, "Exchanging service account assertion");
        let response = self
            .http
            .post(token_url)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| AuthError::Exchange(describe_error_chain(&e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::Exchange(describe_error_chain(&e)))?;
        if !status.is_success() {
            let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(TokenErrorResponse {
                    error,
                    error_description: Some(description),
                }) => format!("{error}: {description}"),
                Ok(TokenErrorResponse { error, .. }) => error,
                Err(_) => body.trim().to_string(),
            };
            return Err(AuthError::Exchange(format!("HTTP {}: {reason}", status.as_u16())));
        }

        let token: BearerTokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::Exchange(format!("unreadable token response: {e}")))?;
        let expires_at = token
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        debug!(?expires_at, "Obtained access token");
        Ok(TransportCredential::new(token.access_token, expires_at))
    }
}

/// Builds the RS256-signed JWT-bearer assertion for a service account
///
/// The key id, when known, goes into the `kid` header so the endpoint can
/// pick the matching public key.
///
/// # Errors
/// [`AuthError::Invalid`] when `private_key` is not a PEM RSA key.
pub fn sign_assertion(
    client_email: &str,
    private_key: &str,
    private_key_id: Option<String>,
    audience: &str,
    now: DateTime<Utc>,
) -> Result<String, AuthError> {
    let key = EncodingKey::from_rsa_pem(private_key.as_bytes())
        .map_err(|e| AuthError::Invalid(format!("private_key: {e}")))?;
    let mut header = Header::new(Algorithm::RS256);
    header.kid = private_key_id;

    let iat = now.timestamp();
    let claims = AssertionClaims {
        iss: client_email.to_string(),
        scope: DRIVE_SCOPE.to_string(),
        aud: audience.to_string(),
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    };
    jsonwebtoken::encode(&header, &claims, &key)
        .map_err(|e| AuthError::Invalid(format!("cannot sign assertion: {e}")))
}

impl Default for CredentialsFileAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

/// The endpoint's error response, or the transport error and its causes
fn describe_exchange_error<RE>(err: &RequestTokenError<RE, BasicErrorResponse>) -> String
where
    RE: Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => response.to_string(),
        other => describe_error_chain(other),
    }
}

/// An error followed by its causes, `: `-separated
fn describe_error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[async_trait::async_trait]
impl IAuthenticator for CredentialsFileAuthenticator {
    async fn authenticate(
        &self,
        credentials_file: &Path,
    ) -> Result<TransportCredential, AuthError> {
        match Self::load(credentials_file).await? {
            CredentialsFile::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => {
                let token_url = self.resolve_token_url(token_uri);
                self.refresh(client_id, client_secret, refresh_token, token_url)
                    .await
            }
            CredentialsFile::ServiceAccount {
                client_email,
                private_key,
                private_key_id,
                token_uri,
            } => {
                let token_url = self.resolve_token_url(token_uri);
                self.exchange_assertion(&client_email, &private_key, private_key_id, &token_url)
                    .await
            }
            CredentialsFile::AccessToken {
                access_token,
                expires_at,
            } => {
                if access_token.is_empty() {
                    return Err(AuthError::Invalid("access_token is empty".to_string()));
                }
                let credential = TransportCredential::new(access_token, expires_at);
                if credential.is_expired() {
                    return Err(AuthError::Invalid(
                        "access_token has already expired".to_string(),
                    ));
                }
                Ok(credential)
            }
        }
    }
}
