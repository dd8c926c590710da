//! Request authentication.
//!
//! Shared secrets (app secret keys and job access tokens) travel as the HTTP
//! Basic username. OAuth2 client credentials are exchanged for a bearer token
//! which is cached until shortly before it expires.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::error::GatewayError;
use crate::config::Auth;

// Tokens are refreshed this long before the server-side expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: SecretString,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at.is_none_or(|at| Instant::now() < at)
    }
}

/// Attaches credentials to outgoing requests.
pub struct AuthAgent {
    auth: Auth,
    token_url: String,
    token: Mutex<Option<CachedToken>>,
}

impl AuthAgent {
    pub fn new(auth: Auth, token_url: impl Into<String>) -> Self {
        Self {
            auth,
            token_url: token_url.into(),
            token: Mutex::new(None),
        }
    }

    pub async fn authorize(
        &self,
        http: &Client,
        request: RequestBuilder,
    ) -> Result<RequestBuilder, GatewayError> {
        match &self.auth {
            Auth::None => Ok(request),
            Auth::SharedSecret(secret) => {
                Ok(request.basic_auth(secret.expose_secret(), None::<&str>))
            }
            Auth::OAuth2ClientCredentials {
                client_id,
                client_secret,
            } => {
                let mut cached = self.token.lock().await;
                if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
                    return Ok(request.bearer_auth(token.token.expose_secret()));
                }
                let fresh = self.fetch_token(http, client_id, client_secret).await?;
                let request = request.bearer_auth(fresh.token.expose_secret());
                *cached = Some(fresh);
                Ok(request)
            }
        }
    }

    /// Forgets the cached bearer token, e.g. after a 401.
    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }

    async fn fetch_token(
        &self,
        http: &Client,
        client_id: &str,
        client_secret: &SecretString,
    ) -> Result<CachedToken, GatewayError> {
        debug!(token_url = %self.token_url, "requesting oauth2 access token");
        let response = http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret.expose_secret()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(GatewayError::from_body(&body, status.as_u16()).unwrap_or_else(|| {
                GatewayError::request_failed("POST", &self.token_url, status.as_u16())
            }));
        }

        let body = response.json::<TokenResponse>().await?;
        let expires_at = body.expires_in.map(|secs| {
            Instant::now() + Duration::from_secs(secs).saturating_sub(TOKEN_EXPIRY_MARGIN)
        });
        Ok(CachedToken {
            token: SecretString::from(body.access_token),
            expires_at,
        })
    }
}
