// Token acquisition
//
// Password-grant login and refresh-token exchange against the service's
// token endpoint. On success the access token is stored on the client
// and used as the bearer for every subsequent request.

use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::client::{CloudClient, check_status};
use crate::error::Error;
use crate::models::TokenResponse;

/// Tokens returned by a successful login or refresh.
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Lifetime reported by the service, if any.
    pub expires_in: Option<Duration>,
    pub issued_at: DateTime<Utc>,
}

impl TokenSet {
    /// Wrap a pre-issued bearer token with no known expiry.
    pub fn from_access_token(access_token: SecretString) -> Self {
        Self {
            access_token,
            refresh_token: None,
            expires_in: None,
            issued_at: Utc::now(),
        }
    }

    /// When the access token stops being valid, if the service said.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let lifetime = chrono::Duration::from_std(self.expires_in?).ok()?;
        self.issued_at.checked_add_signed(lifetime)
    }

    /// `true` once `now` is within `buffer` of the expiry.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        let Some(expires_at) = self.expires_at() else {
            return false;
        };
        let buffer = chrono::Duration::from_std(buffer).unwrap_or_else(|_| chrono::Duration::zero());
        now + buffer >= expires_at
    }

    fn from_response(resp: TokenResponse) -> Self {
        Self {
            access_token: SecretString::from(resp.access_token),
            refresh_token: resp.refresh_token.map(SecretString::from),
            expires_in: resp.expires_in.map(Duration::from_secs),
            issued_at: Utc::now(),
        }
    }
}

impl CloudClient {
    /// Authenticate with username/password (OAuth password grant).
    ///
    /// `POST {base}/oauth/token` with a form body. The returned access
    /// token is stored on the client.
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
        client_id: &str,
    ) -> Result<TokenSet, Error> {
        let url = self.api_url("oauth/token")?;
        debug!("logging in at {}", url);

        let form = [
            ("grant_type", "password"),
            ("client_id", client_id),
            ("username", username),
            ("password", password.expose_secret()),
        ];
        let tokens = self.token_request(url, &form).await?;

        debug!("login successful");
        Ok(tokens)
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &SecretString,
        client_id: &str,
    ) -> Result<TokenSet, Error> {
        let url = self.api_url("oauth/token")?;
        debug!("refreshing access token at {}", url);

        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", client_id),
            ("refresh_token", refresh_token.expose_secret()),
        ];
        self.token_request(url, &form).await
    }

    async fn token_request(&self, url: url::Url, form: &[(&str, &str)]) -> Result<TokenSet, Error> {
        let resp = self
            .http()
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(Error::Transport)?;

        let resp = match check_status(resp).await {
            Ok(resp) => resp,
            Err(Error::Unauthorized { status }) => {
                return Err(Error::Authentication {
                    message: format!("token endpoint rejected credentials (HTTP {status})"),
                });
            }
            Err(Error::Api { status: 400, body }) => {
                return Err(Error::Authentication {
                    message: format!("token endpoint rejected request: {body}"),
                });
            }
            Err(e) => return Err(e),
        };

        let body: TokenResponse = resp.json().await.map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: String::new(),
        })?;

        let tokens = TokenSet::from_response(body);
        self.set_token(tokens.access_token.clone());
        Ok(tokens)
    }
}
