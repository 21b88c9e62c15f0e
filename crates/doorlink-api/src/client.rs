// Device API HTTP client
//
// Wraps `reqwest::Client` with bearer-token injection, URL construction,
// and status-code mapping. Token acquisition lives in `auth.rs` as
// inherent methods on the same type.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::models::{CommandKey, CommandRequest, DeviceRecord, DevicesResponse};
use crate::transport::TransportConfig;

/// Raw HTTP client for the door service's REST API.
///
/// Cheap to share behind an `Arc`; the bearer token can be swapped
/// atomically while requests are in flight.
pub struct CloudClient {
    http: reqwest::Client,
    base_url: Url,
    token: ArcSwapOption<SecretString>,
}

impl CloudClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the API root, e.g. `https://api.example.net/v1`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            token: ArcSwapOption::empty(),
        }
    }

    /// The underlying HTTP client (for auth flows that need direct access).
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The API base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Replace the bearer token used for subsequent requests.
    pub fn set_token(&self, token: SecretString) {
        debug!("storing access token");
        self.token.store(Some(Arc::new(token)));
    }

    /// The bearer token currently in use, if any.
    pub fn token(&self) -> Option<Arc<SecretString>> {
        self.token.load_full()
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// List every device on the account with its doors.
    ///
    /// `GET /devices`
    pub async fn list_devices(&self) -> Result<Vec<DeviceRecord>, Error> {
        let url = self.api_url("devices")?;
        let response: DevicesResponse = self.get(url).await?;
        Ok(response.devices)
    }

    /// Fetch a single device.
    ///
    /// `GET /devices/{id}`
    pub async fn get_device(&self, device_id: u64) -> Result<DeviceRecord, Error> {
        let url = self.api_url(&format!("devices/{device_id}"))?;
        self.get(url).await
    }

    /// Ask the service to move a door.
    ///
    /// `POST /devices/{id}/door/{index}/command`
    pub async fn send_door_command(
        &self,
        device_id: u64,
        door_index: u8,
        command_key: CommandKey,
    ) -> Result<(), Error> {
        let url = self.api_url(&format!("devices/{device_id}/door/{door_index}/command"))?;
        self.post_no_content(url, &CommandRequest { command_key })
            .await
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/{path}`, tolerating a trailing slash on the base.
    pub(crate) fn api_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    fn bearer(&self) -> Result<Arc<SecretString>, Error> {
        self.token.load_full().ok_or(Error::MissingToken)
    }

    /// Send an authenticated GET request and decode the JSON body.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let token = self.bearer()?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_json(resp).await
    }

    /// Send an authenticated POST with a JSON body, ignoring any response body.
    pub(crate) async fn post_no_content(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
    ) -> Result<(), Error> {
        debug!("POST {}", url);

        let token = self.bearer()?;
        let resp = self
            .http
            .post(url)
            .bearer_auth(token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(Error::Transport)?;

        check_status(resp).await.map(drop)
    }
}

/// Map non-success statuses to typed errors, passing successful responses through.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::Unauthorized {
            status: status.as_u16(),
        });
    }

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Api {
            status: status.as_u16(),
            body,
        });
    }

    Ok(resp)
}

/// Check the status, then decode the body as `T`.
pub(crate) async fn parse_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, Error> {
    let resp = check_status(resp).await?;
    let body = resp.text().await.map_err(Error::Transport)?;
    trace!(len = body.len(), "response body received");

    serde_json::from_str(&body).map_err(|e| {
        let preview: String = body.chars().take(200).collect();
        Error::Deserialization {
            message: format!("{e} (body preview: {preview:?})"),
            body: body.clone(),
        }
    })
}
