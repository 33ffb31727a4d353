// Hub RPC client
//
// Wraps `reqwest::Client` with bearer-token injection, envelope unwrapping,
// and the single auth retry. Discovery, state fetch, and command submission
// all go through `call`, so the retry rule applies to every method.

use std::sync::Arc;

use secrecy::ExposeSecret;
use serde_json::{Map, Value};
use tracing::{debug, trace, warn};
use url::Url;

use crate::auth::{HubCredentials, Token, TokenManager};
use crate::error::Error;
use crate::models::{
    CommandReply, DISCOVER_METHOD, DeviceList, HubDevice, RpcRequest, RpcResponse, StateReply,
};
use crate::transport::TransportConfig;

const API_PATH: &str = "/open/yolink/v2/api";

/// HTTP client for the hub's local control API.
///
/// Each method is one RPC round-trip. Calls are independent and may run
/// concurrently; the only shared state is the `TokenManager`.
pub struct HubClient {
    http: reqwest::Client,
    api_url: Url,
    auth: Arc<TokenManager>,
}

impl HubClient {
    /// Build a client and its token manager from hub credentials.
    ///
    /// Both share one connection pool built from `transport`.
    pub fn new(credentials: &HubCredentials, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        let auth = Arc::new(TokenManager::new(http.clone(), credentials)?);
        Self::with_client(http, &credentials.http_base_url()?, auth)
    }

    /// Build a client around an existing `reqwest::Client` and token manager.
    pub fn with_client(
        http: reqwest::Client,
        base_url: &Url,
        auth: Arc<TokenManager>,
    ) -> Result<Self, Error> {
        let api_url = base_url.join(API_PATH)?;
        Ok(Self {
            http,
            api_url,
            auth,
        })
    }

    /// The token manager shared with the MQTT subscriber.
    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.auth
    }

    // ── Operations ──────────────────────────────────────────────────

    /// List every device bound to the hub.
    ///
    /// An absent or empty `devices` list is not an error.
    pub async fn discover(&self) -> Result<Vec<HubDevice>, Error> {
        let resp = self.call(&RpcRequest::home(DISCOVER_METHOD)).await?;

        let list: DeviceList = if resp.data.is_null() {
            DeviceList::default()
        } else {
            serde_json::from_value(resp.data.clone()).map_err(|e| Error::Deserialization {
                message: format!("device list: {e}"),
                body: resp.data.to_string(),
            })?
        };

        let devices = list.devices.unwrap_or_default();
        debug!(count = devices.len(), "discovered devices");
        Ok(devices)
    }

    /// Fetch the full current state of one device.
    pub async fn fetch_state(&self, device: &HubDevice) -> Result<StateReply, Error> {
        let method = format!("{}.getState", device.device_type);
        let request = RpcRequest::device(
            method,
            &device.device_id,
            device.token.expose_secret(),
        );
        let resp = self.call(&request).await?;
        let hub_time = resp.hub_time();

        let data = match resp.data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(Error::Deserialization {
                    message: format!("{} returned non-object data", request.method),
                    body: other.to_string(),
                });
            }
        };

        trace!(device_id = %device.device_id, attributes = data.len(), "state fetched");
        Ok(StateReply { data, hub_time })
    }

    /// Submit one `setState` command. Exactly one attempt; the hub's reply
    /// is returned as-is.
    pub async fn send_command(
        &self,
        device: &HubDevice,
        params: Value,
    ) -> Result<CommandReply, Error> {
        let method = format!("{}.setState", device.device_type);
        let request = RpcRequest::device(
            method,
            &device.device_id,
            device.token.expose_secret(),
        )
        .with_params(params);

        debug!(device_id = %device.device_id, method = %request.method, "sending command");
        let resp = self.call(&request).await?;

        Ok(CommandReply {
            method: resp.method.clone().unwrap_or_else(|| request.method.clone()),
            hub_time: resp.hub_time(),
            data: resp.data,
        })
    }

    // ── Transport mechanics ─────────────────────────────────────────

    /// Execute one RPC, retrying exactly once with a fresh token if the hub
    /// rejects the current one.
    async fn call(&self, request: &RpcRequest) -> Result<RpcResponse, Error> {
        let token = self.auth.get_token().await?;

        match self.post(request, &token).await {
            Err(e) if e.is_auth_expired() => {
                warn!(method = %request.method, "token rejected, refreshing and retrying once");
                self.auth.invalidate_token(&token).await;
                let fresh = self.auth.get_token().await?;
                self.post(request, &fresh).await
            }
            other => other,
        }
    }

    async fn post(&self, request: &RpcRequest, token: &Token) -> Result<RpcResponse, Error> {
        trace!(method = %request.method, "POST {}", self.api_url);

        let resp = self
            .http
            .post(self.api_url.clone())
            .bearer_auth(token.secret().expose_secret())
            .json(request)
            .send()
            .await
            .map_err(Error::Transport)?;

        parse_envelope(resp).await
    }
}

/// Unwrap the hub's `{ code, desc, time, method, data }` envelope.
async fn parse_envelope(resp: reqwest::Response) -> Result<RpcResponse, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(Error::TokenRejected { code: None });
    }

    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Hub {
            code: format!("HTTP {}", status.as_u16()),
            message: preview(&body).to_owned(),
        });
    }

    let body = resp.text().await.map_err(Error::Transport)?;

    let envelope: RpcResponse = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(&body)),
        body: body.clone(),
    })?;

    if envelope.is_token_rejected() {
        return Err(Error::TokenRejected {
            code: Some(envelope.code),
        });
    }

    if !envelope.is_success() {
        return Err(Error::Hub {
            message: envelope.desc.clone().unwrap_or_default(),
            code: envelope.code,
        });
    }

    Ok(envelope)
}

fn preview(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map_or(body.len(), |(idx, _)| idx);
    &body[..end]
}
