//! Streaming overlay control
//!
//! While the bot speaks, an OBS source (usually the persona's avatar) is
//! shown and hidden again afterwards. Talks obs-websocket protocol v5.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tokio_tungstenite::tungstenite::Message;

use crate::{Error, Result};

/// Shows and hides a source in a streaming scene
#[async_trait]
pub trait Overlay: Send + Sync {
    /// Set whether `source` is visible in `scene`
    ///
    /// # Errors
    ///
    /// Returns error if the overlay cannot be reached or rejects the change
    async fn set_source_visibility(&self, scene: &str, source: &str, visible: bool) -> Result<()>;
}

/// Overlay that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOverlay;

#[async_trait]
impl Overlay for NoOverlay {
    async fn set_source_visibility(&self, _scene: &str, _source: &str, _visible: bool) -> Result<()> {
        Ok(())
    }
}

/// obs-websocket opcodes
mod op {
    pub const HELLO: u64 = 0;
    pub const IDENTIFY: u64 = 1;
    pub const IDENTIFIED: u64 = 2;
    pub const REQUEST: u64 = 6;
    pub const REQUEST_RESPONSE: u64 = 7;
}

const RPC_VERSION: u64 = 1;

/// Longest a single visibility change may take, connection included
pub const DEFAULT_OVERLAY_TIMEOUT: Duration = Duration::from_secs(5);

/// Overlay driven through obs-websocket
pub struct ObsOverlay {
    url: String,
    password: Option<SecretString>,
    timeout: Duration,
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

impl ObsOverlay {
    /// Create a client for the websocket at `url`
    #[must_use]
    pub fn new(url: impl Into<String>, password: Option<SecretString>) -> Self {
        Self {
            url: url.into(),
            password,
            timeout: DEFAULT_OVERLAY_TIMEOUT,
        }
    }

    /// Give up on an update after `timeout`
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The websocket URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> Result<WsStream> {
        let (mut ws, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::Overlay(format!("connect to {} failed: {e}", self.url)))?;

        let hello = expect_op(&mut ws, op::HELLO).await?;
        let auth = hello
            .pointer("/d/authentication")
            .and_then(|a| Some((a.get("challenge")?.as_str()?, a.get("salt")?.as_str()?)));

        let mut identify = json!({ "rpcVersion": RPC_VERSION });
        if let Some((challenge, salt)) = auth {
            let password = self
                .password
                .as_ref()
                .ok_or_else(|| Error::Overlay("OBS requires a password".to_string()))?;
            identify["authentication"] =
                Value::String(auth_response(password.expose_secret(), salt, challenge));
        }

        send(&mut ws, op::IDENTIFY, identify).await?;
        expect_op(&mut ws, op::IDENTIFIED).await?;
        tracing::debug!(url = %self.url, "identified with OBS");

        Ok(ws)
    }

    async fn update(&self, scene: &str, source: &str, visible: bool) -> Result<()> {
        let mut ws = self.connect().await?;

        let item = Self::request(
            &mut ws,
            "GetSceneItemId",
            json!({ "sceneName": scene, "sourceName": source }),
        )
        .await?;
        let item_id = item["sceneItemId"]
            .as_i64()
            .ok_or_else(|| Error::Overlay(format!("no scene item for {source}")))?;

        Self::request(
            &mut ws,
            "SetSceneItemEnabled",
            json!({
                "sceneName": scene,
                "sceneItemId": item_id,
                "sceneItemEnabled": visible,
            }),
        )
        .await?;

        if let Err(e) = ws.close(None).await {
            tracing::debug!(error = %e, "OBS close failed");
        }
        Ok(())
    }

    async fn request(ws: &mut WsStream, request_type: &str, data: Value) -> Result<Value> {
        let request_id = format!("{request_type}-{}", chrono::Utc::now().timestamp_millis());
        send(
            ws,
            op::REQUEST,
            json!({
                "requestType": request_type,
                "requestId": request_id,
                "requestData": data,
            }),
        )
        .await?;

        loop {
            let message = expect_op(ws, op::REQUEST_RESPONSE).await?;
            let d = &message["d"];
            if d["requestId"].as_str() != Some(request_id.as_str()) {
                continue;
            }

            if d.pointer("/requestStatus/result").and_then(Value::as_bool) != Some(true) {
                let comment = d
                    .pointer("/requestStatus/comment")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(Error::Overlay(format!("{request_type} failed: {comment}")));
            }

            return Ok(d.get("responseData").cloned().unwrap_or(Value::Null));
        }
    }
}

#[async_trait]
impl Overlay for ObsOverlay {
    async fn set_source_visibility(&self, scene: &str, source: &str, visible: bool) -> Result<()> {
        tokio::time::timeout(self.timeout, self.update(scene, source, visible))
            .await
            .map_err(|_| {
                Error::Overlay(format!("OBS at {} did not respond within {:?}", self.url, self.timeout))
            })??;

        tracing::debug!(scene, source, visible, "overlay source updated");
        Ok(())
    }
}

/// Authentication string for obs-websocket v5
///
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
#[must_use]
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let secret = BASE64.encode(Sha256::digest(format!("{password}{salt}").as_bytes()));
    BASE64.encode(Sha256::digest(format!("{secret}{challenge}").as_bytes()))
}

async fn send(ws: &mut WsStream, opcode: u64, d: Value) -> Result<()> {
    let text = json!({ "op": opcode, "d": d }).to_string();
    ws.send(Message::text(text))
        .await
        .map_err(|e| Error::Overlay(e.to_string()))
}

/// Read messages until one with the given opcode arrives
async fn expect_op(ws: &mut WsStream, opcode: u64) -> Result<Value> {
    while let Some(message) = ws.next().await {
        let message = message.map_err(|e| Error::Overlay(e.to_string()))?;
        let text = match message {
            Message::Text(text) => text,
            Message::Close(frame) => {
                let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                return Err(Error::Overlay(format!("OBS closed the connection: {reason}")));
            }
            _ => continue,
        };

        let value: Value = serde_json::from_str(text.as_str())?;
        if value["op"].as_u64() == Some(opcode) {
            return Ok(value);
        }
    }

    Err(Error::Overlay("OBS connection ended".to_string()))
}
