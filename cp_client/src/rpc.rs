//! Ledger connection over the RPC node's websocket pubsub API.
//!
//! Every subscription gets its own socket and reader task; cancelling the
//! subscription aborts the task, which closes the socket.

use async_trait::async_trait;
use base64::{Engine, prelude::BASE64_STANDARD};
use chain_poker::{
    FeedError,
    remote::{Address, CancelHandle, RemoteConnection, Subscription},
};
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_CAPACITY: usize = 256;
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_ID: u64 = 1;

/// `RemoteConnection` backed by a JSON-RPC websocket endpoint.
#[derive(Clone, Debug)]
pub struct RpcConnection {
    url: String,
    commitment: String,
    capacity: usize,
}

impl RpcConnection {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            commitment: "confirmed".to_string(),
            capacity: DEFAULT_CAPACITY,
        }
    }

    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_commitment(mut self, commitment: impl Into<String>) -> Self {
        self.commitment = commitment.into();
        self
    }

    async fn open<T>(
        &self,
        method: &'static str,
        params: Value,
        notification: &'static str,
        extract: fn(&Value) -> Option<T>,
    ) -> Result<Subscription<T>, FeedError>
    where
        T: Send + 'static,
    {
        let (mut ws, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| FeedError::Subscribe(format!("{}: {e}", self.url)))?;

        let request = json!({
            "jsonrpc": "2.0",
            "id": REQUEST_ID,
            "method": method,
            "params": params,
        });
        ws.send(Message::text(request.to_string()))
            .await
            .map_err(|e| FeedError::Subscribe(e.to_string()))?;

        let subscription = tokio::time::timeout(SUBSCRIBE_TIMEOUT, await_confirmation(&mut ws))
            .await
            .map_err(|_| FeedError::Subscribe(format!("{method} not confirmed in time")))??;
        info!("{method} confirmed as subscription {subscription}");

        let (tx, receiver) = mpsc::channel(self.capacity);
        let task = tokio::spawn(forward(ws, tx, notification, extract));
        Ok(Subscription {
            receiver,
            cancel: CancelHandle::from_task(task),
        })
    }
}

#[async_trait]
impl RemoteConnection for RpcConnection {
    async fn subscribe_snapshots(&self, account: &Address) -> Result<Subscription<Vec<u8>>, FeedError> {
        let params = json!([account.0, { "encoding": "base64", "commitment": self.commitment }]);
        self.open("accountSubscribe", params, "accountNotification", account_data)
            .await
    }

    async fn subscribe_logs(&self, program: &Address) -> Result<Subscription<Vec<String>>, FeedError> {
        let params = json!([{ "mentions": [program.0] }, { "commitment": self.commitment }]);
        self.open("logsSubscribe", params, "logsNotification", transaction_logs)
            .await
    }
}

/// Wait for the reply to our subscribe request and return the subscription id.
async fn await_confirmation(ws: &mut Socket) -> Result<u64, FeedError> {
    while let Some(message) = ws.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => return Err(FeedError::Subscribe(e.to_string())),
        };
        let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        if frame.get("id").and_then(Value::as_u64) != Some(REQUEST_ID) {
            continue;
        }
        if let Some(error) = frame.get("error") {
            return Err(FeedError::Subscribe(error.to_string()));
        }
        return frame
            .get("result")
            .and_then(Value::as_u64)
            .ok_or_else(|| FeedError::Subscribe(format!("unexpected reply: {frame}")));
    }
    Err(FeedError::Subscribe(
        "connection closed before confirmation".to_string(),
    ))
}

/// Reader task: push each matching notification until the socket ends or
/// the receiver goes away. The stream always ends with one `Err`.
async fn forward<T>(
    mut ws: Socket,
    tx: mpsc::Sender<Result<T, FeedError>>,
    notification: &'static str,
    extract: fn(&Value) -> Option<T>,
) {
    let reason = loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                let frame = match serde_json::from_str::<Value>(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Dropping malformed RPC frame: {e}");
                        continue;
                    }
                };
                if frame.get("method").and_then(Value::as_str) != Some(notification) {
                    continue;
                }
                if let Some(item) = extract(&frame)
                    && tx.send(Ok(item)).await.is_err()
                {
                    debug!("{notification} receiver dropped");
                    return;
                }
            }
            Some(Ok(Message::Close(frame))) => {
                break frame.map_or_else(
                    || "rpc node closed the connection".to_string(),
                    |f| format!("rpc node closed the connection: {}", f.reason.as_str()),
                );
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => break e.to_string(),
            None => break "rpc connection ended".to_string(),
        }
    };
    warn!("{notification} stream stopped: {reason}");
    let _ = tx.send(Err(FeedError::Interrupted(reason))).await;
}

/// Raw account bytes from an `accountNotification` frame.
pub fn account_data(frame: &Value) -> Option<Vec<u8>> {
    let encoded = frame.pointer("/params/result/value/data/0")?.as_str()?;
    match BASE64_STANDARD.decode(encoded) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            warn!("Account data is not base64: {e}");
            None
        }
    }
}

/// Log lines from a `logsNotification` frame. Failed transactions carry no
/// state change and are skipped.
pub fn transaction_logs(frame: &Value) -> Option<Vec<String>> {
    let value = frame.pointer("/params/result/value")?;
    if !value.get("err").is_none_or(Value::is_null) {
        debug!(
            "Skipping failed transaction {}",
            value.get("signature").and_then(Value::as_str).unwrap_or("?")
        );
        return None;
    }
    value
        .get("logs")?
        .as_array()?
        .iter()
        .map(|line| line.as_str().map(str::to_string))
        .collect()
}
