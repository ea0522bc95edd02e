//! Guest side of the join flow: a one-shot state machine fed by the join
//! WebSocket. Kept apart from the operator polling core.

use crate::render::Level;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStatus {
    Pending,
    Approved,
    Denied,
    IntruderDetected,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    JoinResponse { status: JoinStatus },
    Error { message: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Serialize)]
struct JoinRequestMessage {
    #[serde(rename = "type")]
    kind: &'static str,
    network_identifier: u64,
    device_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPhase {
    Connecting,
    Connected,
    Sending,
    Pending,
    Approved,
    Denied,
    IntruderDetected,
    Disconnected,
}

impl JoinPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JoinPhase::Approved | JoinPhase::Denied | JoinPhase::IntruderDetected)
    }
}

#[derive(Debug, Clone)]
pub struct JoinFlow {
    pub network_id: u64,
    pub device_id: Option<u64>,
    phase: JoinPhase,
    message: String,
    level: Level,
}

impl JoinFlow {
    pub fn new(network_id: u64, device_id: Option<u64>) -> Self {
        Self {
            network_id,
            device_id,
            phase: JoinPhase::Connecting,
            message: "Connecting to join service...".to_string(),
            level: Level::Info,
        }
    }

    pub fn phase(&self) -> JoinPhase {
        self.phase
    }

    pub fn status(&self) -> (&str, Level) {
        (&self.message, self.level)
    }

    fn set_status(&mut self, message: impl Into<String>, level: Level) {
        self.message = message.into();
        self.level = level;
    }

    pub fn can_submit(&self) -> bool {
        self.device_id.is_some()
            && !matches!(self.phase, JoinPhase::Sending | JoinPhase::Pending)
            && !self.phase.is_terminal()
    }

    pub fn on_connected(&mut self) {
        if self.phase == JoinPhase::Connecting {
            self.phase = JoinPhase::Connected;
            self.set_status("Connected", Level::Info);
        }
    }

    pub fn on_disconnected(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = JoinPhase::Disconnected;
        self.set_status("Disconnected from join service", Level::Warning);
    }

    /// Builds the outgoing frame, or reports why nothing can be sent.
    pub fn begin_send(&mut self) -> Option<String> {
        if !self.can_submit() {
            return None;
        }
        let device_id = self.device_id?;
        if !matches!(self.phase, JoinPhase::Connected) {
            self.set_status("Connection error. Please refresh the page.", Level::Danger);
            return None;
        }
        let frame = serde_json::to_string(&JoinRequestMessage {
            kind: "join_request",
            network_identifier: self.network_id,
            device_id,
        })
        .ok()?;
        self.phase = JoinPhase::Sending;
        self.set_status("Sending join request...", Level::Info);
        Some(frame)
    }

    pub fn on_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::JoinResponse { status } => {
                // terminal answers are final
                if self.phase.is_terminal() {
                    debug!(?status, "ignoring join response after final answer");
                    return;
                }
                match status {
                    JoinStatus::Pending => {
                        self.phase = JoinPhase::Pending;
                        self.set_status("Request sent! Waiting for admin approval...", Level::Warning);
                    }
                    JoinStatus::Approved => {
                        self.phase = JoinPhase::Approved;
                        self.set_status(
                            "Request approved! You are now connected to the network.",
                            Level::Success,
                        );
                    }
                    JoinStatus::Denied => {
                        self.phase = JoinPhase::Denied;
                        self.set_status("Request denied by administrator.", Level::Danger);
                    }
                    JoinStatus::IntruderDetected => {
                        self.phase = JoinPhase::IntruderDetected;
                        self.set_status(
                            "ACCESS DENIED: Unauthorized access attempt detected and logged.",
                            Level::Danger,
                        );
                    }
                }
            }
            ServerMessage::Error { message } => {
                if self.phase.is_terminal() {
                    return;
                }
                if self.phase == JoinPhase::Sending {
                    self.phase = JoinPhase::Connected;
                }
                self.set_status(message, Level::Danger);
            }
            ServerMessage::Other => {}
        }
    }
}

fn lock(flow: &Mutex<JoinFlow>) -> std::sync::MutexGuard<'_, JoinFlow> {
    flow.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drives the join socket until it closes. Frames queued on `outgoing` are
/// sent as-is; everything received is folded into `flow`.
pub async fn run_join_channel(
    url: Url,
    flow: Arc<Mutex<JoinFlow>>,
    mut outgoing: mpsc::UnboundedReceiver<String>,
) {
    let (mut ws, _) = match connect_async(url.clone()).await {
        Ok(value) => value,
        Err(err) => {
            warn!(%url, "join_connect_error: {err}");
            lock(&flow).on_disconnected();
            return;
        }
    };
    info!(%url, "connected to join service");
    lock(&flow).on_connected();

    loop {
        tokio::select! {
            incoming = ws.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(message) => lock(&flow).on_message(message),
                    Err(err) => debug!("unparsable join frame: {err}"),
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!("join_socket_error: {err}");
                    break;
                }
            },
            Some(frame) = outgoing.recv() => {
                if ws.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = ws.close(None).await;
    lock(&flow).on_disconnected();
}
