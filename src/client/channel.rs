//! Cross-tab session signalling.
//!
//! Tabs of one browser profile share a [`BroadcastHub`]. Each named channel
//! carries JSON messages; the session channel only knows `{"type":"logout"}`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Name of the channel session messages travel on.
pub const SESSION_CHANNEL_NAME: &str = "portal-session";

const CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SessionMessage {
    Logout,
}

/// One posted message. `sender` lets a tab skip its own posts.
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub sender: Uuid,
    pub payload: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to encode channel message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("no tab is listening on {0}")]
    NoListeners(String),
}

#[derive(Default)]
pub struct BroadcastHub {
    channels: Mutex<HashMap<String, broadcast::Sender<ChannelMessage>>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or join) the channel called `name`.
    pub fn channel(&self, name: &str) -> SessionChannel {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone();
        SessionChannel {
            name: name.to_string(),
            tx,
        }
    }
}

#[derive(Clone)]
pub struct SessionChannel {
    name: String,
    tx: broadcast::Sender<ChannelMessage>,
}

impl SessionChannel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn post(&self, sender: Uuid, message: &SessionMessage) -> Result<(), ChannelError> {
        let payload = serde_json::to_string(message)?;
        self.tx
            .send(ChannelMessage { sender, payload })
            .map(|_| ())
            .map_err(|_| ChannelError::NoListeners(self.name.clone()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelMessage> {
        self.tx.subscribe()
    }
}
