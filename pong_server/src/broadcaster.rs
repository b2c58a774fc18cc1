//! Fan-out of server messages to individual connections. Each connection
//! registers the sender side of its outbound channel; the socket task owns
//! the sink and drains the channel, so sending here never blocks on the
//! network. Delivery is best-effort: a bounded retry, then the message is
//! dropped and the next state broadcast supersedes it.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use axum::extract::ws::Message;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, warn};

use pong_shared::{PlayerId, ServerMessage};

const RETRY_BACKOFF: [Duration; 2] = [Duration::from_millis(100), Duration::from_millis(200)];

#[derive(Default)]
pub struct Broadcaster {
    connections: RwLock<HashMap<PlayerId, UnboundedSender<Message>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, player: PlayerId, tx: UnboundedSender<Message>) {
        self.connections.write().unwrap().insert(player, tx);
    }

    pub fn unregister(&self, player: &PlayerId) {
        self.connections.write().unwrap().remove(player);
    }

    /// Serialize once and hand the frame to the connection's outbound
    /// channel. Unknown ids (bots, departed players) drop silently.
    pub async fn send(&self, player: &PlayerId, message: &ServerMessage) {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(err) => {
                error!(%player, %err, "failed to serialize outbound message");
                return;
            }
        };

        for (attempt, backoff) in std::iter::once(None)
            .chain(RETRY_BACKOFF.iter().copied().map(Some))
            .enumerate()
        {
            if let Some(backoff) = backoff {
                tokio::time::sleep(backoff).await;
            }
            let tx = self.connections.read().unwrap().get(player).cloned();
            match tx {
                None => {
                    debug!(%player, "no connection for outbound message, dropping");
                    return;
                }
                Some(tx) => {
                    if tx.send(Message::Text(json.clone().into())).is_ok() {
                        return;
                    }
                    debug!(%player, attempt, "outbound channel closed, retrying");
                }
            }
        }
        warn!(%player, "dropping outbound message after retries");
    }
}
