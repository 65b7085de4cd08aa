//! 进程内的实时连接注册表。
//!
//! 只在连接建立/断开时写入；广播时先在读锁下取快照，再逐个发送，
//! 发送失败（对端已断开）直接忽略。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::UserId;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::broadcaster::{BroadcastError, ConnectionId, MessageBroadcaster, ServerEvent};
use crate::dto::MessageDto;

struct ConnectionEntry {
    user_id: UserId,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

/// 新连接注册后得到的接收端。
pub struct Subscription {
    pub connection_id: ConnectionId,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionEntry>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, user_id: UserId) -> Subscription {
        let (sender, events) = mpsc::unbounded_channel();
        let connection_id = ConnectionId::generate();
        let total = {
            let mut connections = self.connections.write().await;
            connections.insert(connection_id, ConnectionEntry { user_id, sender });
            connections.len()
        };
        info!(connection_id = %connection_id, user_id = %user_id, total, "realtime channel connected");
        Subscription {
            connection_id,
            events,
        }
    }

    pub async fn unregister(&self, connection_id: ConnectionId) {
        let removed = self.connections.write().await.remove(&connection_id);
        if let Some(entry) = removed {
            info!(connection_id = %connection_id, user_id = %entry.user_id, "realtime channel disconnected");
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    async fn snapshot(
        &self,
        except: Option<ConnectionId>,
    ) -> Vec<mpsc::UnboundedSender<ServerEvent>> {
        self.connections
            .read()
            .await
            .iter()
            .filter(|(id, _)| Some(**id) != except)
            .map(|(_, entry)| entry.sender.clone())
            .collect()
    }

    async fn fan_out(&self, event: ServerEvent, except: Option<ConnectionId>) -> usize {
        let targets = self.snapshot(except).await;
        targets
            .into_iter()
            .filter(|sender| sender.send(event.clone()).is_ok())
            .count()
    }
}

#[async_trait]
impl MessageBroadcaster for ConnectionRegistry {
    async fn broadcast_message(&self, message: MessageDto) -> Result<usize, BroadcastError> {
        let message_id = message.id;
        let delivered = self.fan_out(ServerEvent::NewMessage(message), None).await;
        debug!(message_id = %message_id, delivered, "new_message broadcast");
        Ok(delivered)
    }

    async fn broadcast_typing(
        &self,
        origin: ConnectionId,
        payload: serde_json::Value,
    ) -> Result<usize, BroadcastError> {
        let delivered = self
            .fan_out(ServerEvent::Typing(payload), Some(origin))
            .await;
        debug!(origin = %origin, delivered, "typing relayed");
        Ok(delivered)
    }
}
