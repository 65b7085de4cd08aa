use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::dto::MessageDto;

/// 实时通道的连接标识，每次连接都会分配新值。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 服务端推送给客户端的事件帧：`{"event": ..., "data": ...}`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage(MessageDto),
    /// 原样转发的输入提示，内容不做解释
    Typing(serde_json::Value),
}

#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("broadcast failed: {0}")]
    Failed(String),
}

impl BroadcastError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// 实时推送。返回值是成功投递的通道数量。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageBroadcaster: Send + Sync {
    async fn broadcast_message(&self, message: MessageDto) -> Result<usize, BroadcastError>;

    /// 转发给除 `origin` 之外的所有通道。
    async fn broadcast_typing(
        &self,
        origin: ConnectionId,
        payload: serde_json::Value,
    ) -> Result<usize, BroadcastError>;
}
