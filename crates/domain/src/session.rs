use std::fmt;

use chrono::Duration;

use crate::value_objects::{Timestamp, UserId};

/// 默认会话有效期（天）。
pub const SESSION_TTL_DAYS: i64 = 7;

/// 会话令牌摘要。数据库中只保存摘要，原始令牌仅存在于客户端 cookie。
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct SessionKey(String);

impl SessionKey {
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 日志中只输出前缀
        let prefix: String = self.0.chars().take(8).collect();
        write!(f, "{prefix}…")
    }
}

/// 服务端会话，绑定到一个用户。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Session {
    pub key: SessionKey,
    pub user_id: UserId,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl Session {
    pub fn establish(key: SessionKey, user_id: UserId, now: Timestamp, ttl: Duration) -> Self {
        Self {
            key,
            user_id,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }
}
