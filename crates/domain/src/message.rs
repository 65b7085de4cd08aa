use crate::value_objects::{DisplayName, MessageId, MessageText, Timestamp, UserEmail, UserId, Username};

/// 聊天消息。创建后不可修改。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub text: MessageText,
    pub created_at: Timestamp,
}

impl Message {
    pub fn new(id: MessageId, sender_id: UserId, text: MessageText, created_at: Timestamp) -> Self {
        Self {
            id,
            sender_id,
            text,
            created_at,
        }
    }
}

/// 随消息一起返回的发送者最小信息。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SenderProfile {
    pub id: UserId,
    pub email: UserEmail,
    pub name: Option<DisplayName>,
    pub username: Option<Username>,
}

/// 消息与发送者信息的联合视图。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MessageWithSender {
    pub message: Message,
    pub sender: SenderProfile,
}
