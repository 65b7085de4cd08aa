use std::sync::Arc;

use domain::{Message, MessageId, MessageText, UserId};
use tracing::warn;
use uuid::Uuid;

use crate::{
    broadcaster::MessageBroadcaster,
    clock::Clock,
    dto::MessageDto,
    error::ApplicationError,
    repository::{MessageRepository, UserRepository},
};

/// 未指定 `take` 时返回的消息数量。
pub const DEFAULT_HISTORY_TAKE: u32 = 50;
/// 单次最多返回的消息数量。
pub const MAX_HISTORY_TAKE: u32 = 200;

pub struct MessageServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub broadcaster: Arc<dyn MessageBroadcaster>,
    /// 应为单调时钟，消息顺序只由 `created_at` 决定
    pub clock: Arc<dyn Clock>,
}

pub struct MessageService {
    deps: MessageServiceDependencies,
}

impl MessageService {
    pub fn new(deps: MessageServiceDependencies) -> Self {
        Self { deps }
    }

    /// 发送消息并推送给所有在线通道。
    ///
    /// 邮箱未验证的用户在校验正文之前就会被拒绝。
    pub async fn create_message(
        &self,
        sender_id: UserId,
        text: String,
    ) -> Result<MessageDto, ApplicationError> {
        let sender = self
            .deps
            .user_repository
            .find_by_id(sender_id)
            .await?
            .ok_or(ApplicationError::Unauthorized)?;
        if !sender.can_post_messages() {
            return Err(ApplicationError::EmailNotVerified {
                email: sender.email.as_str().to_owned(),
            });
        }

        let text = MessageText::new(text)?;
        let message = Message::new(
            MessageId::from(Uuid::new_v4()),
            sender_id,
            text,
            self.deps.clock.now(),
        );
        let stored = self.deps.message_repository.create(message).await?;
        let dto = MessageDto::from(&stored);

        // 推送失败不影响已经持久化的消息
        if let Err(err) = self.deps.broadcaster.broadcast_message(dto.clone()).await {
            warn!(message_id = %dto.id, error = %err, "failed to broadcast new message");
        }
        Ok(dto)
    }

    /// 最近的消息，按时间正序返回。
    pub async fn list_recent(&self, take: Option<u32>) -> Result<Vec<MessageDto>, ApplicationError> {
        let take = take.unwrap_or(DEFAULT_HISTORY_TAKE).min(MAX_HISTORY_TAKE);
        if take == 0 {
            return Ok(Vec::new());
        }
        let mut messages = self.deps.message_repository.list_recent(take).await?;
        messages.reverse();
        Ok(messages.iter().map(MessageDto::from).collect())
    }
}
