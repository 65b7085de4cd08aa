use async_trait::async_trait;
use domain::{
    DisplayName, Message, MessageWithSender, PendingVerification, PhoneNumber, RepositoryError,
    Session, SessionKey, Timestamp, User, UserEmail, UserId, Username, VerificationCode,
};

/// 用户存储。邮箱、手机号、用户名的唯一性由存储层保证，
/// 冲突时返回 [`RepositoryError::Conflict`]。
///
/// 写操作都是针对单个字段组的条件更新，不会用旧快照覆盖整行。
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> Result<User, RepositoryError>;

    /// 仅当用户未验证、待验证码等于 `code` 且未过期时标记为已验证并清除验证码。
    /// 条件不满足返回 `None`。
    async fn confirm_email(
        &self,
        id: UserId,
        code: &VerificationCode,
        now: Timestamp,
    ) -> Result<Option<User>, RepositoryError>;

    /// 仅对未验证用户替换待验证码；已验证时返回 `None`。
    async fn replace_pending_code(
        &self,
        id: UserId,
        pending: &PendingVerification,
        now: Timestamp,
    ) -> Result<Option<User>, RepositoryError>;

    /// 只写入提供的资料字段，其余字段保持数据库中的当前值。
    async fn update_profile(
        &self,
        id: UserId,
        name: Option<&DisplayName>,
        username: Option<&Username>,
        now: Timestamp,
    ) -> Result<User, RepositoryError>;
    /// 删除用户，同时级联删除其消息和会话。
    async fn delete(&self, id: UserId) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError>;
    async fn find_by_phone(&self, phone: &PhoneNumber) -> Result<Option<User>, RepositoryError>;
    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 保存消息并返回带发送者信息的视图。
    async fn create(&self, message: Message) -> Result<MessageWithSender, RepositoryError>;

    /// 最新的 `limit` 条消息，按 `created_at` 倒序。
    async fn list_recent(&self, limit: u32) -> Result<Vec<MessageWithSender>, RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: Session) -> Result<(), RepositoryError>;
    async fn find(&self, key: &SessionKey) -> Result<Option<Session>, RepositoryError>;
    /// 删除单个会话；会话不存在时不报错。
    async fn delete(&self, key: &SessionKey) -> Result<(), RepositoryError>;
    async fn delete_for_user(&self, user_id: UserId) -> Result<u64, RepositoryError>;
}
