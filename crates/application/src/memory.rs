//! 内存实现的存储，用于测试和无数据库的本地运行（`database.backend = "memory"`）。
//! 记录验证码的通知器只在测试或 `test-support` 特性下编译。
//!
//! 所有状态放在同一把锁下，唯一性检查与写入是原子的，
//! 行为与数据库的唯一约束、级联删除保持一致。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    DisplayName, Message, MessageId, MessageWithSender, PendingVerification, PhoneNumber,
    RepositoryError, Session, SessionKey, Timestamp, User, UserEmail, UserId, Username,
    VerificationCode,
};
use tokio::sync::RwLock;

use crate::repository::{MessageRepository, SessionRepository, UserRepository};

#[derive(Default)]
struct StoreState {
    users: HashMap<UserId, User>,
    messages: HashMap<MessageId, Message>,
    sessions: HashMap<SessionKey, Session>,
}

impl StoreState {
    fn unique_violation(&self, candidate: &User) -> Option<&'static str> {
        self.users
            .values()
            .filter(|existing| existing.id != candidate.id)
            .find_map(|existing| {
                if existing.email == candidate.email {
                    Some("users_email_key")
                } else if candidate.phone.is_some() && existing.phone == candidate.phone {
                    Some("users_phone_key")
                } else if candidate.username.is_some() && existing.username == candidate.username
                {
                    Some("users_username_key")
                } else {
                    None
                }
            })
    }

    fn with_sender(&self, message: &Message) -> Option<MessageWithSender> {
        self.users
            .get(&message.sender_id)
            .map(|user| MessageWithSender {
                message: message.clone(),
                sender: user.sender_profile(),
            })
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }
}

#[async_trait]
impl UserRepository for InMemoryStore {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        if state.users.contains_key(&user.id) {
            return Err(RepositoryError::conflict("users_pkey"));
        }
        if let Some(constraint) = state.unique_violation(&user) {
            return Err(RepositoryError::conflict(constraint));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn confirm_email(
        &self,
        id: UserId,
        code: &VerificationCode,
        now: Timestamp,
    ) -> Result<Option<User>, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(user) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        // 检查与写入在同一把写锁内完成
        Ok(user.verify_email(code, now).ok().map(|()| user.clone()))
    }

    async fn replace_pending_code(
        &self,
        id: UserId,
        pending: &PendingVerification,
        now: Timestamp,
    ) -> Result<Option<User>, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(user) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        if user.email_verified {
            return Ok(None);
        }
        user.pending_verification = Some(pending.clone());
        user.updated_at = now;
        Ok(Some(user.clone()))
    }

    async fn update_profile(
        &self,
        id: UserId,
        name: Option<&DisplayName>,
        username: Option<&Username>,
        now: Timestamp,
    ) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        let mut updated = state
            .users
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;
        updated.update_profile(name.cloned(), username.cloned(), now);
        if let Some(constraint) = state.unique_violation(&updated) {
            return Err(RepositoryError::conflict(constraint));
        }
        state.users.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if state.users.remove(&id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        state.messages.retain(|_, message| message.sender_id != id);
        state.sessions.retain(|_, session| session.user_id != id);
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| &u.email == email).cloned())
    }

    async fn find_by_phone(&self, phone: &PhoneNumber) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.phone.as_ref() == Some(phone))
            .cloned())
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.username.as_ref() == Some(username))
            .cloned())
    }
}

#[async_trait]
impl MessageRepository for InMemoryStore {
    async fn create(&self, message: Message) -> Result<MessageWithSender, RepositoryError> {
        let mut state = self.state.write().await;
        let joined = state.with_sender(&message).ok_or(RepositoryError::NotFound)?;
        state.messages.insert(message.id, message);
        Ok(joined)
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<MessageWithSender>, RepositoryError> {
        let state = self.state.read().await;
        let mut messages: Vec<&Message> = state.messages.values().collect();
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(messages
            .into_iter()
            .take(limit as usize)
            .filter_map(|message| state.with_sender(message))
            .collect())
    }
}

#[async_trait]
impl SessionRepository for InMemoryStore {
    async fn create(&self, session: Session) -> Result<(), RepositoryError> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&session.user_id) {
            return Err(RepositoryError::NotFound);
        }
        state.sessions.insert(session.key.clone(), session);
        Ok(())
    }

    async fn find(&self, key: &SessionKey) -> Result<Option<Session>, RepositoryError> {
        Ok(self.state.read().await.sessions.get(key).cloned())
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), RepositoryError> {
        self.state.write().await.sessions.remove(key);
        Ok(())
    }

    async fn delete_for_user(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, session| session.user_id != user_id);
        Ok((before - state.sessions.len()) as u64)
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use recording::RecordingNotifier;

#[cfg(any(test, feature = "test-support"))]
mod recording {
    use std::sync::Arc;

    use async_trait::async_trait;
    use domain::{UserEmail, VerificationCode};
    use tokio::sync::Mutex;
    use tracing::debug;

    use crate::notifier::{NotifierError, VerificationNotifier};

    /// 记录每一次发送的验证码，供测试读取。
    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        sent: Arc<Mutex<Vec<(UserEmail, VerificationCode)>>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// 发给该邮箱的最近一个验证码。
        pub async fn last_code_for(&self, email: &str) -> Option<VerificationCode> {
            self.sent
                .lock()
                .await
                .iter()
                .rev()
                .find(|(to, _)| to.as_str() == email)
                .map(|(_, code)| code.clone())
        }

        pub async fn sent_count(&self) -> usize {
            self.sent.lock().await.len()
        }
    }

    #[async_trait]
    impl VerificationNotifier for RecordingNotifier {
        async fn send_verification_code(
            &self,
            email: &UserEmail,
            code: &VerificationCode,
        ) -> Result<(), NotifierError> {
            debug!("verification code recorded");
            self.sent.lock().await.push((email.clone(), code.clone()));
            Ok(())
        }
    }
}
