use std::sync::Arc;

use application::repository::{MessageRepository, SessionRepository, UserRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    DisplayName, Message, MessageId, MessageText, MessageWithSender, PasswordHash,
    PendingVerification, PhoneNumber, RepositoryError, SenderProfile, Session, SessionKey,
    Timestamp, User, UserEmail, UserId, Username, VerificationCode,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};
use uuid::Uuid;

/// 唯一约束冲突映射为 `Conflict`，外键缺失映射为 `NotFound`，其余都是存储错误。
fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return RepositoryError::conflict(db_err.constraint().unwrap_or("unique"));
        }
        if db_err.is_foreign_key_violation() {
            return RepositoryError::NotFound;
        }
    }
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

const USER_COLUMNS: &str = "id, email, password_hash, phone, name, username, email_verified, \
     email_verify_code, email_verify_expires, created_at, updated_at";

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    password_hash: String,
    phone: Option<String>,
    name: Option<String>,
    username: Option<String>,
    email_verified: bool,
    email_verify_code: Option<String>,
    email_verify_expires: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = RepositoryError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        let email = UserEmail::parse(value.email).map_err(|err| invalid_data(err.to_string()))?;
        let password =
            PasswordHash::new(value.password_hash).map_err(|err| invalid_data(err.to_string()))?;
        let phone = value
            .phone
            .map(PhoneNumber::parse)
            .transpose()
            .map_err(|err| invalid_data(err.to_string()))?;
        let name = value
            .name
            .map(DisplayName::parse)
            .transpose()
            .map_err(|err| invalid_data(err.to_string()))?;
        let username = value
            .username
            .map(Username::parse)
            .transpose()
            .map_err(|err| invalid_data(err.to_string()))?;
        let pending_verification = match (value.email_verify_code, value.email_verify_expires) {
            (Some(code), Some(expires_at)) => Some(PendingVerification {
                code: VerificationCode::parse(code).map_err(|err| invalid_data(err.to_string()))?,
                expires_at,
            }),
            _ => None,
        };

        Ok(User {
            id: UserId::from(value.id),
            email,
            password,
            phone,
            name,
            username,
            email_verified: value.email_verified,
            pending_verification,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

/// 消息与发送者的联表结果。
#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    text: String,
    sender_id: Uuid,
    created_at: DateTime<Utc>,
    sender_email: String,
    sender_name: Option<String>,
    sender_username: Option<String>,
}

impl TryFrom<MessageRecord> for MessageWithSender {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        let text = MessageText::new(value.text).map_err(|err| invalid_data(err.to_string()))?;
        let sender_id = UserId::from(value.sender_id);
        let sender = SenderProfile {
            id: sender_id,
            email: UserEmail::parse(value.sender_email)
                .map_err(|err| invalid_data(err.to_string()))?,
            name: value
                .sender_name
                .map(DisplayName::parse)
                .transpose()
                .map_err(|err| invalid_data(err.to_string()))?,
            username: value
                .sender_username
                .map(Username::parse)
                .transpose()
                .map_err(|err| invalid_data(err.to_string()))?,
        };
        Ok(MessageWithSender {
            message: Message::new(
                MessageId::from(value.id),
                sender_id,
                text,
                value.created_at,
            ),
            sender,
        })
    }
}

#[derive(Debug, FromRow)]
struct SessionRecord {
    token_hash: String,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl From<SessionRecord> for Session {
    fn from(value: SessionRecord) -> Self {
        Session {
            key: SessionKey::new(value.token_hash),
            user_id: UserId::from(value.user_id),
            created_at: value.created_at,
            expires_at: value.expires_at,
        }
    }
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_one(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = $1");
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        record.map(User::try_from).transpose()
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {USER_COLUMNS}"
        );
        let pending = user.pending_verification.as_ref();
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::from(user.id))
            .bind(user.email.as_str())
            .bind(user.password.as_str())
            .bind(user.phone.as_ref().map(|p| p.as_str()))
            .bind(user.name.as_ref().map(|n| n.as_str()))
            .bind(user.username.as_ref().map(|u| u.as_str()))
            .bind(user.email_verified)
            .bind(pending.map(|p| p.code.as_str()))
            .bind(pending.map(|p| p.expires_at))
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        User::try_from(record)
    }

    async fn confirm_email(
        &self,
        id: UserId,
        code: &VerificationCode,
        now: Timestamp,
    ) -> Result<Option<User>, RepositoryError> {
        // 过期时刻本身仍然有效
        let sql = format!(
            "UPDATE users SET email_verified = TRUE, email_verify_code = NULL, \
             email_verify_expires = NULL, updated_at = $3 \
             WHERE id = $1 AND NOT email_verified AND email_verify_code = $2 \
             AND email_verify_expires >= $3 RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::from(id))
            .bind(code.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        record.map(User::try_from).transpose()
    }

    async fn replace_pending_code(
        &self,
        id: UserId,
        pending: &PendingVerification,
        now: Timestamp,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = format!(
            "UPDATE users SET email_verify_code = $2, email_verify_expires = $3, updated_at = $4 \
             WHERE id = $1 AND NOT email_verified RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::from(id))
            .bind(pending.code.as_str())
            .bind(pending.expires_at)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        record.map(User::try_from).transpose()
    }

    async fn update_profile(
        &self,
        id: UserId,
        name: Option<&DisplayName>,
        username: Option<&Username>,
        now: Timestamp,
    ) -> Result<User, RepositoryError> {
        let sql = format!(
            "UPDATE users SET name = COALESCE($2, name), username = COALESCE($3, username), \
             updated_at = $4 WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::from(id))
            .bind(name.map(|n| n.as_str()))
            .bind(username.map(|u| u.as_str()))
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?
            .ok_or(RepositoryError::NotFound)?;

        User::try_from(record)
    }

    async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        // messages 与 sessions 通过 ON DELETE CASCADE 一并删除
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(Uuid::from(id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        record.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        self.find_one("email", email.as_str()).await
    }

    async fn find_by_phone(&self, phone: &PhoneNumber) -> Result<Option<User>, RepositoryError> {
        self.find_one("phone", phone.as_str()).await
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        self.find_one("username", username.as_str()).await
    }
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(&self, message: Message) -> Result<MessageWithSender, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            WITH inserted AS (
                INSERT INTO messages (id, text, sender_id, created_at)
                VALUES ($1, $2, $3, $4)
                RETURNING id, text, sender_id, created_at
            )
            SELECT i.id, i.text, i.sender_id, i.created_at,
                   u.email AS sender_email, u.name AS sender_name, u.username AS sender_username
            FROM inserted i
            JOIN users u ON u.id = i.sender_id
            "#,
        )
        .bind(Uuid::from(message.id))
        .bind(message.text.as_str())
        .bind(Uuid::from(message.sender_id))
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        MessageWithSender::try_from(record)
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<MessageWithSender>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT m.id, m.text, m.sender_id, m.created_at,
                   u.email AS sender_email, u.name AS sender_name, u.username AS sender_username
            FROM messages m
            JOIN users u ON u.id = m.sender_id
            ORDER BY m.created_at DESC
            LIMIT $1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(MessageWithSender::try_from).collect()
    }
}

#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, session: Session) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(session.key.as_str())
        .bind(Uuid::from(session.user_id))
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find(&self, key: &SessionKey) -> Result<Option<Session>, RepositoryError> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT token_hash, user_id, created_at, expires_at FROM sessions WHERE token_hash = $1",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(record.map(Session::from))
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn delete_for_user(&self, user_id: UserId) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(Uuid::from(user_id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(result.rows_affected())
    }
}

/// 共享同一个连接池的全部仓储。
#[derive(Clone)]
pub struct PgStorage {
    pub user_repository: Arc<PgUserRepository>,
    pub message_repository: Arc<PgMessageRepository>,
    pub session_repository: Arc<PgSessionRepository>,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self {
            user_repository: Arc::new(PgUserRepository::new(pool.clone())),
            message_repository: Arc::new(PgMessageRepository::new(pool.clone())),
            session_repository: Arc::new(PgSessionRepository::new(pool)),
        }
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
