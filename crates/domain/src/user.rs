use chrono::Duration;

use crate::errors::{DomainError, DomainResult};
use crate::message::SenderProfile;
use crate::value_objects::{
    DisplayName, PasswordHash, PhoneNumber, Timestamp, UserEmail, UserId, Username,
    VerificationCode,
};

/// 默认验证码有效期（分钟）。
pub const VERIFICATION_CODE_TTL_MINUTES: i64 = 15;

/// 尚未消费的验证码。验证码与过期时间总是成对出现。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PendingVerification {
    pub code: VerificationCode,
    pub expires_at: Timestamp,
}

impl PendingVerification {
    pub fn issue(code: VerificationCode, now: Timestamp, ttl: Duration) -> Self {
        Self {
            code,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: UserEmail,
    #[serde(skip_serializing)] // 密码字段不暴露给客户端
    pub password: PasswordHash,
    pub phone: Option<PhoneNumber>,
    pub name: Option<DisplayName>,
    pub username: Option<Username>,
    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub pending_verification: Option<PendingVerification>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl User {
    /// 注册新用户：未验证状态，并携带一个新签发的验证码。
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        id: UserId,
        email: UserEmail,
        password: PasswordHash,
        phone: Option<PhoneNumber>,
        name: Option<DisplayName>,
        code: VerificationCode,
        now: Timestamp,
        code_ttl: Duration,
    ) -> Self {
        Self {
            id,
            email,
            password,
            phone,
            name,
            username: None,
            email_verified: false,
            pending_verification: Some(PendingVerification::issue(code, now, code_ttl)),
            created_at: now,
            updated_at: now,
        }
    }

    /// 用验证码确认邮箱。成功后验证码被消费，之后无法再次使用。
    ///
    /// 检查顺序：已验证 -> 验证码不匹配 -> 已过期。
    pub fn verify_email(&mut self, code: &VerificationCode, now: Timestamp) -> DomainResult<()> {
        if self.email_verified {
            return Err(DomainError::AlreadyVerified);
        }
        let pending = self
            .pending_verification
            .as_ref()
            .ok_or(DomainError::InvalidCode)?;
        if pending.code != *code {
            return Err(DomainError::InvalidCode);
        }
        if pending.is_expired(now) {
            return Err(DomainError::CodeExpired);
        }

        self.email_verified = true;
        self.pending_verification = None;
        self.updated_at = now;
        Ok(())
    }

    /// 重新签发验证码，旧验证码立即失效。返回新的待验证状态。
    pub fn reissue_code(
        &mut self,
        code: VerificationCode,
        now: Timestamp,
        code_ttl: Duration,
    ) -> DomainResult<PendingVerification> {
        if self.email_verified {
            return Err(DomainError::AlreadyVerified);
        }
        let pending = PendingVerification::issue(code, now, code_ttl);
        self.pending_verification = Some(pending.clone());
        self.updated_at = now;
        Ok(pending)
    }

    /// 只有验证过邮箱的用户才能发消息。
    pub fn can_post_messages(&self) -> bool {
        self.email_verified
    }

    pub fn update_profile(
        &mut self,
        name: Option<DisplayName>,
        username: Option<Username>,
        now: Timestamp,
    ) {
        if let Some(name) = name {
            self.name = Some(name);
        }
        if let Some(username) = username {
            self.username = Some(username);
        }
        self.updated_at = now;
    }

    pub fn sender_profile(&self) -> SenderProfile {
        SenderProfile {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            username: self.username.clone(),
        }
    }
}
