use std::sync::Arc;

use chrono::Duration;
use domain::{
    DisplayName, PhoneNumber, RepositoryError, Session, Timestamp, User, UserEmail, UserId,
    VerificationCode, SESSION_TTL_DAYS, VERIFICATION_CODE_TTL_MINUTES,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    clock::Clock,
    code::CodeGenerator,
    error::{ApplicationError, Validator},
    notifier::VerificationNotifier,
    password::{PasswordHasher, MIN_PASSWORD_CHARS},
    repository::{SessionRepository, UserRepository},
    token::SessionToken,
};

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub email: String,
    pub password: String,
    pub phone: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// 验证码与会话的有效期。
#[derive(Debug, Clone, Copy)]
pub struct AuthSettings {
    pub code_ttl: Duration,
    pub session_ttl: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            code_ttl: Duration::minutes(VERIFICATION_CODE_TTL_MINUTES),
            session_ttl: Duration::days(SESSION_TTL_DAYS),
        }
    }
}

/// 新建立的会话：原始令牌只在这里出现一次，交给调用方写入 cookie。
#[derive(Debug, Clone)]
pub struct AuthenticatedSession {
    pub user: User,
    pub token: SessionToken,
}

/// 登录结果。未验证邮箱的用户同样拿到会话，但需要提示去验证。
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Verified(AuthenticatedSession),
    PendingVerification(AuthenticatedSession),
}

impl LoginOutcome {
    pub fn session(&self) -> &AuthenticatedSession {
        match self {
            Self::Verified(session) | Self::PendingVerification(session) => session,
        }
    }
}

pub struct AuthServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub session_repository: Arc<dyn SessionRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub notifier: Arc<dyn VerificationNotifier>,
    pub code_generator: Arc<dyn CodeGenerator>,
    pub clock: Arc<dyn Clock>,
    pub settings: AuthSettings,
}

pub struct AuthService {
    deps: AuthServiceDependencies,
}

impl AuthService {
    pub fn new(deps: AuthServiceDependencies) -> Self {
        Self { deps }
    }

    pub fn session_ttl(&self) -> Duration {
        self.deps.settings.session_ttl
    }

    /// 注册新用户并发送验证码，返回新用户 id。
    ///
    /// 用户写入成功后才发送邮件；发送失败时用户记录保留，可通过重发验证码补救。
    pub async fn register(&self, request: RegisterUserRequest) -> Result<UserId, ApplicationError> {
        let mut validator = Validator::default();
        let email = validator.check(UserEmail::parse(request.email));
        if request.password.chars().count() < MIN_PASSWORD_CHARS {
            validator.push(
                "password",
                format!("must be at least {MIN_PASSWORD_CHARS} characters"),
            );
        }
        let phone = match request.phone {
            Some(raw) if !raw.trim().is_empty() => validator.check(PhoneNumber::parse(raw)),
            _ => None,
        };
        let name = validator
            .check(DisplayName::parse_optional(request.name))
            .flatten();
        validator.finish()?;
        let Some(email) = email else {
            return Err(ApplicationError::validation("email", "is required"));
        };

        if self.deps.user_repository.find_by_email(&email).await?.is_some() {
            return Err(ApplicationError::AccountExists);
        }
        if let Some(phone) = &phone {
            if self.deps.user_repository.find_by_phone(phone).await?.is_some() {
                return Err(ApplicationError::AccountExists);
            }
        }

        let password_hash = self.deps.password_hasher.hash(&request.password).await?;
        let code = self.deps.code_generator.generate();
        let now = self.deps.clock.now();
        let user = User::register(
            UserId::from(Uuid::new_v4()),
            email,
            password_hash,
            phone,
            name,
            code.clone(),
            now,
            self.deps.settings.code_ttl,
        );

        let stored = self
            .deps
            .user_repository
            .create(user)
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict { .. } => ApplicationError::AccountExists,
                other => ApplicationError::Repository(other),
            })?;

        if let Err(err) = self
            .deps
            .notifier
            .send_verification_code(&stored.email, &code)
            .await
        {
            error!(user_id = %stored.id, error = %err, "failed to send verification code after registration");
            return Err(err.into());
        }
        info!(user_id = %stored.id, "user registered, verification code dispatched");
        Ok(stored.id)
    }

    /// 校验验证码；成功后邮箱标记为已验证并自动登录。
    pub async fn verify(
        &self,
        request: VerifyEmailRequest,
    ) -> Result<AuthenticatedSession, ApplicationError> {
        let mut validator = Validator::default();
        let email = validator.check(UserEmail::parse(request.email));
        let code = validator.check(VerificationCode::parse(request.code));
        validator.finish()?;
        let (Some(email), Some(code)) = (email, code) else {
            return Err(ApplicationError::validation("code", "is required"));
        };

        let mut snapshot = self
            .deps
            .user_repository
            .find_by_email(&email)
            .await?
            .ok_or(ApplicationError::UserNotFound)?;
        let now = self.deps.clock.now();
        // 快照只用于判定错误类型，状态转换由存储层的条件更新完成
        snapshot.verify_email(&code, now)?;
        let Some(user) = self
            .deps
            .user_repository
            .confirm_email(snapshot.id, &code, now)
            .await?
        else {
            return Err(self.lost_verification_race(snapshot.id, &code, now).await);
        };
        info!(user_id = %user.id, "email verified");

        let token = self.establish_session(user.id).await?;
        Ok(AuthenticatedSession { user, token })
    }

    /// 重新签发验证码，旧验证码立即作废。
    pub async fn resend_code(&self, email: String) -> Result<(), ApplicationError> {
        let email = UserEmail::parse(email)?;
        let mut user = self
            .deps
            .user_repository
            .find_by_email(&email)
            .await?
            .ok_or(ApplicationError::UserNotFound)?;

        let code = self.deps.code_generator.generate();
        let now = self.deps.clock.now();
        let pending = user.reissue_code(code.clone(), now, self.deps.settings.code_ttl)?;
        let user = self
            .deps
            .user_repository
            .replace_pending_code(user.id, &pending, now)
            .await?
            .ok_or(ApplicationError::AlreadyVerified)?;

        if let Err(err) = self
            .deps
            .notifier
            .send_verification_code(&user.email, &code)
            .await
        {
            error!(user_id = %user.id, error = %err, "failed to resend verification code");
            return Err(err.into());
        }
        info!(user_id = %user.id, "verification code re-sent");
        Ok(())
    }

    /// 邮箱不存在与密码错误返回同一个错误，避免暴露账号是否存在。
    pub async fn login(&self, request: LoginRequest) -> Result<LoginOutcome, ApplicationError> {
        let Ok(email) = UserEmail::parse(request.email) else {
            return Err(ApplicationError::InvalidCredentials);
        };
        let Some(user) = self.deps.user_repository.find_by_email(&email).await? else {
            return Err(ApplicationError::InvalidCredentials);
        };
        let matches = self
            .deps
            .password_hasher
            .verify(&request.password, &user.password)
            .await?;
        if !matches {
            return Err(ApplicationError::InvalidCredentials);
        }

        let token = self.establish_session(user.id).await?;
        let verified = user.email_verified;
        let session = AuthenticatedSession { user, token };
        Ok(if verified {
            LoginOutcome::Verified(session)
        } else {
            LoginOutcome::PendingVerification(session)
        })
    }

    /// 注销当前会话；没有会话时什么也不做。
    pub async fn logout(&self, token: Option<&SessionToken>) -> Result<(), ApplicationError> {
        if let Some(token) = token {
            self.deps.session_repository.delete(&token.key()).await?;
        }
        Ok(())
    }

    /// 当前会话对应的用户；会话缺失、过期或用户已删除时返回 `None`。
    pub async fn current_user(
        &self,
        token: Option<&SessionToken>,
    ) -> Result<Option<User>, ApplicationError> {
        let Some(session) = self.resolve_session(token).await? else {
            return Ok(None);
        };
        Ok(self
            .deps
            .user_repository
            .find_by_id(session.user_id)
            .await?)
    }

    /// 要求有效会话，返回会话所属用户。
    pub async fn authenticate(
        &self,
        token: Option<&SessionToken>,
    ) -> Result<UserId, ApplicationError> {
        self.resolve_session(token)
            .await?
            .map(|session| session.user_id)
            .ok_or(ApplicationError::Unauthorized)
    }

    /// 删除当前用户（级联删除消息与会话），随后销毁当前会话。
    pub async fn delete_account(&self, token: Option<&SessionToken>) -> Result<(), ApplicationError> {
        let user_id = self.authenticate(token).await?;
        self.deps
            .user_repository
            .delete(user_id)
            .await
            .map_err(|err| match err {
                RepositoryError::NotFound => ApplicationError::UserNotFound,
                other => ApplicationError::Repository(other),
            })?;
        let removed = self.deps.session_repository.delete_for_user(user_id).await?;
        info!(user_id = %user_id, sessions = removed, "account deleted");
        Ok(())
    }

    /// 条件更新未命中：说明验证码在读取之后被并发请求消费或替换。
    async fn lost_verification_race(
        &self,
        user_id: UserId,
        code: &VerificationCode,
        now: Timestamp,
    ) -> ApplicationError {
        match self.deps.user_repository.find_by_id(user_id).await {
            Ok(Some(mut latest)) => match latest.verify_email(code, now) {
                Err(err) => err.into(),
                Ok(()) => ApplicationError::InvalidCode,
            },
            Ok(None) => ApplicationError::UserNotFound,
            Err(err) => err.into(),
        }
    }

    async fn establish_session(&self, user_id: UserId) -> Result<SessionToken, ApplicationError> {
        let token = SessionToken::generate();
        let session = Session::establish(
            token.key(),
            user_id,
            self.deps.clock.now(),
            self.deps.settings.session_ttl,
        );
        self.deps.session_repository.create(session).await?;
        Ok(token)
    }

    async fn resolve_session(
        &self,
        token: Option<&SessionToken>,
    ) -> Result<Option<Session>, ApplicationError> {
        let Some(token) = token else {
            return Ok(None);
        };
        let key = token.key();
        let Some(session) = self.deps.session_repository.find(&key).await? else {
            return Ok(None);
        };
        if session.is_expired(self.deps.clock.now()) {
            debug!(session = %key, user_id = %session.user_id, "expired session purged");
            self.deps.session_repository.delete(&key).await?;
            return Ok(None);
        }
        Ok(Some(session))
    }
}
