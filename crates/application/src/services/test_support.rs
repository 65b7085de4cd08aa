//! 服务测试共用的替身实现。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use domain::{PasswordHash, Timestamp, UserId, VerificationCode};

use crate::broadcaster::MessageBroadcaster;
use crate::clock::{Clock, MonotonicClock};
use crate::code::CodeGenerator;
use crate::memory::{InMemoryStore, RecordingNotifier};
use crate::notifier::VerificationNotifier;
use crate::password::{PasswordHasher, PasswordHasherError};
use crate::registry::ConnectionRegistry;
use crate::services::{
    AuthService, AuthServiceDependencies, AuthSettings, LoginRequest, MessageService,
    MessageServiceDependencies, ProfileService, ProfileServiceDependencies, RegisterUserRequest,
    VerifyEmailRequest,
};
use crate::token::SessionToken;

/// 不做哈希的密码替身，加前缀以区分原文。
pub(crate) struct PlainHasher;

#[async_trait]
impl PasswordHasher for PlainHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        PasswordHash::new(format!("plain:{plaintext}"))
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError> {
        Ok(hashed.as_str() == format!("plain:{plaintext}"))
    }
}

/// 按顺序返回预设验证码，用完后固定返回 999999。
pub(crate) struct FixedCodes(Mutex<VecDeque<&'static str>>);

impl FixedCodes {
    pub(crate) fn new(codes: &[&'static str]) -> Self {
        Self(Mutex::new(codes.iter().copied().collect()))
    }
}

impl CodeGenerator for FixedCodes {
    fn generate(&self) -> VerificationCode {
        let next = self.0.lock().unwrap().pop_front().unwrap_or("999999");
        VerificationCode::parse(next).unwrap()
    }
}

/// 手动推进的时钟。
#[derive(Clone)]
pub(crate) struct ManualClock(Arc<Mutex<Timestamp>>);

impl ManualClock {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Mutex::new(Utc::now())))
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.0.lock().unwrap()
    }
}

pub(crate) struct Harness {
    pub store: InMemoryStore,
    pub notifier: RecordingNotifier,
    pub clock: ManualClock,
    pub registry: ConnectionRegistry,
    pub auth: AuthService,
    pub profiles: ProfileService,
    pub messages: MessageService,
}

impl Harness {
    pub(crate) fn new(codes: &[&'static str]) -> Self {
        let notifier = RecordingNotifier::new();
        let registry = ConnectionRegistry::new();
        Self::build(
            codes,
            Arc::new(notifier.clone()),
            Arc::new(registry.clone()),
            notifier,
            registry,
        )
    }

    pub(crate) fn with_notifier(
        codes: &[&'static str],
        notifier: Arc<dyn VerificationNotifier>,
    ) -> Self {
        let registry = ConnectionRegistry::new();
        Self::build(
            codes,
            notifier,
            Arc::new(registry.clone()),
            RecordingNotifier::new(),
            registry,
        )
    }

    pub(crate) fn with_broadcaster(broadcaster: Arc<dyn MessageBroadcaster>) -> Self {
        let notifier = RecordingNotifier::new();
        Self::build(
            &[],
            Arc::new(notifier.clone()),
            broadcaster,
            notifier,
            ConnectionRegistry::new(),
        )
    }

    fn build(
        codes: &[&'static str],
        notifier: Arc<dyn VerificationNotifier>,
        broadcaster: Arc<dyn MessageBroadcaster>,
        recording: RecordingNotifier,
        registry: ConnectionRegistry,
    ) -> Self {
        let store = InMemoryStore::new();
        let clock = ManualClock::new();
        let auth = AuthService::new(AuthServiceDependencies {
            user_repository: Arc::new(store.clone()),
            session_repository: Arc::new(store.clone()),
            password_hasher: Arc::new(PlainHasher),
            notifier,
            code_generator: Arc::new(FixedCodes::new(codes)),
            clock: Arc::new(clock.clone()),
            settings: AuthSettings::default(),
        });
        let profiles = ProfileService::new(ProfileServiceDependencies {
            user_repository: Arc::new(store.clone()),
            clock: Arc::new(clock.clone()),
        });
        let messages = MessageService::new(MessageServiceDependencies {
            user_repository: Arc::new(store.clone()),
            message_repository: Arc::new(store.clone()),
            broadcaster,
            clock: Arc::new(MonotonicClock::new(clock.clone())),
        });
        Self {
            store,
            notifier: recording,
            clock,
            registry,
            auth,
            profiles,
            messages,
        }
    }

    pub(crate) fn register_request(email: &str) -> RegisterUserRequest {
        RegisterUserRequest {
            email: email.to_owned(),
            password: "secret1".to_owned(),
            phone: None,
            name: None,
        }
    }

    /// 注册、验证并登录，返回用户 id 和会话令牌。
    pub(crate) async fn verified_user(&self, email: &str) -> (UserId, SessionToken) {
        let user_id = self
            .auth
            .register(Self::register_request(email))
            .await
            .unwrap();
        let code = self.notifier.last_code_for(email).await.unwrap();
        let session = self
            .auth
            .verify(VerifyEmailRequest {
                email: email.to_owned(),
                code: code.as_str().to_owned(),
            })
            .await
            .unwrap();
        assert_eq!(session.user.id, user_id);
        (user_id, session.token)
    }

    /// 注册但不验证，登录后返回会话令牌。
    pub(crate) async fn unverified_user(&self, email: &str) -> (UserId, SessionToken) {
        let user_id = self
            .auth
            .register(Self::register_request(email))
            .await
            .unwrap();
        let outcome = self
            .auth
            .login(LoginRequest {
                email: email.to_owned(),
                password: "secret1".to_owned(),
            })
            .await
            .unwrap();
        (user_id, outcome.session().token.clone())
    }
}
