//! 并发一致性测试
//!
//! 验证在多线程并发下唯一约束、消息时间戳以及邮箱验证状态的一致性。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use application::{
    ApplicationError, AuthService, AuthServiceDependencies, AuthSettings, ConnectionRegistry,
    InMemoryStore, MessageService, MessageServiceDependencies, MonotonicClock, NotifierError,
    PasswordHasher, PasswordHasherError, ProfileService, ProfileServiceDependencies,
    RandomCodeGenerator, RegisterUserRequest, SystemClock, UpdateProfileRequest,
    UserRepository, VerificationNotifier, VerifyEmailRequest,
};
use async_trait::async_trait;
use domain::{
    DisplayName, PasswordHash, PendingVerification, PhoneNumber, RepositoryError, Timestamp,
    User, UserEmail, UserId, Username, VerificationCode,
};
use tokio::sync::{Mutex, Notify};

struct ReversingHasher;

#[async_trait]
impl PasswordHasher for ReversingHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        PasswordHash::new(plaintext.chars().rev().collect::<String>())
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError> {
        Ok(plaintext.chars().rev().collect::<String>() == hashed.as_str())
    }
}

/// 记下每个邮箱最近收到的验证码
#[derive(Clone, Default)]
struct CapturingNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl CapturingNotifier {
    async fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code.clone())
    }

    async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl VerificationNotifier for CapturingNotifier {
    async fn send_verification_code(
        &self,
        email: &UserEmail,
        code: &VerificationCode,
    ) -> Result<(), NotifierError> {
        self.sent
            .lock()
            .await
            .push((email.as_str().to_string(), code.to_string()));
        Ok(())
    }
}

/// 在读取之后挂起一次调用，用来确定性地制造“读到旧快照”的交错。
#[derive(Default)]
struct Gate {
    armed: AtomicBool,
    parked: Notify,
    release: Notify,
}

impl Gate {
    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    async fn pass(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.parked.notify_one();
            self.release.notified().await;
        }
    }
}

/// 包装内存存储：按邮箱或用户名查找后经过闸门
struct GatedUsers {
    inner: InMemoryStore,
    gate: Arc<Gate>,
}

#[async_trait]
impl UserRepository for GatedUsers {
    async fn create(&self, user: User) -> Result<User, RepositoryError> {
        self.inner.create(user).await
    }

    async fn confirm_email(
        &self,
        id: UserId,
        code: &VerificationCode,
        now: Timestamp,
    ) -> Result<Option<User>, RepositoryError> {
        self.inner.confirm_email(id, code, now).await
    }

    async fn replace_pending_code(
        &self,
        id: UserId,
        pending: &PendingVerification,
        now: Timestamp,
    ) -> Result<Option<User>, RepositoryError> {
        self.inner.replace_pending_code(id, pending, now).await
    }

    async fn update_profile(
        &self,
        id: UserId,
        name: Option<&DisplayName>,
        username: Option<&Username>,
        now: Timestamp,
    ) -> Result<User, RepositoryError> {
        self.inner.update_profile(id, name, username, now).await
    }

    async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        UserRepository::delete(&self.inner, id).await
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_email(&self, email: &UserEmail) -> Result<Option<User>, RepositoryError> {
        let found = self.inner.find_by_email(email).await;
        self.gate.pass().await;
        found
    }

    async fn find_by_phone(&self, phone: &PhoneNumber) -> Result<Option<User>, RepositoryError> {
        self.inner.find_by_phone(phone).await
    }

    async fn find_by_username(
        &self,
        username: &Username,
    ) -> Result<Option<User>, RepositoryError> {
        let found = self.inner.find_by_username(username).await;
        self.gate.pass().await;
        found
    }
}

/// 测试辅助结构：封装测试服务
struct TestServices {
    store: InMemoryStore,
    gate: Arc<Gate>,
    notifier: CapturingNotifier,
    auth: Arc<AuthService>,
    profiles: Arc<ProfileService>,
    messages: Arc<MessageService>,
}

impl TestServices {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let gate = Arc::new(Gate::default());
        let users: Arc<dyn UserRepository> = Arc::new(GatedUsers {
            inner: store.clone(),
            gate: gate.clone(),
        });
        let notifier = CapturingNotifier::default();
        let auth = AuthService::new(AuthServiceDependencies {
            user_repository: users.clone(),
            session_repository: Arc::new(store.clone()),
            password_hasher: Arc::new(ReversingHasher),
            notifier: Arc::new(notifier.clone()),
            code_generator: Arc::new(RandomCodeGenerator),
            clock: Arc::new(SystemClock),
            settings: AuthSettings::default(),
        });
        let profiles = ProfileService::new(ProfileServiceDependencies {
            user_repository: users.clone(),
            clock: Arc::new(SystemClock),
        });
        let messages = MessageService::new(MessageServiceDependencies {
            user_repository: users,
            message_repository: Arc::new(store.clone()),
            broadcaster: Arc::new(ConnectionRegistry::new()),
            clock: Arc::new(MonotonicClock::default()),
        });
        Self {
            store,
            gate,
            notifier,
            auth: Arc::new(auth),
            profiles: Arc::new(profiles),
            messages: Arc::new(messages),
        }
    }

    async fn registered(&self, email: &str) -> (UserId, VerifyEmailRequest) {
        let user_id = self.auth.register(request(email)).await.unwrap();
        let code = self.notifier.last_code_for(email).await.unwrap();
        (
            user_id,
            VerifyEmailRequest {
                email: email.to_string(),
                code,
            },
        )
    }

    async fn stored(&self, user_id: UserId) -> User {
        self.store.find_by_id(user_id).await.unwrap().unwrap()
    }
}

fn request(email: &str) -> RegisterUserRequest {
    RegisterUserRequest {
        email: email.to_string(),
        password: "secret1".to_string(),
        phone: None,
        name: None,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_with_same_email() {
    let services = TestServices::new();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let auth = services.auth.clone();
            tokio::spawn(async move { auth.register(request("same@x.com")).await })
        })
        .collect();

    let mut succeeded = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(ApplicationError::AccountExists) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(conflicts, 15);
    assert_eq!(services.notifier.sent_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_messages_get_distinct_ordered_timestamps() {
    let services = TestServices::new();
    let user_id = services.auth.register(request("a@x.com")).await.unwrap();
    let code = services.notifier.last_code_for("a@x.com").await.unwrap();
    services
        .auth
        .verify(VerifyEmailRequest {
            email: "a@x.com".to_string(),
            code,
        })
        .await
        .unwrap();

    let tasks: Vec<_> = (0..100)
        .map(|i| {
            let messages = services.messages.clone();
            tokio::spawn(async move { messages.create_message(user_id, format!("m{i}")).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let history = services.messages.list_recent(Some(200)).await.unwrap();
    assert_eq!(history.len(), 100);
    assert!(history
        .windows(2)
        .all(|pair| pair[0].created_at < pair[1].created_at));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_code_verified_concurrently_succeeds_once() {
    let services = TestServices::new();
    let (user_id, verify) = services.registered("a@x.com").await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let auth = services.auth.clone();
            let request = VerifyEmailRequest {
                email: verify.email.clone(),
                code: verify.code.clone(),
            };
            tokio::spawn(async move { auth.verify(request).await })
        })
        .collect();

    let mut succeeded = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(ApplicationError::AlreadyVerified) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(succeeded, 1);
    let user = services.stored(user_id).await;
    assert!(user.email_verified);
    assert!(user.pending_verification.is_none());
}

#[tokio::test]
async fn test_verify_that_read_before_another_verify_reports_already_verified() {
    let services = TestServices::new();
    let (_, verify) = services.registered("a@x.com").await;

    services.gate.arm();
    let stale = {
        let auth = services.auth.clone();
        let request = VerifyEmailRequest {
            email: verify.email.clone(),
            code: verify.code.clone(),
        };
        tokio::spawn(async move { auth.verify(request).await })
    };
    services.gate.parked.notified().await;

    services.auth.verify(verify).await.unwrap();
    services.gate.release.notify_one();

    assert!(matches!(
        stale.await.unwrap(),
        Err(ApplicationError::AlreadyVerified)
    ));
}

#[tokio::test]
async fn test_resend_holding_stale_snapshot_does_not_undo_verification() {
    let services = TestServices::new();
    let (user_id, verify) = services.registered("a@x.com").await;

    services.gate.arm();
    let resend = {
        let auth = services.auth.clone();
        tokio::spawn(async move { auth.resend_code("a@x.com".to_string()).await })
    };
    services.gate.parked.notified().await;

    services.auth.verify(verify).await.unwrap();
    services.gate.release.notify_one();

    assert!(matches!(
        resend.await.unwrap(),
        Err(ApplicationError::AlreadyVerified)
    ));
    let user = services.stored(user_id).await;
    assert!(user.email_verified);
    assert!(user.pending_verification.is_none());
}

#[tokio::test]
async fn test_profile_update_overlapping_verification_keeps_it() {
    let services = TestServices::new();
    let (user_id, verify) = services.registered("a@x.com").await;

    services.gate.arm();
    let update = {
        let profiles = services.profiles.clone();
        tokio::spawn(async move {
            profiles
                .update_profile(
                    user_id,
                    UpdateProfileRequest {
                        name: Some("Alice".to_string()),
                        username: Some("alice".to_string()),
                    },
                )
                .await
        })
    };
    services.gate.parked.notified().await;

    services.auth.verify(verify).await.unwrap();
    services.gate.release.notify_one();

    let updated = update.await.unwrap().unwrap();
    assert!(updated.email_verified);
    let user = services.stored(user_id).await;
    assert!(user.email_verified);
    assert!(user.pending_verification.is_none());
    assert_eq!(user.username.as_ref().map(|u| u.as_str()), Some("alice"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_verify_and_resend_leave_consistent_state() {
    let services = TestServices::new();
    for i in 0..20 {
        let email = format!("u{i}@x.com");
        let (user_id, verify) = services.registered(&email).await;

        let auth = services.auth.clone();
        let verifying = tokio::spawn(async move { auth.verify(verify).await });
        let auth = services.auth.clone();
        let resending = tokio::spawn(async move { auth.resend_code(email).await });

        let verified = verifying.await.unwrap();
        let _ = resending.await.unwrap();

        let user = services.stored(user_id).await;
        if verified.is_ok() {
            assert!(user.email_verified);
        }
        // 已验证与待验证码互斥
        assert_ne!(user.email_verified, user.pending_verification.is_some());
    }
}
