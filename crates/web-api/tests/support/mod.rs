#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use application::{
    services::{
        AuthService, AuthServiceDependencies, AuthSettings, MessageService,
        MessageServiceDependencies, ProfileService, ProfileServiceDependencies,
    },
    ConnectionRegistry, InMemoryStore, MonotonicClock, PasswordHasher, PasswordHasherError,
    RandomCodeGenerator, RecordingNotifier, SystemClock,
};
use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use domain::PasswordHash;
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::oneshot};
use tower::ServiceExt;
use web_api::{router, AppState, HttpSettings, SessionCookieSettings};

pub const COOKIE_NAME: &str = "messenger.sid";
pub const PASSWORD: &str = "secret1";

/// 测试用密码哈希：不做真正的哈希，只加前缀。
pub struct PlainHasher;

#[async_trait::async_trait]
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

pub struct TestApp {
    pub router: Router,
    pub store: InMemoryStore,
    pub notifier: RecordingNotifier,
    pub registry: ConnectionRegistry,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// 响应中设置的会话 cookie（`name=value`）。
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|value| value.split(';').next())
            .find(|pair| pair.starts_with(&format!("{COOKIE_NAME}=")))
            .map(str::to_owned)
    }

    pub fn set_cookie_header(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    }
}

impl TestApp {
    pub fn new() -> Self {
        let store = InMemoryStore::new();
        let notifier = RecordingNotifier::new();
        let registry = ConnectionRegistry::new();

        let auth_service = AuthService::new(AuthServiceDependencies {
            user_repository: Arc::new(store.clone()),
            session_repository: Arc::new(store.clone()),
            password_hasher: Arc::new(PlainHasher),
            notifier: Arc::new(notifier.clone()),
            code_generator: Arc::new(RandomCodeGenerator),
            clock: Arc::new(SystemClock),
            settings: AuthSettings::default(),
        });
        let profile_service = ProfileService::new(ProfileServiceDependencies {
            user_repository: Arc::new(store.clone()),
            clock: Arc::new(SystemClock),
        });
        let message_service = MessageService::new(MessageServiceDependencies {
            user_repository: Arc::new(store.clone()),
            message_repository: Arc::new(store.clone()),
            broadcaster: Arc::new(registry.clone()),
            clock: Arc::new(MonotonicClock::default()),
        });

        let state = AppState::new(
            Arc::new(auth_service),
            Arc::new(profile_service),
            Arc::new(message_service),
            registry.clone(),
            SessionCookieSettings::default(),
        );
        let router = router(
            state,
            HttpSettings {
                cors_origins: vec!["*".to_string()],
                static_dir: None,
            },
        );

        Self {
            router,
            store,
            notifier,
            registry,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        cookie: Option<&str>,
    ) -> TestResponse {
        match body {
            Some(body) => {
                self.raw(method, uri, Some("application/json"), body.to_string(), cookie)
                    .await
            }
            None => self.raw(method, uri, None, String::new(), cookie).await,
        }
    }

    /// 原样发送请求体，用于构造无法解析的输入。
    pub async fn raw(
        &self,
        method: Method,
        uri: &str,
        content_type: Option<&str>,
        body: String,
        cookie: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        let request = builder.body(Body::from(body)).unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn post(&self, uri: &str, body: Value, cookie: Option<&str>) -> TestResponse {
        self.request(Method::POST, uri, Some(body), cookie).await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, None, cookie).await
    }

    pub async fn register(&self, email: &str) -> TestResponse {
        self.post(
            "/auth/register",
            json!({ "email": email, "password": PASSWORD }),
            None,
        )
        .await
    }

    pub async fn last_code(&self, email: &str) -> String {
        self.notifier
            .last_code_for(email)
            .await
            .expect("verification code sent")
            .as_str()
            .to_owned()
    }

    /// 注册并验证邮箱，返回会话 cookie。
    pub async fn verified_user(&self, email: &str) -> String {
        let registered = self.register(email).await;
        assert_eq!(registered.status, StatusCode::CREATED);
        let code = self.last_code(email).await;
        let verified = self
            .post("/auth/verify", json!({ "email": email, "code": code }), None)
            .await;
        assert_eq!(verified.status, StatusCode::OK);
        verified.session_cookie().expect("session cookie")
    }

    /// 在真实端口上启动服务，返回地址和关闭信号。
    pub async fn spawn(&self) -> (SocketAddr, oneshot::Sender<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let router = self.router.clone();

        tokio::spawn(async move {
            axum::serve(listener, router.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        (addr, shutdown_tx)
    }
}
