//! 主应用程序入口
//!
//! 读取配置，准备存储（PostgreSQL 并执行迁移，或进程内存储），
//! 组装各层服务后启动 Axum Web API。

use std::sync::Arc;

use application::{
    services::{
        AuthService, AuthServiceDependencies, AuthSettings, MessageService,
        MessageServiceDependencies, ProfileService, ProfileServiceDependencies,
    },
    ConnectionRegistry, InMemoryStore, MessageRepository, MonotonicClock, RandomCodeGenerator,
    SessionRepository, SystemClock, UserRepository, VerificationNotifier,
};
use config::{AppConfig, EmailProvider, StorageBackend};
use infrastructure::{
    create_pg_pool, BcryptPasswordHasher, LogNotifier, PgStorage, SmtpNotifier, SmtpSettings,
    MIGRATOR,
};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, HttpSettings, SessionCookieSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 文件可选
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;
    tracing::info!(config = %config.sanitize(), "configuration loaded");

    let storage = open_storage(&config).await?;

    let notifier = build_notifier(&config)?;
    let password_hasher = Arc::new(BcryptPasswordHasher::new(config.password.bcrypt_cost));
    let registry = ConnectionRegistry::new();
    let clock = Arc::new(SystemClock);

    let auth_settings = AuthSettings {
        code_ttl: chrono::Duration::minutes(config.verification.code_ttl_minutes),
        session_ttl: chrono::Duration::days(config.session.ttl_days),
    };

    let auth_service = AuthService::new(AuthServiceDependencies {
        user_repository: storage.user_repository.clone(),
        session_repository: storage.session_repository.clone(),
        password_hasher,
        notifier,
        code_generator: Arc::new(RandomCodeGenerator),
        clock: clock.clone(),
        settings: auth_settings,
    });

    let profile_service = ProfileService::new(ProfileServiceDependencies {
        user_repository: storage.user_repository.clone(),
        clock,
    });

    let message_service = MessageService::new(MessageServiceDependencies {
        user_repository: storage.user_repository.clone(),
        message_repository: storage.message_repository.clone(),
        broadcaster: Arc::new(registry.clone()),
        clock: Arc::new(MonotonicClock::default()),
    });

    let state = AppState::new(
        Arc::new(auth_service),
        Arc::new(profile_service),
        Arc::new(message_service),
        registry,
        SessionCookieSettings {
            name: config.session.cookie_name.clone(),
            secure: config.session.secure_cookie,
            max_age: auth_settings.session_ttl,
        },
    )
    .with_max_ws_message_bytes(config.realtime.max_message_bytes);

    let app = router(
        state,
        HttpSettings {
            cors_origins: config.server.cors_origins.clone(),
            static_dir: config.server.static_dir.clone(),
        },
    );

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "messenger server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

/// 三个仓储共享同一个后端
struct Storage {
    user_repository: Arc<dyn UserRepository>,
    message_repository: Arc<dyn MessageRepository>,
    session_repository: Arc<dyn SessionRepository>,
}

async fn open_storage(config: &AppConfig) -> anyhow::Result<Storage> {
    let storage = match config.database.backend {
        StorageBackend::Postgres => {
            let pg_pool =
                create_pg_pool(&config.database.url, config.database.max_connections).await?;
            MIGRATOR.run(&pg_pool).await?;
            let pg = PgStorage::new(pg_pool);
            Storage {
                user_repository: pg.user_repository,
                message_repository: pg.message_repository,
                session_repository: pg.session_repository,
            }
        }
        StorageBackend::Memory => {
            tracing::warn!("storage backend is `memory`, all data is lost on restart");
            let store = InMemoryStore::new();
            Storage {
                user_repository: Arc::new(store.clone()),
                message_repository: Arc::new(store.clone()),
                session_repository: Arc::new(store),
            }
        }
    };
    Ok(storage)
}

fn build_notifier(config: &AppConfig) -> anyhow::Result<Arc<dyn VerificationNotifier>> {
    let notifier: Arc<dyn VerificationNotifier> = match config.email.provider {
        EmailProvider::Log => {
            tracing::warn!("email provider is `log`, verification codes are written to the log");
            Arc::new(LogNotifier)
        }
        EmailProvider::Smtp => {
            let smtp = &config.email.smtp;
            Arc::new(SmtpNotifier::new(
                SmtpSettings {
                    host: smtp.host.clone(),
                    port: smtp.port,
                    username: smtp.username.clone(),
                    password: smtp.password.clone(),
                    use_tls: smtp.use_tls,
                },
                &config.email.from_address,
                config.email.from_name.as_deref(),
                config.verification.code_ttl_minutes,
            )?)
        }
    };
    Ok(notifier)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutdown signal received");
}
