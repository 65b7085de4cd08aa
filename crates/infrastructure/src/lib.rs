//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储、数据库迁移、bcrypt 密码哈希以及验证码邮件投递，
//! 实现应用层定义的接口。

pub mod migrations;
pub mod notifier;
pub mod password;
pub mod repository;

pub use migrations::MIGRATOR;
pub use notifier::{LogNotifier, SmtpNotifier, SmtpSettings, VerificationEmail};
pub use password::BcryptPasswordHasher;
pub use repository::{
    create_pg_pool, PgMessageRepository, PgSessionRepository, PgStorage, PgUserRepository,
};
