use async_trait::async_trait;
use domain::{UserEmail, VerificationCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("failed to build email: {0}")]
    Build(String),
    #[error("failed to deliver email: {0}")]
    Delivery(String),
}

/// 验证码投递通道（SMTP 或日志）。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VerificationNotifier: Send + Sync {
    async fn send_verification_code(
        &self,
        email: &UserEmail,
        code: &VerificationCode,
    ) -> Result<(), NotifierError>;
}
