use domain::{DomainError, RepositoryError};
use serde::Serialize;
use thiserror::Error;

use crate::broadcaster::BroadcastError;
use crate::notifier::NotifierError;
use crate::password::PasswordHasherError;

/// 单个字段的校验失败信息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),
    #[error("email or phone already in use")]
    AccountExists,
    #[error("username already taken")]
    UsernameTaken,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("invalid verification code")]
    InvalidCode,
    #[error("verification code expired")]
    CodeExpired,
    #[error("email already verified")]
    AlreadyVerified,
    #[error("authentication required")]
    Unauthorized,
    /// 已登录但邮箱尚未验证
    #[error("email not verified: {email}")]
    EmailNotVerified { email: String },
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("password error: {0}")]
    Password(#[from] PasswordHasherError),
    #[error("notifier error: {0}")]
    Notifier(#[from] NotifierError),
    #[error("broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),
}

impl ApplicationError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    /// 是否属于需要记录日志并以 500 返回的内部错误。
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            Self::Repository(_) | Self::Password(_) | Self::Notifier(_) | Self::Broadcast(_)
        )
    }
}

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidArgument { field, message } => {
                Self::Validation(vec![FieldError { field, message }])
            }
            DomainError::AlreadyVerified => Self::AlreadyVerified,
            DomainError::InvalidCode => Self::InvalidCode,
            DomainError::CodeExpired => Self::CodeExpired,
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}

/// 收集多个字段的校验结果，统一返回。
#[derive(Debug, Default)]
pub(crate) struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub(crate) fn check<T>(&mut self, result: Result<T, DomainError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(DomainError::InvalidArgument { field, message }) => {
                self.errors.push(FieldError { field, message });
                None
            }
            Err(other) => {
                self.errors.push(FieldError::new("request", other.to_string()));
                None
            }
        }
    }

    pub(crate) fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    pub(crate) fn finish(self) -> Result<(), ApplicationError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApplicationError::Validation(self.errors))
        }
    }
}
