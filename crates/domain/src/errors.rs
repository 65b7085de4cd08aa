//! 领域模型错误定义
//!
//! 定义了领域层可能产生的错误类型，提供清晰的错误上下文。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 字段校验失败
    #[error("{field}: {message}")]
    InvalidArgument { field: String, message: String },

    /// 邮箱已经验证过
    #[error("email already verified")]
    AlreadyVerified,

    /// 验证码不匹配
    #[error("invalid verification code")]
    InvalidCode,

    /// 验证码已过期
    #[error("verification code expired")]
    CodeExpired,
}

impl DomainError {
    /// 创建字段校验错误
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 仓储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,

    /// 唯一约束冲突，`constraint` 为触发冲突的字段
    #[error("unique constraint violated: {constraint}")]
    Conflict { constraint: String },

    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn conflict(constraint: impl Into<String>) -> Self {
        Self::Conflict {
            constraint: constraint.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}
