use application::{ApplicationError, FieldError};
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ErrorBody {
    /// 字段级校验错误列表
    Fields { errors: Vec<FieldError> },
    /// 已登录但邮箱未验证
    #[serde(rename_all = "camelCase")]
    NeedsVerification {
        error: String,
        needs_verification: bool,
        email: String,
    },
    Message { error: String },
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody::Message {
                error: message.into(),
            },
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "authentication required")
    }

    pub fn needs_verification(email: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            body: ErrorBody::NeedsVerification {
                error: "email not verified".to_string(),
                needs_verification: true,
                email: email.into(),
            },
        }
    }

    /// 无法解析的请求体或查询参数，以字段错误的形式返回
    pub fn malformed(field: &str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody::Fields {
                errors: vec![FieldError::new(field, message)],
            },
        }
    }

    pub fn internal_server_error() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        use application::ApplicationError as AppErr;

        match error {
            AppErr::Validation(errors) => Self {
                status: StatusCode::BAD_REQUEST,
                body: ErrorBody::Fields { errors },
            },
            AppErr::AccountExists => {
                ApiError::new(StatusCode::BAD_REQUEST, "email or phone already in use")
            }
            AppErr::UsernameTaken => ApiError::new(StatusCode::CONFLICT, "username already taken"),
            AppErr::UserNotFound => ApiError::new(StatusCode::NOT_FOUND, "user not found"),
            AppErr::InvalidCredentials => {
                ApiError::new(StatusCode::UNAUTHORIZED, "invalid email or password")
            }
            AppErr::InvalidCode => {
                ApiError::new(StatusCode::BAD_REQUEST, "invalid verification code")
            }
            AppErr::CodeExpired => {
                ApiError::new(StatusCode::BAD_REQUEST, "verification code expired")
            }
            AppErr::AlreadyVerified => {
                ApiError::new(StatusCode::BAD_REQUEST, "email already verified")
            }
            AppErr::Unauthorized => ApiError::unauthorized(),
            AppErr::EmailNotVerified { email } => ApiError::needs_verification(email),
            internal @ (AppErr::Repository(_)
            | AppErr::Password(_)
            | AppErr::Notifier(_)
            | AppErr::Broadcast(_)) => {
                // 细节只写日志，不返回给客户端
                tracing::error!(error = %internal, "request failed with internal error");
                ApiError::internal_server_error()
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::malformed("body", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::malformed("query", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
