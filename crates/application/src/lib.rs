//! 应用层实现。
//!
//! 这里提供围绕领域模型的用例服务（注册验证、会话、资料、消息），
//! 以及对外部适配器（存储、密码哈希、验证码投递、实时推送）的抽象。

pub mod broadcaster;
pub mod clock;
pub mod code;
pub mod dto;
pub mod error;
pub mod memory;
pub mod notifier;
pub mod password;
pub mod registry;
pub mod repository;
pub mod services;
pub mod token;

pub use broadcaster::{BroadcastError, ConnectionId, MessageBroadcaster, ServerEvent};
pub use clock::{Clock, MonotonicClock, SystemClock};
pub use code::{CodeGenerator, RandomCodeGenerator};
pub use dto::{MessageDto, ProfileDto, UpdatedProfileDto, UserDto, UserSummaryDto};
pub use error::{ApplicationError, FieldError};
pub use memory::InMemoryStore;
#[cfg(any(test, feature = "test-support"))]
pub use memory::RecordingNotifier;
pub use notifier::{NotifierError, VerificationNotifier};
pub use password::{PasswordHasher, PasswordHasherError, MIN_PASSWORD_CHARS};
pub use registry::{ConnectionRegistry, Subscription};
pub use repository::{MessageRepository, SessionRepository, UserRepository};
pub use services::{
    AuthService, AuthServiceDependencies, AuthSettings, AuthenticatedSession, LoginOutcome,
    LoginRequest, MessageService, MessageServiceDependencies, ProfileService,
    ProfileServiceDependencies, RegisterUserRequest, UpdateProfileRequest, VerifyEmailRequest,
};
pub use token::SessionToken;
