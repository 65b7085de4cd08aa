mod auth_service;
mod message_service;
mod profile_service;

#[cfg(test)]
pub(crate) mod test_support;

pub use auth_service::{
    AuthService, AuthServiceDependencies, AuthSettings, AuthenticatedSession, LoginOutcome,
    LoginRequest, RegisterUserRequest, VerifyEmailRequest,
};
pub use message_service::{
    MessageService, MessageServiceDependencies, DEFAULT_HISTORY_TAKE, MAX_HISTORY_TAKE,
};
pub use profile_service::{ProfileService, ProfileServiceDependencies, UpdateProfileRequest};
