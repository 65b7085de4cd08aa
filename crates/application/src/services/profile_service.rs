use std::sync::Arc;

use domain::{DisplayName, RepositoryError, User, UserId, Username};

use crate::{
    clock::Clock,
    error::{ApplicationError, Validator},
    repository::UserRepository,
};

/// `PATCH /me` 的输入。未提供的字段保持不变。
#[derive(Debug, Clone, Default)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub username: Option<String>,
}

pub struct ProfileServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct ProfileService {
    deps: ProfileServiceDependencies,
}

impl ProfileService {
    pub fn new(deps: ProfileServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn get_profile(&self, user_id: UserId) -> Result<User, ApplicationError> {
        self.deps
            .user_repository
            .find_by_id(user_id)
            .await?
            .ok_or(ApplicationError::UserNotFound)
    }

    pub async fn update_profile(
        &self,
        user_id: UserId,
        request: UpdateProfileRequest,
    ) -> Result<User, ApplicationError> {
        let mut validator = Validator::default();
        let name = request
            .name
            .and_then(|raw| validator.check(DisplayName::parse(raw)));
        let username = request
            .username
            .and_then(|raw| validator.check(Username::parse(raw)));
        validator.finish()?;

        if let Some(username) = &username {
            let taken = self
                .deps
                .user_repository
                .find_by_username(username)
                .await?
                .is_some_and(|owner| owner.id != user_id);
            if taken {
                return Err(ApplicationError::UsernameTaken);
            }
        }

        // 只写入提交的字段；并发修改用户名时由存储层的唯一约束兜底
        self.deps
            .user_repository
            .update_profile(
                user_id,
                name.as_ref(),
                username.as_ref(),
                self.deps.clock.now(),
            )
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict { .. } => ApplicationError::UsernameTaken,
                RepositoryError::NotFound => ApplicationError::UserNotFound,
                other => ApplicationError::Repository(other),
            })
    }
}
