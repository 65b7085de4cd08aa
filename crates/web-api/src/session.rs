//! 会话 cookie 的读写。
//!
//! cookie 中保存原始令牌，服务端只保存其摘要。

use application::SessionToken;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use domain::UserId;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Clone)]
pub struct SessionCookieSettings {
    pub name: String,
    pub secure: bool,
    pub max_age: chrono::Duration,
}

impl Default for SessionCookieSettings {
    fn default() -> Self {
        Self {
            name: "messenger.sid".to_string(),
            secure: false,
            max_age: chrono::Duration::days(domain::SESSION_TTL_DAYS),
        }
    }
}

impl SessionCookieSettings {
    pub fn read(&self, jar: &CookieJar) -> Option<SessionToken> {
        jar.get(&self.name)
            .and_then(|cookie| SessionToken::from_cookie(cookie.value()))
    }

    pub fn issue(&self, token: &SessionToken) -> Cookie<'static> {
        Cookie::build((self.name.clone(), token.as_str().to_owned()))
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .secure(self.secure)
            .max_age(time::Duration::seconds(self.max_age.num_seconds()))
            .build()
    }

    pub fn removal(&self) -> Cookie<'static> {
        Cookie::build((self.name.clone(), ""))
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .build()
    }
}

/// 要求请求携带有效会话，返回会话所属用户。
pub async fn require_user(state: &AppState, jar: &CookieJar) -> Result<UserId, ApiError> {
    let token = state.cookies.read(jar);
    Ok(state.auth_service.authenticate(token.as_ref()).await?)
}
