//! 自定义提取器：请求体与查询参数的解析失败统一返回 400 字段错误，
//! 需要登录的路由先校验会话再读取请求体。

use axum::{
    extract::{FromRequest, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::CookieJar;
use domain::UserId;

use crate::{error::ApiError, session::require_user, state::AppState};

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct AppQuery<T>(pub T);

/// 会话所属用户。放在请求体提取器之前，未登录的请求不会触发请求体解析。
pub struct CurrentUser(pub UserId);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let jar = CookieJar::from_headers(&parts.headers);
        require_user(state, &jar).await.map(CurrentUser)
    }
}
