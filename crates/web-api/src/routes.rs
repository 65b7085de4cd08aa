use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use application::services::{
    LoginOutcome, LoginRequest, RegisterUserRequest, UpdateProfileRequest, VerifyEmailRequest,
};
use application::{ProfileDto, UpdatedProfileDto, UserDto, UserSummaryDto};

use crate::{
    error::ApiError,
    extract::{AppJson, AppQuery, CurrentUser},
    state::AppState,
    ws_connection::WebSocketConnection,
};

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    phone: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyPayload {
    #[serde(default)]
    email: String,
    #[serde(default)]
    code: String,
}

#[derive(Debug, Deserialize)]
struct ResendPayload {
    #[serde(default)]
    email: String,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct UpdateProfilePayload {
    name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateMessagePayload {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    take: Option<u32>,
}

/// 路由之外的 HTTP 层设置。
#[derive(Debug, Clone, Default)]
pub struct HttpSettings {
    /// 允许的跨域来源；包含 `*` 时回显请求来源
    pub cors_origins: Vec<String>,
    /// 前端静态资源目录
    pub static_dir: Option<String>,
}

pub fn router(state: AppState, http: HttpSettings) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(register_user))
        .route("/auth/verify", post(verify_email))
        .route("/auth/resend-code", post(resend_code))
        .route("/auth/login", post(login_user))
        .route("/auth/logout", post(logout_user))
        .route("/auth/status", get(auth_status))
        .route("/auth/account", axum::routing::delete(delete_account))
        .route("/me", get(get_profile).patch(update_profile))
        .route("/messages", get(list_messages).post(create_message))
        .route("/ws", get(websocket_upgrade))
        .with_state(state);

    if let Some(dir) = http.static_dir.as_deref() {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(cors_layer(&http.cors_origins))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    // 携带 cookie 的跨域请求不能使用通配来源
    let allow_origin = if origins.is_empty() || origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "ok": true }))
}

async fn register_user(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterPayload>,
) -> Result<Response, ApiError> {
    let user_id = state
        .auth_service
        .register(RegisterUserRequest {
            email: payload.email,
            password: payload.password,
            phone: payload.phone,
            name: payload.name,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "registered, check your email for the verification code",
            "userId": user_id,
        })),
    )
        .into_response())
}

async fn verify_email(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<VerifyPayload>,
) -> Result<Response, ApiError> {
    let session = state
        .auth_service
        .verify(VerifyEmailRequest {
            email: payload.email,
            code: payload.code,
        })
        .await?;

    let jar = jar.add(state.cookies.issue(&session.token));
    Ok((
        jar,
        Json(json!({
            "message": "email verified",
            "user": UserSummaryDto::from(&session.user),
        })),
    )
        .into_response())
}

async fn resend_code(
    State(state): State<AppState>,
    AppJson(payload): AppJson<ResendPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.auth_service.resend_code(payload.email).await?;
    Ok(Json(json!({ "message": "verification code sent" })))
}

async fn login_user(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<LoginPayload>,
) -> Result<Response, ApiError> {
    let outcome = state
        .auth_service
        .login(LoginRequest {
            email: payload.email,
            password: payload.password,
        })
        .await?;

    let jar = jar.add(state.cookies.issue(&outcome.session().token));
    let response = match outcome {
        LoginOutcome::Verified(session) => (
            jar,
            Json(json!({
                "message": "logged in",
                "user": UserSummaryDto::from(&session.user),
            })),
        )
            .into_response(),
        // 未验证的用户也拿到会话 cookie，前端据此跳转到验证页
        LoginOutcome::PendingVerification(session) => (
            jar,
            ApiError::needs_verification(session.user.email.as_str()),
        )
            .into_response(),
    };
    Ok(response)
}

async fn logout_user(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let token = state.cookies.read(&jar);
    state.auth_service.logout(token.as_ref()).await?;
    let jar = jar.remove(state.cookies.removal());
    Ok((jar, Json(json!({ "message": "logged out" }))).into_response())
}

async fn auth_status(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<serde_json::Value>, ApiError> {
    let token = state.cookies.read(&jar);
    let body = match state.auth_service.current_user(token.as_ref()).await? {
        Some(user) => json!({ "authenticated": true, "user": UserDto::from(&user) }),
        None => json!({ "authenticated": false }),
    };
    Ok(Json(body))
}

async fn delete_account(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response, ApiError> {
    let token = state.cookies.read(&jar);
    state.auth_service.delete_account(token.as_ref()).await?;
    let jar = jar.remove(state.cookies.removal());
    Ok((jar, Json(json!({ "message": "account deleted" }))).into_response())
}

async fn get_profile(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Json<ProfileDto>, ApiError> {
    let user = state.profile_service.get_profile(user_id).await?;
    Ok(Json(ProfileDto::from(&user)))
}

async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    AppJson(payload): AppJson<UpdateProfilePayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state
        .profile_service
        .update_profile(
            user_id,
            UpdateProfileRequest {
                name: payload.name,
                username: payload.username,
            },
        )
        .await?;
    let updated = UpdatedProfileDto::from(&user);
    Ok(Json(json!({
        "ok": true,
        "name": updated.name,
        "username": updated.username,
    })))
}

async fn list_messages(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    AppQuery(query): AppQuery<HistoryQuery>,
) -> Result<Json<Vec<application::MessageDto>>, ApiError> {
    let messages = state.message_service.list_recent(query.take).await?;
    Ok(Json(messages))
}

async fn create_message(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    AppJson(payload): AppJson<CreateMessagePayload>,
) -> Result<Response, ApiError> {
    let message = state
        .message_service
        .create_message(user_id, payload.text)
        .await?;
    Ok((StatusCode::CREATED, Json(message)).into_response())
}

/// 握手前校验会话，未登录直接返回 401。
async fn websocket_upgrade(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let max_bytes = state.max_ws_message_bytes;
    Ok(ws
        .max_message_size(max_bytes)
        .max_frame_size(max_bytes)
        .on_upgrade(move |socket| async move {
            WebSocketConnection::new(socket, state, user_id)
                .await
                .run()
                .await;
        }))
}
