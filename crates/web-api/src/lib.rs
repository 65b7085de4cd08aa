//! Web API 层。
//!
//! 提供 Axum 路由，将 HTTP / WebSocket 请求委托给应用层的用例服务。
//! 身份由会话 cookie 确定。

mod error;
mod extract;
mod routes;
mod session;
mod state;
mod ws_connection;

pub use error::{ApiError, ErrorBody};
pub use extract::{AppJson, AppQuery, CurrentUser};
pub use routes::{router, HttpSettings};
pub use session::{require_user, SessionCookieSettings};
pub use state::{AppState, DEFAULT_MAX_WS_MESSAGE_BYTES};
