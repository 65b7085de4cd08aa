use std::sync::Arc;

use application::{AuthService, ConnectionRegistry, MessageService, ProfileService};

use crate::session::SessionCookieSettings;

/// 单个 WebSocket 入站帧的默认上限（字节）。
pub const DEFAULT_MAX_WS_MESSAGE_BYTES: usize = 16 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub profile_service: Arc<ProfileService>,
    pub message_service: Arc<MessageService>,
    pub registry: ConnectionRegistry,
    pub cookies: SessionCookieSettings,
    pub max_ws_message_bytes: usize,
}

impl AppState {
    pub fn new(
        auth_service: Arc<AuthService>,
        profile_service: Arc<ProfileService>,
        message_service: Arc<MessageService>,
        registry: ConnectionRegistry,
        cookies: SessionCookieSettings,
    ) -> Self {
        Self {
            auth_service,
            profile_service,
            message_service,
            registry,
            cookies,
            max_ws_message_bytes: DEFAULT_MAX_WS_MESSAGE_BYTES,
        }
    }

    pub fn with_max_ws_message_bytes(mut self, bytes: usize) -> Self {
        self.max_ws_message_bytes = bytes;
        self
    }
}
