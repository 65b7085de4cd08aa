use application::{ConnectionId, MessageBroadcaster, Subscription};
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::UserId;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::state::AppState;

/// 客户端发来的帧：`{"event": "...", "data": ...}`。
#[derive(Debug, Deserialize)]
struct ClientFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// WebSocket 连接管理器
///
/// 封装单个实时通道：注册到连接表、转发服务端事件、
/// 中继客户端的 typing 信号，断开时注销。
pub struct WebSocketConnection {
    socket: WebSocket,
    state: AppState,
    user_id: UserId,
    subscription: Subscription,
}

impl WebSocketConnection {
    pub async fn new(socket: WebSocket, state: AppState, user_id: UserId) -> Self {
        let subscription = state.registry.register(user_id).await;
        Self {
            socket,
            state,
            user_id,
            subscription,
        }
    }

    /// 运行连接主循环，直到任一方向结束。
    pub async fn run(self) {
        let Self {
            socket,
            state,
            user_id,
            subscription,
        } = self;
        let Subscription {
            connection_id,
            mut events,
        } = subscription;

        let (mut sender, mut incoming) = socket.split();

        // 所有写操作都经由命令通道，避免多个任务同时持有 sender
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        let mut send_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(cmd) = cmd_rx.recv() => {
                        let frame = match cmd {
                            WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                        };
                        if sender.send(frame).await.is_err() {
                            tracing::debug!(connection_id = %connection_id, "socket write failed");
                            break;
                        }
                    }
                    Some(event) = events.recv() => {
                        let payload = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(err) => {
                                tracing::warn!(error = %err, "failed to serialize server event");
                                continue;
                            }
                        };
                        if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                            tracing::debug!(connection_id = %connection_id, "socket write failed");
                            break;
                        }
                    }
                    else => break,
                }
            }
        });

        let recv_state = state.clone();
        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(message)) = incoming.next().await {
                if Self::handle_incoming(&recv_state, connection_id, message, &cmd_tx)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        // 任一方向结束即关闭另一方向
        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }

        state.registry.unregister(connection_id).await;
        tracing::debug!(user_id = %user_id, connection_id = %connection_id, "websocket loop finished");
    }

    async fn handle_incoming(
        state: &AppState,
        connection_id: ConnectionId,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Close(_) => return Err(()),
            WsMessage::Ping(data) => {
                if cmd_tx
                    .send(WsCommand::SendPong(data.to_vec()))
                    .await
                    .is_err()
                {
                    return Err(());
                }
            }
            WsMessage::Pong(_) => {}
            WsMessage::Text(text) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
                Ok(frame) if frame.event == "typing" => {
                    if let Err(err) = state
                        .registry
                        .broadcast_typing(connection_id, frame.data)
                        .await
                    {
                        tracing::warn!(connection_id = %connection_id, error = %err, "failed to relay typing");
                    }
                }
                Ok(frame) => {
                    tracing::debug!(connection_id = %connection_id, event = %frame.event, "unknown client event ignored");
                }
                Err(err) => {
                    tracing::debug!(connection_id = %connection_id, error = %err, "malformed client frame ignored");
                }
            },
            WsMessage::Binary(_) => {
                tracing::debug!(connection_id = %connection_id, "binary frame ignored");
            }
        }
        Ok(())
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}
