use application::ConnectionHandle;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ClientEvent, ServerEvent, UserId};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};

use crate::state::AppState;

/// WebSocket 连接
///
/// 每个连接由两部分组成：
/// - 发送任务：合并本连接的私有事件队列和全局在线状态广播，统一写入 socket
/// - 接收循环：按顺序解析并处理客户端事件
///
/// 连接断开后从在线状态表中注销。
pub struct WebSocketConnection {
    state: AppState,
    user_id: UserId,
}

impl WebSocketConnection {
    pub fn new(state: AppState, user_id: UserId) -> Self {
        Self { state, user_id }
    }

    pub async fn run(self, socket: WebSocket) {
        let user_id = self.user_id;
        let (handle, mut outbound) = ConnectionHandle::channel();
        let connection_id = handle.id();

        // 先订阅再注册，保证能收到自己的上线事件
        let mut presence_events = self.state.broadcaster.subscribe();

        if let Err(err) = self
            .state
            .chat_service
            .connect(user_id, handle.clone())
            .await
        {
            tracing::error!(user_id = %user_id, error = %err, "注册在线状态失败，关闭连接");
            return;
        }
        tracing::info!(user_id = %user_id, connection_id = %connection_id, "WebSocket 连接已建立");

        let (mut sender, mut incoming) = socket.split();

        // 创建 mpsc channel 来解耦对 sender 的访问
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        // 发送任务：统一处理所有对 WebSocket sender 的写操作
        let mut send_task = tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendPong(data) => WsMessage::Pong(data.into()),
                    },
                    Some(event) = outbound.recv() => match encode(&event) {
                        Some(frame) => frame,
                        None => continue,
                    },
                    result = presence_events.recv() => match result {
                        Ok(event) => match encode(&event) {
                            Some(frame) => frame,
                            None => continue,
                        },
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(user_id = %user_id, skipped, "在线状态事件积压，已跳过");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    else => break,
                };
                if sender.send(frame).await.is_err() {
                    tracing::debug!(user_id = %user_id, "写入 socket 失败");
                    break;
                }
            }
            tracing::debug!(user_id = %user_id, "WebSocket发送任务结束");
        });

        // 接收循环：同一连接的事件按顺序处理
        loop {
            tokio::select! {
                message = incoming.next() => {
                    let Some(Ok(message)) = message else { break };
                    if !self.handle_incoming(message, &handle, &cmd_tx).await {
                        break;
                    }
                }
                _ = &mut send_task => break,
            }
        }

        send_task.abort();
        self.state
            .chat_service
            .disconnect(user_id, connection_id)
            .await;
        tracing::info!(user_id = %user_id, connection_id = %connection_id, "WebSocket连接已断开，在线状态已清理");
    }

    /// 处理一帧客户端消息，返回 false 表示连接应当关闭
    async fn handle_incoming(
        &self,
        message: WsMessage,
        handle: &ConnectionHandle,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> bool {
        match message {
            WsMessage::Text(text) => {
                let event = match serde_json::from_str::<ClientEvent>(text.as_str()) {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(user_id = %self.user_id, error = %err, "无法解析客户端事件，已忽略");
                        return true;
                    }
                };
                for reply in self.state.chat_service.handle_event(self.user_id, event).await {
                    if !handle.send(reply) {
                        return false;
                    }
                }
                true
            }
            WsMessage::Ping(data) => cmd_tx.send(WsCommand::SendPong(data.to_vec())).await.is_ok(),
            WsMessage::Pong(_) => true,
            WsMessage::Binary(_) => {
                tracing::debug!(user_id = %self.user_id, "忽略二进制帧");
                true
            }
            WsMessage::Close(_) => {
                tracing::debug!(user_id = %self.user_id, "WebSocket收到关闭消息");
                false
            }
        }
    }
}

fn encode(event: &ServerEvent) -> Option<WsMessage> {
    match serde_json::to_string(event) {
        Ok(json) => Some(WsMessage::Text(json.into())),
        Err(err) => {
            tracing::warn!(error = %err, event = event.name(), "failed to serialize websocket payload");
            None
        }
    }
}

/// WebSocket 写操作命令
#[derive(Debug)]
enum WsCommand {
    SendPong(Vec<u8>),
}
