use std::sync::Arc;

use domain::{is_active_premium, ChatAccount, Message, MessagePayload, ServerEvent, UserId};
use serde_json::json;

use crate::clock::Clock;
use crate::notifier::{PushNotification, PushNotifier};
use crate::presence::PresenceRegistry;

/// 一次投递的结果，都不算错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// 对方不在线
    Offline,
    /// 在线状态表里有连接，但连接已经关闭
    StaleConnection,
}

/// 消息路由：找到接收者的实时连接并投递，与持久化无关
pub struct ReplyDeliveryRouter {
    presence: Arc<dyn PresenceRegistry>,
    notifier: Arc<dyn PushNotifier>,
    clock: Arc<dyn Clock>,
}

impl ReplyDeliveryRouter {
    pub fn new(
        presence: Arc<dyn PresenceRegistry>,
        notifier: Arc<dyn PushNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            presence,
            notifier,
            clock,
        }
    }

    /// 投递到用户当前的连接；在线状态查询失败按离线处理
    pub async fn deliver_to(&self, user_id: UserId, event: ServerEvent) -> DeliveryOutcome {
        let handle = match self.presence.connection_of(user_id).await {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "查询在线连接失败");
                None
            }
        };

        let Some(handle) = handle else {
            return DeliveryOutcome::Offline;
        };

        let name = event.name();
        if handle.send(event) {
            tracing::debug!(user_id = %user_id, event = name, "事件已投递");
            DeliveryOutcome::Delivered
        } else {
            tracing::warn!(
                user_id = %user_id,
                connection_id = %handle.id(),
                event = name,
                "连接已失效，事件未投递"
            );
            DeliveryOutcome::StaleConnection
        }
    }

    /// 已持久化消息的投递：转发给在线的接收者，并且无论是否在线都触发推送。
    /// 返回同一份载荷，供调用方回送给发送者。
    pub async fn deliver_message(&self, message: &Message, sender: &ChatAccount) -> MessagePayload {
        let payload =
            MessagePayload::from_message(message, is_active_premium(sender, self.clock.now()));

        let outcome = self
            .deliver_to(message.receiver_id(), ServerEvent::Message(payload.clone()))
            .await;
        tracing::info!(
            message_id = %message.id(),
            sender_id = %message.sender_id(),
            receiver_id = %message.receiver_id(),
            outcome = ?outcome,
            "消息已投递"
        );

        let display_name = sender.display_name_or_default();
        self.notifier.dispatch(PushNotification {
            user_id: message.receiver_id(),
            title: display_name.to_string(),
            body: message.content().as_str().to_string(),
            data: json!({
                "type": "message",
                "senderId": message.sender_id(),
                "displayName": display_name,
                "messageId": message.id(),
            }),
        });

        payload
    }
}
