use domain::UserId;
use serde_json::Value as JsonValue;

/// 一条待推送的通知
#[derive(Debug, Clone, PartialEq)]
pub struct PushNotification {
    pub user_id: UserId,
    pub title: String,
    pub body: String,
    pub data: JsonValue,
}

/// 推送通知分发器
///
/// 发出即忘：实现方自行处理异步发送和失败日志，调用方不等待结果。
pub trait PushNotifier: Send + Sync {
    fn dispatch(&self, notification: PushNotification);
}

/// 关闭推送时使用
#[derive(Debug, Default)]
pub struct DisabledPushNotifier;

impl PushNotifier for DisabledPushNotifier {
    fn dispatch(&self, notification: PushNotification) {
        tracing::debug!(user_id = %notification.user_id, "推送已关闭，忽略通知");
    }
}
