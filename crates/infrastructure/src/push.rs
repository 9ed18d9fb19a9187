use std::sync::Arc;

use application::{AccountDirectory, PushNotification, PushNotifier};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Expo 推送接口的请求体
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpoPushMessage {
    pub to: String,
    pub sound: &'static str,
    pub title: String,
    pub body: String,
    pub data: JsonValue,
}

impl ExpoPushMessage {
    pub fn new(token: String, notification: PushNotification) -> Self {
        Self {
            to: token,
            sound: "default",
            title: notification.title,
            body: notification.body,
            data: notification.data,
        }
    }
}

/// 形如 `ExponentPushToken[...]` 或 `ExpoPushToken[...]` 的令牌才会被发送
pub fn is_expo_push_token(token: &str) -> bool {
    ["ExponentPushToken[", "ExpoPushToken["]
        .iter()
        .any(|prefix| token.len() > prefix.len() + 1 && token.starts_with(prefix))
        && token.ends_with(']')
}

/// 通过 Expo 推送服务发送通知，失败只记录日志
#[derive(Clone)]
pub struct ExpoPushNotifier {
    client: reqwest::Client,
    endpoint: String,
    accounts: Arc<dyn AccountDirectory>,
}

impl ExpoPushNotifier {
    pub fn new(endpoint: impl Into<String>, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            accounts,
        }
    }

    async fn send(&self, notification: PushNotification) {
        let user_id = notification.user_id;
        let token = match self.accounts.find_by_id(user_id).await {
            Ok(Some(account)) => account.push_token,
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "查询推送令牌失败");
                return;
            }
        };

        let Some(token) = token.filter(|t| is_expo_push_token(t)) else {
            tracing::debug!(user_id = %user_id, "没有有效的推送令牌，跳过推送");
            return;
        };

        let message = ExpoPushMessage::new(token, notification);
        match self.client.post(&self.endpoint).json(&message).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(user_id = %user_id, "推送已发送");
            }
            Ok(response) => {
                tracing::warn!(user_id = %user_id, status = %response.status(), "推送服务返回错误");
            }
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "推送请求失败");
            }
        }
    }
}

impl PushNotifier for ExpoPushNotifier {
    fn dispatch(&self, notification: PushNotification) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(user_id = %notification.user_id, "没有可用的运行时，丢弃推送");
            return;
        };
        let notifier = self.clone();
        runtime.spawn(async move {
            notifier.send(notification).await;
        });
    }
}
