use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use config::WelcomeConfig;
use domain::{ChatAccount, Timestamp};
use serde_json::json;

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::message_store::MessageStore;
use crate::notifier::{PushNotification, PushNotifier};
use crate::repository::{AccountDirectory, MessageRepository};

const ADMIN_FALLBACK_NAME: &str = "Admin";

/// 新用户欢迎消息：定期给注册不久的真人用户发送一条来自管理员的消息
pub struct WelcomeMessageJob {
    accounts: Arc<dyn AccountDirectory>,
    messages: Arc<dyn MessageRepository>,
    store: Arc<MessageStore>,
    notifier: Arc<dyn PushNotifier>,
    clock: Arc<dyn Clock>,
    config: WelcomeConfig,
}

impl WelcomeMessageJob {
    pub fn new(
        accounts: Arc<dyn AccountDirectory>,
        messages: Arc<dyn MessageRepository>,
        store: Arc<MessageStore>,
        notifier: Arc<dyn PushNotifier>,
        clock: Arc<dyn Clock>,
        config: WelcomeConfig,
    ) -> Self {
        Self {
            accounts,
            messages,
            store,
            notifier,
            clock,
            config,
        }
    }

    /// 按固定间隔循环执行，单次失败只记录日志
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        loop {
            ticker.tick().await;
            match self.run_once(self.clock.now()).await {
                Ok(0) => {}
                Ok(sent) => tracing::info!(sent, "欢迎消息发送完成"),
                Err(err) => tracing::error!(error = %err, "欢迎消息任务失败"),
            }
        }
    }

    /// 执行一轮检查，返回本轮发出的欢迎消息数
    pub async fn run_once(&self, now: Timestamp) -> Result<usize, ApplicationError> {
        let from = now - ChronoDuration::minutes(self.config.max_account_age_minutes);
        let to = now - ChronoDuration::minutes(self.config.min_account_age_minutes);
        let signups = self.accounts.find_human_signups_between(from, to).await?;
        if signups.is_empty() {
            return Ok(0);
        }

        let Some(admin) = self.accounts.find_admin().await? else {
            tracing::warn!("没有管理员账户，无法发送欢迎消息");
            return Ok(0);
        };

        let mut sent = 0;
        for user in signups {
            if self.messages.exists_from(admin.id, user.id).await? {
                continue;
            }
            match self.welcome(&admin, &user).await {
                Ok(()) => sent += 1,
                Err(err) => {
                    tracing::error!(user_id = %user.id, error = %err, "发送欢迎消息失败");
                }
            }
        }
        Ok(sent)
    }

    async fn welcome(&self, admin: &ChatAccount, user: &ChatAccount) -> Result<(), ApplicationError> {
        let message = self.store.save(admin.id, user.id, &self.config.text).await?;

        let admin_name = admin
            .display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(ADMIN_FALLBACK_NAME);
        self.notifier.dispatch(PushNotification {
            user_id: user.id,
            title: format!("Welcome from {admin_name}"),
            body: self.config.text.clone(),
            data: json!({
                "type": "message",
                "senderId": admin.id,
                "displayName": admin_name,
                "messageId": message.id(),
            }),
        });

        tracing::info!(user_id = %user.id, message_id = %message.id(), "已发送欢迎消息");
        Ok(())
    }
}
