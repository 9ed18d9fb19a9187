use std::sync::Arc;
use std::time::Duration;

use config::AutoReplyConfig;
use domain::{ChatAccount, ServerEvent, UserId};
use rand::Rng;

use crate::broadcaster::PresenceBroadcaster;
use crate::clock::Clock;
use crate::delivery::ReplyDeliveryRouter;
use crate::error::ApplicationError;
use crate::message_store::MessageStore;

/// 已安排的一次自动回复
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledReply {
    pub seeded_id: UserId,
    pub human_id: UserId,
    pub delay: Duration,
}

/// 种子账户的自动回复模拟器
///
/// 收到消息后随机等待一段时间，模拟对方上线、回复、再下线。
/// 每次调度都是独立的后台任务，不支持取消。
#[derive(Clone)]
pub struct AutoReplySimulator {
    broadcaster: Arc<dyn PresenceBroadcaster>,
    store: Arc<MessageStore>,
    router: Arc<ReplyDeliveryRouter>,
    clock: Arc<dyn Clock>,
    config: AutoReplyConfig,
}

impl AutoReplySimulator {
    pub fn new(
        broadcaster: Arc<dyn PresenceBroadcaster>,
        store: Arc<MessageStore>,
        router: Arc<ReplyDeliveryRouter>,
        clock: Arc<dyn Clock>,
        config: AutoReplyConfig,
    ) -> Self {
        Self {
            broadcaster,
            store,
            router,
            clock,
            config,
        }
    }

    fn random_delay(&self) -> Duration {
        let min = self.config.min_delay_ms;
        let max = self.config.max_delay_ms.max(min);
        Duration::from_millis(rand::rng().random_range(min..=max))
    }

    /// 为 `seeded` 安排一次对 `human_id` 的回复，立即返回
    pub fn schedule(
        &self,
        seeded: ChatAccount,
        human_id: UserId,
        in_response_to: &str,
    ) -> ScheduledReply {
        let delay = self.random_delay();
        let scheduled = ScheduledReply {
            seeded_id: seeded.id,
            human_id,
            delay,
        };
        tracing::info!(
            seeded_id = %seeded.id,
            human_id = %human_id,
            delay_ms = delay.as_millis() as u64,
            trigger_len = in_response_to.len(),
            "已安排自动回复"
        );

        let simulator = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = simulator.reply(&seeded, human_id).await {
                tracing::error!(
                    seeded_id = %seeded.id,
                    human_id = %human_id,
                    error = %err,
                    "自动回复失败"
                );
            }
        });

        scheduled
    }

    async fn reply(&self, seeded: &ChatAccount, human_id: UserId) -> Result<(), ApplicationError> {
        // 种子账户没有真实连接，只广播在线状态，不写入在线状态表
        self.publish(ServerEvent::UserOnline {
            user_id: seeded.id,
            timestamp: self.clock.now(),
        })
        .await;

        // 上线事件发出后，无论回复是否成功都要补发下线事件
        let outcome = self.send_reply(seeded, human_id).await;

        tokio::time::sleep(Duration::from_millis(self.config.offline_delay_ms)).await;
        self.publish(ServerEvent::UserOffline {
            user_id: seeded.id,
            timestamp: self.clock.now(),
        })
        .await;
        outcome
    }

    async fn send_reply(
        &self,
        seeded: &ChatAccount,
        human_id: UserId,
    ) -> Result<(), ApplicationError> {
        let message = self
            .store
            .save(seeded.id, human_id, &self.config.reply_text)
            .await?;
        self.router.deliver_message(&message, seeded).await;
        Ok(())
    }

    async fn publish(&self, event: ServerEvent) {
        let name = event.name();
        if let Err(err) = self.broadcaster.publish(event).await {
            tracing::warn!(error = %err, event = name, "自动回复在线状态广播失败");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::LocalPresenceBroadcaster;
    use crate::memory::{
        account, ManualClock, MemoryAccountDirectory, MemoryMessageRepository,
        RecordingPushNotifier,
    };
    use crate::presence::{memory::MemoryPresenceRegistry, ConnectionHandle, PresenceRegistry};
    use tokio::time::Instant;

    struct Fixture {
        simulator: AutoReplySimulator,
        broadcaster: Arc<LocalPresenceBroadcaster>,
        presence: Arc<MemoryPresenceRegistry>,
        messages: Arc<MemoryMessageRepository>,
        accounts: Arc<MemoryAccountDirectory>,
        notifier: Arc<RecordingPushNotifier>,
    }

    fn fixture() -> Fixture {
        let broadcaster = Arc::new(LocalPresenceBroadcaster::new(16));
        let clock = Arc::new(ManualClock::default());
        let presence = Arc::new(MemoryPresenceRegistry::new(
            broadcaster.clone(),
            clock.clone(),
        ));
        let messages = Arc::new(MemoryMessageRepository::default());
        let accounts = Arc::new(MemoryAccountDirectory::default());
        let notifier = Arc::new(RecordingPushNotifier::default());
        let store = Arc::new(MessageStore::new(
            messages.clone(),
            accounts.clone(),
            clock.clone(),
            100,
        ));
        let router = Arc::new(ReplyDeliveryRouter::new(
            presence.clone(),
            notifier.clone(),
            clock.clone(),
        ));
        let simulator = AutoReplySimulator::new(
            broadcaster.clone(),
            store,
            router,
            clock,
            AutoReplyConfig::default(),
        );
        Fixture {
            simulator,
            broadcaster,
            presence,
            messages,
            accounts,
            notifier,
        }
    }

    fn seeded(name: &str) -> ChatAccount {
        let mut acc = account(name);
        acc.is_seeded = true;
        acc
    }

    #[tokio::test(start_paused = true)]
    async fn reply_arrives_within_window_then_goes_offline() {
        let fx = fixture();
        let bot = fx.accounts.insert(seeded("Jess")).await;
        let human = fx.accounts.insert(account("Human")).await;
        let (handle, mut inbox) = ConnectionHandle::channel();
        fx.presence.register(human.id, handle).await.unwrap();
        let mut presence_events = fx.broadcaster.subscribe();

        let start = Instant::now();
        let scheduled = fx.simulator.schedule(bot.clone(), human.id, "hello?");
        assert!(scheduled.delay >= Duration::from_millis(15_000));
        assert!(scheduled.delay <= Duration::from_millis(60_000));

        let online = presence_events.recv().await.unwrap();
        assert_eq!(online.name(), "userOnline");
        assert_eq!(online.presence_user(), Some(bot.id));
        let online_at = Instant::now();
        assert_eq!(online_at - start, scheduled.delay);

        let Some(ServerEvent::Message(payload)) = inbox.recv().await else {
            panic!("expected a message event");
        };
        assert_eq!(payload.sender_id, bot.id);
        assert_eq!(payload.receiver_id, human.id);
        assert_eq!(payload.content, "Hey! Thanks for the message 😊");
        assert!(!payload.sender_is_premium);

        let offline = presence_events.recv().await.unwrap();
        assert_eq!(offline.name(), "userOffline");
        assert_eq!(offline.presence_user(), Some(bot.id));
        assert_eq!(Instant::now() - online_at, Duration::from_millis(5_000));

        // 种子账户从未进入在线状态表
        assert!(!fx.presence.is_online(bot.id).await.unwrap());
        assert_eq!(fx.messages.all().await.len(), 1);
        assert_eq!(fx.notifier.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_human_still_gets_persisted_reply() {
        let fx = fixture();
        let bot = fx.accounts.insert(seeded("Jess")).await;
        let human = fx.accounts.insert(account("Human")).await;
        let mut presence_events = fx.broadcaster.subscribe();

        fx.simulator.schedule(bot.clone(), human.id, "hi");

        // 等到下线事件，整个回复流程已结束
        loop {
            let event = presence_events.recv().await.unwrap();
            if event.name() == "userOffline" {
                break;
            }
        }
        let stored = fx.messages.all().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].sender_id(), bot.id);
        assert!(!stored[0].is_read());
        assert_eq!(fx.notifier.sent()[0].user_id, human.id);
    }

    #[tokio::test(start_paused = true)]
    async fn every_trigger_schedules_its_own_reply() {
        let fx = fixture();
        let bot = fx.accounts.insert(seeded("Jess")).await;
        let human = fx.accounts.insert(account("Human")).await;
        let mut presence_events = fx.broadcaster.subscribe();

        fx.simulator.schedule(bot.clone(), human.id, "one");
        fx.simulator.schedule(bot.clone(), human.id, "two");

        let mut offline = 0;
        while offline < 2 {
            if presence_events.recv().await.unwrap().name() == "userOffline" {
                offline += 1;
            }
        }
        assert_eq!(fx.messages.all().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reply_still_goes_offline() {
        let fx = fixture();
        let bot = fx.accounts.insert(seeded("Jess")).await;
        let human = fx.accounts.insert(account("Human")).await;
        let mut presence_events = fx.broadcaster.subscribe();
        fx.messages.fail_writes(true);

        fx.simulator.schedule(bot.clone(), human.id, "hello?");

        let online = presence_events.recv().await.unwrap();
        assert_eq!(online.name(), "userOnline");
        let online_at = Instant::now();

        let offline = presence_events.recv().await.unwrap();
        assert_eq!(offline.name(), "userOffline");
        assert_eq!(offline.presence_user(), Some(bot.id));
        assert_eq!(Instant::now() - online_at, Duration::from_millis(5_000));

        assert!(fx.messages.all().await.is_empty());
        assert!(fx.notifier.sent().is_empty());
    }
}
