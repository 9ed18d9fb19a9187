//! 主应用程序入口
//!
//! 加载配置、连接数据库、启动欢迎消息任务和 Axum Web 服务。

use std::sync::Arc;

use application::{
    ChatService, ChatServiceDependencies, Clock, LocalPresenceBroadcaster, MemoryPresenceRegistry,
    PresenceBroadcaster, SystemClock, WelcomeMessageJob,
};
use config::AppConfig;
use infrastructure::{Infrastructure, InfrastructureConfig};
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    config.validate()?;

    tracing::info!(
        database = config.database.url.split('@').next_back().unwrap_or("unknown"),
        "连接数据库"
    );
    let infra = Infrastructure::connect(InfrastructureConfig {
        database_url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        push: config.push.clone(),
    })
    .await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let broadcaster: Arc<dyn PresenceBroadcaster> = Arc::new(LocalPresenceBroadcaster::new(
        config.server.presence_channel_capacity,
    ));
    // 单进程内存在线表，多实例部署需要共享存储
    let presence = Arc::new(MemoryPresenceRegistry::new(
        broadcaster.clone(),
        clock.clone(),
    ));

    let chat_service = Arc::new(ChatService::new(ChatServiceDependencies {
        message_repository: infra.messages.clone(),
        account_directory: infra.accounts.clone(),
        geo_distance: infra.geo.clone(),
        presence,
        broadcaster: broadcaster.clone(),
        notifier: infra.notifier.clone(),
        clock: clock.clone(),
        config: config.chat.clone(),
    }));

    if config.chat.welcome.enabled {
        let job = WelcomeMessageJob::new(
            infra.accounts.clone(),
            infra.messages.clone(),
            chat_service.store(),
            infra.notifier.clone(),
            clock,
            config.chat.welcome.clone(),
        );
        tokio::spawn(job.run());
        tracing::info!(
            interval_secs = config.chat.welcome.interval_secs,
            "欢迎消息任务已启动"
        );
    }

    let jwt_service = Arc::new(JwtService::new(config.jwt.clone()));
    let state = AppState::new(chat_service, broadcaster, jwt_service);
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("聊天服务启动在 http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("服务已停止");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "监听退出信号失败");
    }
}
