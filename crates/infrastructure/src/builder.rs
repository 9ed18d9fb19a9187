use std::sync::Arc;

use application::{AccountDirectory, DisabledPushNotifier, PushNotifier};
use config::PushConfig;
use thiserror::Error;

use crate::{
    geo::PgGeoDistanceProvider,
    migrations::MIGRATOR,
    push::ExpoPushNotifier,
    repository::{create_pg_pool, PgAccountDirectory, PgMessageRepository},
};

#[derive(Debug, Clone)]
pub struct InfrastructureConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub push: PushConfig,
}

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// 连接数据库、执行迁移并构建全部适配器
#[derive(Clone)]
pub struct Infrastructure {
    pub pool: sqlx::PgPool,
    pub messages: Arc<PgMessageRepository>,
    pub accounts: Arc<PgAccountDirectory>,
    pub geo: Arc<PgGeoDistanceProvider>,
    pub notifier: Arc<dyn PushNotifier>,
}

impl Infrastructure {
    pub async fn connect(config: InfrastructureConfig) -> Result<Self, InfrastructureError> {
        let pool = create_pg_pool(&config.database_url, config.max_connections).await?;
        MIGRATOR.run(&pool).await?;

        let messages = Arc::new(PgMessageRepository::new(pool.clone()));
        let accounts = Arc::new(PgAccountDirectory::new(pool.clone()));
        let geo = Arc::new(PgGeoDistanceProvider::new(pool.clone()));
        let notifier: Arc<dyn PushNotifier> = if config.push.enabled {
            let directory: Arc<dyn AccountDirectory> = accounts.clone();
            Arc::new(ExpoPushNotifier::new(config.push.expo_url.clone(), directory))
        } else {
            tracing::info!("推送通知已关闭");
            Arc::new(DisabledPushNotifier)
        };

        Ok(Self {
            pool,
            messages,
            accounts,
            geo,
            notifier,
        })
    }
}
