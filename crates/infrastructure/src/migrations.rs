use sqlx::migrate::Migrator;

/// 工作区根目录下 `migrations/` 中的全部迁移
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");
