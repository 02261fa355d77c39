//! # 数据库模块
//!
//! 数据库连接和迁移管理

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::path::Path;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror, linfo, lwarn};

/// 初始化数据库连接
pub async fn init_database(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let database_url = config.url.as_str();
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Database,
        "connect",
        &format!("正在连接数据库: {}", database_url.chars().take(50).collect::<String>())
    );

    if database_url.starts_with("sqlite:") && !config.is_memory_database() {
        ensure_sqlite_file(database_url)?;
    }

    let mut options = ConnectOptions::new(database_url);
    options
        .max_connections(config.max_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .sqlx_logging(false);

    let db = Database::connect(options).await?;
    linfo!("system", LogStage::Startup, LogComponent::Database, "connected", "数据库连接成功");
    Ok(db)
}

/// 确保 SQLite 文件及其目录存在
fn ensure_sqlite_file(database_url: &str) -> Result<(), DbErr> {
    let raw = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(database_url);
    let db_path = Path::new(raw.split('?').next().unwrap_or(raw));

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DbErr::Custom(format!("无法创建数据库目录 {}: {e}", parent.display()))
            })?;
            linfo!(
                "system",
                LogStage::Startup,
                LogComponent::Database,
                "create_db_dir",
                &format!("创建数据库目录: {}", parent.display())
            );
        }
    }

    if db_path.exists() {
        ldebug!(
            "system",
            LogStage::Startup,
            LogComponent::Database,
            "db_file_exists",
            &format!("数据库文件已存在: {}", db_path.display())
        );
    } else {
        std::fs::File::create(db_path).map_err(|e| {
            DbErr::Custom(format!("无法创建数据库文件 {}: {e}", db_path.display()))
        })?;
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Database,
            "create_db_file",
            &format!("数据库文件创建成功: {}", db_path.display())
        );
    }
    Ok(())
}

/// 运行数据库迁移
pub async fn run_migrations(db: &DatabaseConnection) -> Result<(), DbErr> {
    linfo!("system", LogStage::Startup, LogComponent::Database, "migrate_start", "开始运行数据库迁移...");

    match ::migration::Migrator::up(db, None).await {
        Ok(()) => {
            linfo!("system", LogStage::Startup, LogComponent::Database, "migrate_done", "数据库迁移完成");
            Ok(())
        }
        Err(e) => {
            lerror!(
                "system",
                LogStage::Startup,
                LogComponent::Database,
                "migrate_fail",
                &format!("数据库迁移失败: {e}")
            );
            Err(e)
        }
    }
}

/// 检查数据库状态
pub async fn check_database_status(db: &DatabaseConnection) -> Result<(), DbErr> {
    let pending = ::migration::Migrator::get_pending_migrations(db).await?;

    if pending.is_empty() {
        linfo!("system", LogStage::Startup, LogComponent::Database, "migrate_status", "所有迁移都已应用");
    } else {
        lwarn!(
            "system",
            LogStage::Startup,
            LogComponent::Database,
            "migrate_status",
            &format!("有 {} 个待应用的迁移", pending.len())
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database_migrates_cleanly() {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..DatabaseConfig::default()
        };
        let db = init_database(&config).await.unwrap();
        run_migrations(&db).await.unwrap();
        assert!(::migration::Migrator::get_pending_migrations(&db).await.unwrap().is_empty());
        check_database_status(&db).await.unwrap();
    }
}
