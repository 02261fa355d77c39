//! # 测试辅助函数
//!
//! 提供通用的测试工具和辅助函数

use chrono::Utc;
use entity::{channels, tokens, users};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, DbErr, Set};
use sea_orm_migration::MigratorTrait;
use std::sync::Once;
use tracing::Level;

use super::fixtures::{TokenFixture, UserFixture};

static INIT: Once = Once::new();

/// 初始化测试环境
pub fn init_test_env() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 创建内存数据库连接
pub async fn create_test_db() -> Result<DatabaseConnection, DbErr> {
    let db = Database::connect("sqlite::memory:").await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

/// 插入用户
pub async fn insert_user(
    db: &DatabaseConnection,
    username: &str,
    user_group: &str,
) -> Result<users::Model, DbErr> {
    UserFixture::new()
        .username(username)
        .user_group(user_group)
        .build()
        .insert(db)
        .await
}

/// 插入令牌
pub async fn insert_token(
    db: &DatabaseConnection,
    fixture: TokenFixture,
) -> Result<tokens::Model, DbErr> {
    fixture.build().insert(db).await
}

/// 插入渠道（权重为 0）
pub async fn insert_channel(
    db: &DatabaseConnection,
    name: &str,
    groups: &str,
    models: &str,
    status: i32,
    priority: i64,
) -> Result<channels::Model, DbErr> {
    let now = Utc::now().naive_utc();
    channels::ActiveModel {
        name: Set(name.to_string()),
        groups: Set(groups.to_string()),
        models: Set(models.to_string()),
        status: Set(status),
        weight: Set(0),
        priority: Set(priority),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
}
