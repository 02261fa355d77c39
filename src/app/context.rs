//! 应用上下文
//!
//! 统一持有跨模块共享的服务实例，便于在测试中注入替身实现。

use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::JwtManager;
use crate::channel::{ChannelSelector, ChannelStore, DatabaseChannelStore};
use crate::config::AppConfig;
use crate::groups::GroupSettingsHandle;

/// 共享服务容器
#[derive(Clone)]
pub struct AppContext {
    /// 数据库连接
    pub database: Arc<DatabaseConnection>,
    /// 热重载时由配置管理器更新
    pub groups: GroupSettingsHandle,
    /// 管理端 JWT
    pub jwt: Arc<JwtManager>,
    /// 渠道选择器
    pub selector: Arc<ChannelSelector>,
}

impl AppContext {
    /// 以数据库渠道存储构建
    #[must_use]
    pub fn build(config: &AppConfig, database: Arc<DatabaseConnection>, groups: GroupSettingsHandle) -> Self {
        let store = DatabaseChannelStore::new(
            Arc::clone(&database),
            Duration::from_secs(config.channel_cache.ttl_seconds),
            config.channel_cache.max_entries,
        );
        Self::with_store(config, database, groups, Arc::new(store))
    }

    /// 使用指定的渠道存储构建
    #[must_use]
    pub fn with_store(
        config: &AppConfig,
        database: Arc<DatabaseConnection>,
        groups: GroupSettingsHandle,
        store: Arc<dyn ChannelStore>,
    ) -> Self {
        Self {
            database,
            jwt: Arc::new(JwtManager::new(&config.auth)),
            selector: Arc::new(ChannelSelector::new(store, groups.clone())),
            groups,
        }
    }
}
