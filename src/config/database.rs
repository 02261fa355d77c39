//! # 数据库配置

use serde::{Deserialize, Serialize};

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 数据库URL
    pub url: String,
    /// 最大连接数
    pub max_connections: u32,
    /// 连接超时时间（秒）
    pub connect_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/token_router.db?mode=rwc".to_string(),
            max_connections: 10,
            connect_timeout: 30,
        }
    }
}

impl DatabaseConfig {
    /// 检查是否为内存数据库
    #[must_use]
    pub fn is_memory_database(&self) -> bool {
        self.url.contains(":memory:")
    }
}
