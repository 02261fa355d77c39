//! # 应用配置结构定义

use serde::{Deserialize, Serialize};

use super::DatabaseConfig;
use crate::error::Result;
use crate::groups::GroupSettings;

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP 服务配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 数据库配置
    #[serde(default)]
    pub database: DatabaseConfig,
    /// 管理端认证配置
    #[serde(default)]
    pub auth: AuthConfig,
    /// 渠道候选缓存配置
    #[serde(default)]
    pub channel_cache: ChannelCacheConfig,
    /// 分组配置（支持热重载）
    #[serde(default)]
    pub groups: GroupSettings,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 允许跨域的来源，空表示允许任意来源
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: Vec::new(),
        }
    }
}

/// 管理端认证配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// JWT 密钥
    pub jwt_secret: String,
    /// JWT 过期时间（秒）
    pub jwt_expires_in: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me-in-production".to_string(),
            jwt_expires_in: 3600,
        }
    }
}

/// 渠道候选缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelCacheConfig {
    /// 缓存时长（秒）
    pub ttl_seconds: u64,
    /// 最大条目数
    pub max_entries: u64,
}

impl Default for ChannelCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 60,
            max_entries: 10_000,
        }
    }
}

impl AppConfig {
    /// 监听地址
    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        crate::ensure_config!(self.server.port != 0, "无效的服务器端口: 0");
        crate::ensure_config!(!self.database.url.is_empty(), "数据库URL不能为空");
        crate::ensure_config!(self.database.max_connections > 0, "数据库最大连接数必须大于0");
        crate::ensure_config!(!self.auth.jwt_secret.trim().is_empty(), "JWT 密钥不能为空");
        crate::ensure_config!(
            self.auth.jwt_expires_in > 0,
            "JWT 过期时间必须大于0: {}",
            self.auth.jwt_expires_in
        );
        crate::ensure_config!(self.channel_cache.max_entries > 0, "渠道缓存最大条目数必须大于0");
        self.groups.validate()
    }
}
