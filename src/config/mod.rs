//! # 配置管理模块
//!
//! 处理应用配置加载、验证和热重载

mod app_config;
mod database;
mod manager;
mod watcher;

pub use app_config::{AppConfig, AuthConfig, ChannelCacheConfig, ServerConfig};
pub use database::DatabaseConfig;
pub use manager::{ConfigManager, apply_env_overrides, collect_env_overrides, resolve_config_path};
pub use watcher::{ConfigEvent, ConfigWatcher};

use std::path::Path;

use crate::error::{ProxyError, Result};

/// 读取并解析配置文件，不做校验与环境变量覆盖
pub fn load_config_file(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Err(ProxyError::config(format!("配置文件不存在: {}", path.display())));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        ProxyError::config_with_source(format!("读取配置文件失败: {}", path.display()), e)
    })?;

    toml::from_str(&content).map_err(|e| {
        ProxyError::config_with_source(format!("解析配置文件失败: {}", path.display()), e)
    })
}
