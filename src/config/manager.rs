//! # 配置管理器
//!
//! 统一的配置入口：定位配置文件、应用环境变量覆盖、校验，
//! 并在文件变更时把新的 `[groups]` 发布到共享的分组设置句柄。

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{AppConfig, ConfigEvent, ConfigWatcher, load_config_file};
use crate::error::{ProxyError, Result};
use crate::groups::GroupSettingsHandle;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo, lwarn};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "TOKEN_ROUTER_";
/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "TOKEN_ROUTER_CONFIG_PATH";
/// 关闭配置文件监控的环境变量
pub const DISABLE_WATCH_ENV: &str = "TOKEN_ROUTER_DISABLE_CONFIG_WATCH";

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
    groups: GroupSettingsHandle,
    overrides: Arc<HashMap<String, String>>,
    config_path: PathBuf,
    watcher: Option<ConfigWatcher>,
}

impl ConfigManager {
    /// 按命令行参数与环境变量定位配置文件并创建管理器
    pub async fn new(cli_path: Option<&Path>) -> Result<Self> {
        let config_path = resolve_config_path(cli_path, env::var(CONFIG_PATH_ENV).ok(), env::var("RUST_ENV").ok());
        let overrides = collect_env_overrides(env::vars());
        let watch = env::var(DISABLE_WATCH_ENV).map_or(true, |v| v != "true");
        Self::from_file(config_path, overrides, watch).await
    }

    /// 从指定文件创建配置管理器
    pub async fn from_file(
        config_path: impl Into<PathBuf>,
        overrides: HashMap<String, String>,
        watch: bool,
    ) -> Result<Self> {
        let config_path = config_path.into();
        let mut config = load_config_file(&config_path)?;
        apply_env_overrides(&mut config, &overrides)?;
        config.validate()?;

        let groups = GroupSettingsHandle::new(config.groups.clone());
        let config = Arc::new(RwLock::new(config));
        let overrides = Arc::new(overrides);

        let watcher = if watch {
            match ConfigWatcher::new(&config_path) {
                Ok(watcher) => {
                    Self::spawn_reload_task(&watcher, Arc::clone(&config), groups.clone(), Arc::clone(&overrides));
                    Some(watcher)
                }
                Err(e) => {
                    lwarn!(
                        "system",
                        LogStage::Configuration,
                        LogComponent::Config,
                        "watch_disabled",
                        &format!("无法启动配置文件监控: {e}, 将禁用热重载功能")
                    );
                    None
                }
            }
        } else {
            None
        };

        linfo!(
            "system",
            LogStage::Configuration,
            LogComponent::Config,
            "config_loaded",
            "配置管理器初始化完成",
            path = %config_path.display(),
            hot_reload = watcher.is_some(),
            env_overrides = overrides.len()
        );

        Ok(Self {
            config,
            groups,
            overrides,
            config_path,
            watcher,
        })
    }

    fn spawn_reload_task(
        watcher: &ConfigWatcher,
        config: Arc<RwLock<AppConfig>>,
        groups: GroupSettingsHandle,
        overrides: Arc<HashMap<String, String>>,
    ) {
        let mut events = watcher.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                match event {
                    ConfigEvent::Reloaded(new_config) => {
                        let candidate = (*new_config).clone();
                        if let Err(e) = Self::publish(candidate, &config, &groups, &overrides).await {
                            lwarn!(
                                "system",
                                LogStage::Configuration,
                                LogComponent::Config,
                                "reload_rejected",
                                &format!("新配置未通过校验，继续使用旧配置: {e}")
                            );
                        }
                    }
                    ConfigEvent::ReloadFailed(error) => {
                        lwarn!("system", LogStage::Configuration, LogComponent::Config, "reload_fail", &error);
                    }
                    ConfigEvent::FileDeleted => {
                        lwarn!("system", LogStage::Configuration, LogComponent::Config, "file_removed", "配置文件被删除");
                    }
                }
            }
        });
    }

    /// 应用覆盖、校验并替换当前配置与分组快照
    async fn publish(
        mut candidate: AppConfig,
        config: &RwLock<AppConfig>,
        groups: &GroupSettingsHandle,
        overrides: &HashMap<String, String>,
    ) -> Result<()> {
        apply_env_overrides(&mut candidate, overrides)?;
        candidate.validate()?;

        groups.replace(candidate.groups.clone()).await;
        *config.write().await = candidate;
        linfo!(
            "system",
            LogStage::Configuration,
            LogComponent::Config,
            "reloaded",
            "配置热重载完成，分组设置已更新"
        );
        Ok(())
    }

    /// 获取当前配置
    pub async fn get_config(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// 分组设置句柄，热重载时自动更新
    #[must_use]
    pub fn group_settings(&self) -> GroupSettingsHandle {
        self.groups.clone()
    }

    /// 配置文件路径
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// 是否启用了文件监控
    #[must_use]
    pub const fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// 手动重载配置
    pub async fn reload(&self) -> Result<()> {
        let candidate = load_config_file(&self.config_path)?;
        Self::publish(candidate, &self.config, &self.groups, &self.overrides).await
    }
}

/// 配置文件路径优先级：命令行 > `TOKEN_ROUTER_CONFIG_PATH` > `config/config.<RUST_ENV>.toml`
#[must_use]
pub fn resolve_config_path(
    cli_path: Option<&Path>,
    env_path: Option<String>,
    rust_env: Option<String>,
) -> PathBuf {
    if let Some(path) = cli_path {
        return path.to_path_buf();
    }
    if let Some(path) = env_path.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    let env = rust_env.unwrap_or_else(|| "dev".to_string());
    PathBuf::from(format!("config/config.{env}.toml"))
}

/// 收集 `TOKEN_ROUTER_` 前缀的环境变量（去掉前缀），路径与监控开关除外
pub fn collect_env_overrides<I>(vars: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let overrides: HashMap<String, String> = vars
        .into_iter()
        .filter(|(key, _)| key != CONFIG_PATH_ENV && key != DISABLE_WATCH_ENV)
        .filter_map(|(key, value)| key.strip_prefix(ENV_PREFIX).map(|k| (k.to_string(), value)))
        .collect();

    ldebug!(
        "system",
        LogStage::Configuration,
        LogComponent::Config,
        "env_overrides",
        &format!("发现 {} 个环境变量覆盖", overrides.len())
    );
    overrides
}

/// 应用环境变量覆盖
pub fn apply_env_overrides(config: &mut AppConfig, overrides: &HashMap<String, String>) -> Result<()> {
    for (key, value) in overrides {
        match key.as_str() {
            "DATABASE_URL" => config.database.url.clone_from(value),
            "JWT_SECRET" => config.auth.jwt_secret.clone_from(value),
            "HOST" => config.server.host.clone_from(value),
            "PORT" => {
                config.server.port = value.parse().map_err(|e| {
                    ProxyError::config_with_source(format!("无效的端口号: {value}"), e)
                })?;
            }
            "MAX_GROUP_PRIORITIES" => {
                config.groups.max_group_priorities = value.parse().map_err(|e| {
                    ProxyError::config_with_source(format!("无效的分组优先级上限: {value}"), e)
                })?;
            }
            _ => {
                lwarn!(
                    "system",
                    LogStage::Configuration,
                    LogComponent::Config,
                    "unknown_override",
                    &format!("未知的配置项，忽略环境变量覆盖: {ENV_PREFIX}{key}")
                );
            }
        }
    }
    Ok(())
}
