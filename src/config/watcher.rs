//! # 配置文件监控模块
//!
//! 监听配置文件变更，解析后通过广播通道发出事件

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::{AppConfig, load_config_file};
use crate::error::Result;
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror, linfo, lwarn};

/// 配置变更事件
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// 配置文件重新解析成功（尚未应用环境变量覆盖与校验）
    Reloaded(Arc<AppConfig>),
    /// 配置重载失败
    ReloadFailed(String),
    /// 配置文件被删除
    FileDeleted,
}

/// 配置监控器
pub struct ConfigWatcher {
    config_path: PathBuf,
    event_sender: broadcast::Sender<ConfigEvent>,
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// 创建新的配置监控器
    pub fn new(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref().to_path_buf();
        let (event_sender, _) = broadcast::channel(64);

        let sender = event_sender.clone();
        let path = config_path.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => Self::handle_file_event(&event, &sender, &path),
            Err(e) => {
                lerror!(
                    "system",
                    LogStage::Configuration,
                    LogComponent::Config,
                    "watch_error",
                    &format!("文件监控错误: {e}")
                );
            }
        })?;

        let config_dir = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher.watch(config_dir, RecursiveMode::NonRecursive)?;

        linfo!(
            "system",
            LogStage::Configuration,
            LogComponent::Config,
            "watch_started",
            &format!("配置文件监控器已启动: {}", config_path.display())
        );

        Ok(Self {
            config_path,
            event_sender,
            _watcher: watcher,
        })
    }

    /// 被监控的文件
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// 订阅配置变更事件
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.event_sender.subscribe()
    }

    /// 处理文件变更事件（在 notify 线程上执行）
    fn handle_file_event(event: &Event, sender: &broadcast::Sender<ConfigEvent>, config_path: &Path) {
        let is_our_file = event
            .paths
            .iter()
            .any(|path| path.file_name() == config_path.file_name());
        if !is_our_file {
            return;
        }

        match &event.kind {
            EventKind::Modify(_) | EventKind::Create(_) => {
                ldebug!(
                    "system",
                    LogStage::Configuration,
                    LogComponent::Config,
                    "file_changed",
                    &format!("检测到配置文件变更: {:?}", event.paths)
                );

                // 等待写入完成
                std::thread::sleep(std::time::Duration::from_millis(100));

                let event = match load_config_file(config_path) {
                    Ok(config) => ConfigEvent::Reloaded(Arc::new(config)),
                    Err(e) => {
                        let message = format!("配置文件重载失败: {e}");
                        lwarn!("system", LogStage::Configuration, LogComponent::Config, "reload_fail", &message);
                        ConfigEvent::ReloadFailed(message)
                    }
                };
                let _ = sender.send(event);
            }
            EventKind::Remove(_) => {
                lwarn!(
                    "system",
                    LogStage::Configuration,
                    LogComponent::Config,
                    "file_removed",
                    &format!("配置文件被删除: {:?}", event.paths)
                );
                let _ = sender.send(ConfigEvent::FileDeleted);
            }
            _ => {}
        }
    }
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("config_path", &self.config_path)
            .finish_non_exhaustive()
    }
}
