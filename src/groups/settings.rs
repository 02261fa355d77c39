//! # 分组设置
//!
//! 进程级的分组配置：优先级上限、自动分组、倍率表与可用分组表。
//! 请求路径只读取快照，热重载整体替换快照。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{ProxyError, Result};

/// 单个令牌允许配置的分组优先级数量上限（默认值）
pub const DEFAULT_MAX_GROUP_PRIORITIES: usize = 32;

/// 分组相关的全部配置，对应配置文件中的 `[groups]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSettings {
    /// 优先级列表长度上限
    pub max_group_priorities: usize,
    /// `auto` 分组按顺序展开成的分组
    pub auto_groups: Vec<String>,
    /// 分组倍率，数值越小越便宜
    pub ratios: IndexMap<String, f64>,
    /// 全局可用分组：分组名 -> 描述
    pub usable_groups: IndexMap<String, String>,
    /// 按用户分组覆盖可用分组。
    ///
    /// 规则键 `"+:g"` 添加，`"-:g"` 移除，裸分组名添加或覆盖描述。
    pub special_usable_groups: IndexMap<String, IndexMap<String, String>>,
}

impl Default for GroupSettings {
    fn default() -> Self {
        let mut ratios = IndexMap::new();
        ratios.insert("default".to_string(), 1.0);
        ratios.insert("vip".to_string(), 1.0);
        ratios.insert("svip".to_string(), 1.0);

        let mut usable_groups = IndexMap::new();
        usable_groups.insert("default".to_string(), "默认分组".to_string());
        usable_groups.insert("vip".to_string(), "vip分组".to_string());

        Self {
            max_group_priorities: DEFAULT_MAX_GROUP_PRIORITIES,
            auto_groups: vec!["default".to_string()],
            ratios,
            usable_groups,
            special_usable_groups: IndexMap::new(),
        }
    }
}

impl GroupSettings {
    /// 查询分组倍率
    #[must_use]
    pub fn ratio(&self, group: &str) -> Option<f64> {
        self.ratios.get(group).copied()
    }

    /// 是否配置了自动分组
    #[must_use]
    pub fn auto_groups_enabled(&self) -> bool {
        !self.auto_groups.is_empty()
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.max_group_priorities == 0 {
            return Err(ProxyError::config("groups.max_group_priorities 必须大于0"));
        }
        for (group, ratio) in &self.ratios {
            if group.trim().is_empty() {
                return Err(ProxyError::config("groups.ratios 中存在空分组名"));
            }
            if !ratio.is_finite() || *ratio < 0.0 {
                return Err(ProxyError::config(format!(
                    "分组 {group} 的倍率无效: {ratio}"
                )));
            }
        }
        if self.auto_groups.iter().any(|g| g.trim().is_empty()) {
            return Err(ProxyError::config("groups.auto_groups 中存在空分组名"));
        }
        Ok(())
    }
}

/// 分组设置的共享句柄
///
/// 读取方拿到 `Arc` 快照后立即释放锁，选择过程中不持锁。
#[derive(Debug, Clone, Default)]
pub struct GroupSettingsHandle {
    inner: Arc<RwLock<Arc<GroupSettings>>>,
}

impl GroupSettingsHandle {
    /// 用初始设置创建句柄
    #[must_use]
    pub fn new(settings: GroupSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    /// 获取当前快照
    pub async fn snapshot(&self) -> Arc<GroupSettings> {
        Arc::clone(&*self.inner.read().await)
    }

    /// 整体替换设置
    pub async fn replace(&self, settings: GroupSettings) {
        *self.inner.write().await = Arc::new(settings);
    }
}
