//! # 测试替身
//!
//! 内存中的渠道存储：按分组预置渠道或错误，并记录被查询的分组

use async_trait::async_trait;
use entity::channels;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::fixtures::channel_model;
use crate::channel::ChannelStore;
use crate::error::{ProxyError, Result};

/// 内存渠道存储
#[derive(Debug, Default, Clone)]
pub struct StaticChannelStore {
    channels: HashMap<String, channels::Model>,
    failing: HashSet<String>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StaticChannelStore {
    /// 空存储，所有分组均无渠道
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 分组 `group` 对任何模型都返回一个渠道
    #[must_use]
    pub fn serve(mut self, group: &str, channel_id: i32) -> Self {
        self.channels
            .insert(group.to_string(), channel_model(channel_id, group, "*", 0, 0));
        self
    }

    /// 分组 `group` 返回存储错误
    #[must_use]
    pub fn fail(mut self, group: &str) -> Self {
        self.failing.insert(group.to_string());
        self
    }

    /// 按顺序返回被查询过的分组
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChannelStore for StaticChannelStore {
    async fn random_satisfied_channel(
        &self,
        group: &str,
        _model: &str,
        _retry: u32,
    ) -> Result<Option<channels::Model>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(group.to_string());
        }
        if self.failing.contains(group) {
            return Err(ProxyError::database(format!("分组 {group} 查询失败")));
        }
        Ok(self.channels.get(group).cloned())
    }
}
