//! # 渠道存储接口

use async_trait::async_trait;
use entity::channels;

use crate::error::Result;

/// 渠道存储：按分组与模型随机挑选一个满足条件的渠道
///
/// `retry` 为重试序号，具体含义由实现决定。没有满足条件的渠道时返回 `Ok(None)`。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn random_satisfied_channel(
        &self,
        group: &str,
        model: &str,
        retry: u32,
    ) -> Result<Option<channels::Model>>;
}
