//! # 数据库渠道存储
//!
//! 从 `channels` 表读取启用的渠道，按 (分组, 模型) 缓存候选列表，
//! 再按优先级档位与权重随机挑选。

use async_trait::async_trait;
use entity::channels::{self, CHANNEL_STATUS_ENABLED};
use moka::future::Cache;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use std::time::Duration;

use super::store::ChannelStore;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror};

/// 权重平滑量，避免权重为 0 的渠道永远选不中
const WEIGHT_SMOOTHING: u64 = 10;

type CandidateKey = (String, String);

/// 基于数据库的渠道存储
#[derive(Clone)]
pub struct DatabaseChannelStore {
    db: Arc<DatabaseConnection>,
    cache: Cache<CandidateKey, Arc<Vec<channels::Model>>>,
}

impl DatabaseChannelStore {
    /// 创建存储，`ttl` 为候选列表缓存时长
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { db, cache }
    }

    /// 渠道变更后清空缓存
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    async fn candidates(&self, group: &str, model: &str) -> Result<Arc<Vec<channels::Model>>> {
        let key = (group.to_string(), model.to_string());
        if let Some(cached) = self.cache.get(&key).await {
            return Ok(cached);
        }

        let enabled = channels::Entity::find()
            .filter(channels::Column::Status.eq(CHANNEL_STATUS_ENABLED))
            .order_by_asc(channels::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|err| {
                lerror!(
                    "system",
                    LogStage::Db,
                    LogComponent::ChannelStore,
                    "load_channels_fail",
                    &format!("Failed to load channels for group {group}: {err}")
                );
                ProxyError::database_with_source("加载渠道失败", err)
            })?;

        let matched: Vec<channels::Model> = enabled
            .into_iter()
            .filter(|channel| channel.serves(group, model))
            .collect();

        ldebug!(
            "system",
            LogStage::Cache,
            LogComponent::ChannelStore,
            "cache_candidates",
            "Cached channel candidates",
            group = group,
            model = model,
            count = matched.len()
        );

        let matched = Arc::new(matched);
        self.cache.insert(key, Arc::clone(&matched)).await;
        Ok(matched)
    }
}

#[async_trait]
impl ChannelStore for DatabaseChannelStore {
    async fn random_satisfied_channel(
        &self,
        group: &str,
        model: &str,
        retry: u32,
    ) -> Result<Option<channels::Model>> {
        let candidates = self.candidates(group, model).await?;
        Ok(pick_channel(&candidates, retry, |range| fastrand::u64(range)))
    }
}

/// 从候选中挑选渠道
///
/// 不同优先级按数值降序分档，第 `retry` 次重试取第 `retry` 档（超出取最后一档），
/// 档内按 `weight + 10` 加权随机。`roll` 接收总权重范围并返回其中一个值。
pub fn pick_channel<F>(
    candidates: &[channels::Model],
    retry: u32,
    roll: F,
) -> Option<channels::Model>
where
    F: FnOnce(std::ops::Range<u64>) -> u64,
{
    match candidates {
        [] => return None,
        [only] => return Some(only.clone()),
        _ => {}
    }

    let mut tiers: Vec<i64> = candidates.iter().map(|c| c.priority).collect();
    tiers.sort_unstable_by(|a, b| b.cmp(a));
    tiers.dedup();

    let index = usize::try_from(retry).unwrap_or(usize::MAX).min(tiers.len() - 1);
    let target = tiers[index];
    let tier: Vec<&channels::Model> = candidates.iter().filter(|c| c.priority == target).collect();

    let weight_of = |c: &channels::Model| u64::try_from(c.weight.max(0)).unwrap_or(0) + WEIGHT_SMOOTHING;
    let total: u64 = tier.iter().map(|c| weight_of(c)).sum();

    let mut remaining = roll(0..total);
    for channel in &tier {
        let weight = weight_of(channel);
        if remaining < weight {
            return Some((*channel).clone());
        }
        remaining -= weight;
    }
    tier.last().map(|c| (*c).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::channel_model;
    use crate::testing::helpers::{create_test_db, insert_channel};

    #[test]
    fn test_pick_empty_and_single() {
        assert!(pick_channel(&[], 0, |_| 0).is_none());
        let only = channel_model(1, "vip", "gpt-4", 0, 0);
        assert_eq!(pick_channel(&[only.clone()], 5, |_| 0), Some(only));
    }

    #[test]
    fn test_pick_uses_retry_tier() {
        let candidates = vec![
            channel_model(1, "vip", "gpt-4", 0, 5),
            channel_model(2, "vip", "gpt-4", 0, 10),
            channel_model(3, "vip", "gpt-4", 0, 1),
        ];

        assert_eq!(pick_channel(&candidates, 0, |_| 0).unwrap().id, 2);
        assert_eq!(pick_channel(&candidates, 1, |_| 0).unwrap().id, 1);
        assert_eq!(pick_channel(&candidates, 2, |_| 0).unwrap().id, 3);
        // 超出档位数时取最低档
        assert_eq!(pick_channel(&candidates, 9, |_| 0).unwrap().id, 3);
    }

    #[test]
    fn test_pick_weighted_within_tier() {
        let candidates = vec![
            channel_model(1, "vip", "gpt-4", 0, 0),
            channel_model(2, "vip", "gpt-4", 30, 0),
        ];

        // 权重分别为 10 与 40
        let mut seen_total = 0;
        let first = pick_channel(&candidates, 0, |range| {
            seen_total = range.end;
            9
        });
        assert_eq!(seen_total, 50);
        assert_eq!(first.unwrap().id, 1);
        assert_eq!(pick_channel(&candidates, 0, |_| 10).unwrap().id, 2);
        assert_eq!(pick_channel(&candidates, 0, |_| 49).unwrap().id, 2);
    }

    #[tokio::test]
    async fn test_database_store_filters_group_model_and_status() {
        let db = Arc::new(create_test_db().await.unwrap());
        insert_channel(&db, "vip-a", "vip,standard", "gpt-4,gpt-3.5", 1, 0).await.unwrap();
        insert_channel(&db, "vip-disabled", "vip", "gpt-4", 2, 0).await.unwrap();
        insert_channel(&db, "basic", "basic", "gpt-4", 1, 0).await.unwrap();

        let store = DatabaseChannelStore::new(Arc::clone(&db), Duration::from_secs(60), 100);

        let hit = store.random_satisfied_channel("vip", "gpt-4", 0).await.unwrap();
        assert_eq!(hit.unwrap().name, "vip-a");

        let standard = store.random_satisfied_channel("standard", "gpt-3.5", 0).await.unwrap();
        assert_eq!(standard.unwrap().name, "vip-a");

        assert!(store.random_satisfied_channel("vip", "claude", 0).await.unwrap().is_none());
        assert!(store.random_satisfied_channel("premium", "gpt-4", 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_database_store_caches_until_invalidated() {
        let db = Arc::new(create_test_db().await.unwrap());
        let store = DatabaseChannelStore::new(Arc::clone(&db), Duration::from_secs(60), 100);

        assert!(store.random_satisfied_channel("vip", "gpt-4", 0).await.unwrap().is_none());
        insert_channel(&db, "late", "vip", "gpt-4", 1, 0).await.unwrap();
        assert!(store.random_satisfied_channel("vip", "gpt-4", 0).await.unwrap().is_none());

        store.invalidate_all();
        assert!(store.random_satisfied_channel("vip", "gpt-4", 0).await.unwrap().is_some());
    }
}
