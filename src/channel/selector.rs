//! # 渠道选择器
//!
//! 按令牌的分组优先级依次向渠道存储请求渠道；显式优先级全部失败且令牌开启
//! `auto_smart_group` 时，再按倍率从低到高尝试用户其余可用分组。

use entity::{channels, tokens};
use std::sync::Arc;

use super::context::{ContextKey, RequestContext};
use super::store::ChannelStore;
use crate::error::{GroupError, Result};
use crate::groups::{GroupPriority, GroupSettings, GroupSettingsHandle, TokenGroups};
use crate::groups::{auto_groups_for, usable_groups};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror, linfo, lwarn};

/// `auto` 分组标记
pub const AUTO_GROUP: &str = "auto";

/// 渠道选择器
#[derive(Clone)]
pub struct ChannelSelector {
    store: Arc<dyn ChannelStore>,
    settings: GroupSettingsHandle,
}

impl ChannelSelector {
    /// 以渠道存储与分组设置句柄创建
    pub fn new(store: Arc<dyn ChannelStore>, settings: GroupSettingsHandle) -> Self {
        Self { store, settings }
    }

    /// 为令牌选择渠道，返回渠道与选中的分组，并把选择结果写入上下文
    pub async fn select_channel(
        &self,
        ctx: &mut RequestContext,
        token: &tokens::Model,
        model: &str,
        retry: u32,
    ) -> Result<(channels::Model, String)> {
        let settings = self.settings.snapshot().await;

        let priorities = match token.group_priorities() {
            Ok(priorities) => priorities,
            Err(err) => {
                lerror!(
                    &ctx.request_id,
                    LogStage::Scheduling,
                    LogComponent::Selector,
                    "parse_group_priorities_fail",
                    &format!("Failed to parse group priorities: {err}"),
                    token_id = token.id
                );
                let fallback = ctx.using_group().unwrap_or(&token.group).to_string();
                return self.select_single_group(ctx, &settings, &fallback, model, retry).await;
            }
        };

        if priorities.is_empty() {
            let base = ctx
                .using_group()
                .or_else(|| Some(token.group.as_str()).filter(|g| !g.is_empty()))
                .unwrap_or_else(|| ctx.user_group())
                .to_string();
            return self.select_single_group(ctx, &settings, &base, model, retry).await;
        }

        for GroupPriority { group, priority } in &priorities {
            ldebug!(
                &ctx.request_id,
                LogStage::Scheduling,
                LogComponent::Selector,
                "try_group",
                &format!("Trying group: {group} (priority: {priority})")
            );

            match self.attempt_group(ctx, &settings, group, model, retry).await {
                Ok(Some((channel, selected))) => {
                    linfo!(
                        &ctx.request_id,
                        LogStage::Scheduling,
                        LogComponent::Selector,
                        "group_selected",
                        &format!("Selected channel from group: {selected}"),
                        channel_id = channel.id
                    );
                    ctx.record_selection(&selected, false);
                    return Ok((channel, selected));
                }
                Ok(None) => {
                    ldebug!(
                        &ctx.request_id,
                        LogStage::Scheduling,
                        LogComponent::Selector,
                        "group_empty",
                        &format!("Group {group} has no channel for model {model}")
                    );
                }
                Err(err) => {
                    ldebug!(
                        &ctx.request_id,
                        LogStage::Scheduling,
                        LogComponent::Selector,
                        "group_failed",
                        &format!("Group {group} failed: {err}")
                    );
                }
            }
        }

        lwarn!(
            &ctx.request_id,
            LogStage::Scheduling,
            LogComponent::Selector,
            "all_groups_failed",
            "All configured groups failed",
            token_id = token.id
        );

        if !token.auto_smart_group {
            return Err(GroupError::AllGroupsFailed.into());
        }

        linfo!(
            &ctx.request_id,
            LogStage::Scheduling,
            LogComponent::Selector,
            "ratio_fallback",
            "Auto smart group enabled, trying fallback groups by ratio"
        );
        self.select_by_ratio(ctx, &settings, model, retry, &priorities).await
    }

    /// 只尝试一个分组：无渠道时报告 `NoChannelAvailable`，存储错误原样返回
    async fn select_single_group(
        &self,
        ctx: &mut RequestContext,
        settings: &GroupSettings,
        group: &str,
        model: &str,
        retry: u32,
    ) -> Result<(channels::Model, String)> {
        match self.attempt_group(ctx, settings, group, model, retry).await? {
            Some((channel, selected)) => {
                ctx.record_selection(&selected, false);
                Ok((channel, selected))
            }
            None => Err(GroupError::NoChannelAvailable {
                group: group.to_string(),
                model: model.to_string(),
            }
            .into()),
        }
    }

    /// 向存储请求一个分组的渠道；`auto` 分组按用户的自动分组顺序展开
    async fn attempt_group(
        &self,
        ctx: &mut RequestContext,
        settings: &GroupSettings,
        group: &str,
        model: &str,
        retry: u32,
    ) -> Result<Option<(channels::Model, String)>> {
        if group != AUTO_GROUP {
            let channel = self.store.random_satisfied_channel(group, model, retry).await?;
            return Ok(channel.map(|channel| (channel, group.to_string())));
        }

        if !settings.auto_groups_enabled() {
            return Err(GroupError::AutoGroupsDisabled.into());
        }

        for auto_group in auto_groups_for(settings, ctx.user_group()) {
            ldebug!(
                &ctx.request_id,
                LogStage::Scheduling,
                LogComponent::Selector,
                "auto_group_try",
                &format!("Auto selecting group: {auto_group}")
            );
            match self.store.random_satisfied_channel(&auto_group, model, retry).await {
                Ok(Some(channel)) => {
                    ldebug!(
                        &ctx.request_id,
                        LogStage::Scheduling,
                        LogComponent::Selector,
                        "auto_group_selected",
                        &format!("Auto selected group: {auto_group}")
                    );
                    ctx.set_text(ContextKey::AutoGroup, auto_group.as_str());
                    return Ok(Some((channel, auto_group)));
                }
                Ok(None) => {}
                Err(err) => {
                    ldebug!(
                        &ctx.request_id,
                        LogStage::Scheduling,
                        LogComponent::Selector,
                        "auto_group_failed",
                        &format!("Auto group {auto_group} failed: {err}")
                    );
                }
            }
        }
        Ok(None)
    }

    /// 按倍率从低到高尝试未出现在优先级列表中的可用分组
    async fn select_by_ratio(
        &self,
        ctx: &mut RequestContext,
        settings: &GroupSettings,
        model: &str,
        retry: u32,
        excluded: &[GroupPriority],
    ) -> Result<(channels::Model, String)> {
        let candidates = ratio_candidates(settings, ctx.user_group(), excluded);
        if candidates.is_empty() {
            return Err(GroupError::NoAvailableFallbackGroup.into());
        }

        for (group, ratio) in &candidates {
            ldebug!(
                &ctx.request_id,
                LogStage::Scheduling,
                LogComponent::Selector,
                "ratio_try",
                &format!("Auto smart group trying: {group} (ratio: {ratio:.2})")
            );

            match self.attempt_group(ctx, settings, group, model, retry).await {
                Ok(Some((channel, selected))) => {
                    linfo!(
                        &ctx.request_id,
                        LogStage::Scheduling,
                        LogComponent::Selector,
                        "ratio_selected",
                        &format!("Auto smart group selected: {selected}"),
                        channel_id = channel.id
                    );
                    ctx.record_selection(&selected, true);
                    return Ok((channel, selected));
                }
                Ok(None) => {}
                Err(err) => {
                    ldebug!(
                        &ctx.request_id,
                        LogStage::Scheduling,
                        LogComponent::Selector,
                        "ratio_group_failed",
                        &format!("Auto smart group {group} failed: {err}")
                    );
                }
            }
        }

        Err(GroupError::AllGroupsFailed.into())
    }
}

/// 回退候选：用户可用且有倍率、不在排除列表中的分组，按倍率稳定升序
#[must_use]
pub fn ratio_candidates(
    settings: &GroupSettings,
    user_group: &str,
    excluded: &[GroupPriority],
) -> Vec<(String, f64)> {
    let mut candidates: Vec<(String, f64)> = usable_groups(settings, user_group)
        .into_keys()
        .filter(|group| !excluded.iter().any(|p| &p.group == group))
        .filter_map(|group| settings.ratio(&group).map(|ratio| (group, ratio)))
        .collect();
    candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::store::MockChannelStore;
    use crate::error::ProxyError;
    use crate::testing::fixtures::{channel_model, token_model};
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    fn settings() -> GroupSettings {
        GroupSettings {
            max_group_priorities: 32,
            auto_groups: vec!["standard".to_string(), "vip".to_string()],
            ratios: IndexMap::from([
                ("vip".to_string(), 1.0),
                ("standard".to_string(), 0.5),
                ("basic".to_string(), 2.0),
            ]),
            usable_groups: IndexMap::from([
                ("primary".to_string(), String::new()),
                ("vip".to_string(), String::new()),
                ("standard".to_string(), String::new()),
                ("basic".to_string(), String::new()),
            ]),
            special_usable_groups: IndexMap::new(),
        }
    }

    /// 只有 `serving` 中的分组能返回渠道，其余分组返回存储错误；记录调用顺序
    fn store_serving(serving: &'static [&'static str], calls: Arc<Mutex<Vec<String>>>) -> MockChannelStore {
        let mut store = MockChannelStore::new();
        store
            .expect_random_satisfied_channel()
            .returning(move |group, model, _| {
                calls.lock().unwrap().push(group.to_string());
                if serving.iter().any(|served| *served == group) {
                    Ok(Some(channel_model(1, group, model, 0, 0)))
                } else {
                    Err(ProxyError::database("store unavailable"))
                }
            });
        store
    }

    fn selector(store: MockChannelStore, settings: GroupSettings) -> ChannelSelector {
        ChannelSelector::new(Arc::new(store), GroupSettingsHandle::new(settings))
    }

    fn with_priorities(json: &str, auto_smart: bool) -> tokens::Model {
        let mut token = token_model("default");
        token.group_priorities = json.to_string();
        token.auto_smart_group = auto_smart;
        token
    }

    #[tokio::test]
    async fn test_first_priority_hit() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = selector(store_serving(&["vip"], Arc::clone(&calls)), settings());
        let token = with_priorities(
            r#"[{"group":"vip","priority":1},{"group":"standard","priority":2}]"#,
            false,
        );
        let mut ctx = RequestContext::new("req").with_user_group("primary");

        let (channel, group) = selector.select_channel(&mut ctx, &token, "gpt-4", 0).await.unwrap();

        assert_eq!(group, "vip");
        assert_eq!(channel.groups, "vip");
        assert_eq!(ctx.selected_group(), Some("vip"));
        assert_eq!(ctx.using_group(), Some("vip"));
        assert_eq!(ctx.flag(ContextKey::AutoSmartGroupUsed), Some(false));
        assert_eq!(*calls.lock().unwrap(), vec!["vip"]);
    }

    #[tokio::test]
    async fn test_walks_in_priority_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = selector(store_serving(&["basic"], Arc::clone(&calls)), settings());
        let token = with_priorities(
            r#"[{"group":"basic","priority":3},{"group":"vip","priority":1},{"group":"standard","priority":2}]"#,
            false,
        );
        let mut ctx = RequestContext::new("req").with_user_group("primary");

        let (_, group) = selector.select_channel(&mut ctx, &token, "gpt-4", 0).await.unwrap();

        assert_eq!(group, "basic");
        assert_eq!(*calls.lock().unwrap(), vec!["vip", "standard", "basic"]);
    }

    #[tokio::test]
    async fn test_ratio_fallback_picks_cheapest_unlisted_group() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = selector(store_serving(&["standard"], Arc::clone(&calls)), settings());
        let token = with_priorities(r#"[{"group":"primary","priority":1}]"#, true);
        let mut ctx = RequestContext::new("req").with_user_group("primary");

        let (_, group) = selector.select_channel(&mut ctx, &token, "gpt-4", 0).await.unwrap();

        assert_eq!(group, "standard");
        assert!(ctx.auto_smart_group_used());
        assert_eq!(ctx.selected_group(), Some("standard"));
        assert_eq!(*calls.lock().unwrap(), vec!["primary", "standard"]);
    }

    #[tokio::test]
    async fn test_ratio_fallback_continues_by_ascending_ratio() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = selector(store_serving(&["basic"], Arc::clone(&calls)), settings());
        let token = with_priorities(r#"[{"group":"primary","priority":1}]"#, true);
        let mut ctx = RequestContext::new("req").with_user_group("primary");

        let (_, group) = selector.select_channel(&mut ctx, &token, "gpt-4", 0).await.unwrap();

        assert_eq!(group, "basic");
        assert_eq!(*calls.lock().unwrap(), vec!["primary", "standard", "vip", "basic"]);
    }

    #[tokio::test]
    async fn test_all_fail_without_auto_smart() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = selector(store_serving(&["standard"], Arc::clone(&calls)), settings());
        let token = with_priorities(r#"[{"group":"primary","priority":1}]"#, false);
        let mut ctx = RequestContext::new("req").with_user_group("primary");

        let err = selector.select_channel(&mut ctx, &token, "gpt-4", 0).await.unwrap_err();

        assert!(matches!(err.as_group_error(), Some(GroupError::AllGroupsFailed)));
        assert_eq!(*calls.lock().unwrap(), vec!["primary"]);
        assert_eq!(ctx.selected_group(), None);
    }

    #[tokio::test]
    async fn test_no_fallback_candidates() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = selector(store_serving(&[], Arc::clone(&calls)), settings());
        let token = with_priorities(
            r#"[{"group":"primary","priority":1},{"group":"vip","priority":2},{"group":"standard","priority":3},{"group":"basic","priority":4}]"#,
            true,
        );
        let mut ctx = RequestContext::new("req").with_user_group("primary");

        let err = selector.select_channel(&mut ctx, &token, "gpt-4", 0).await.unwrap_err();
        assert!(matches!(err.as_group_error(), Some(GroupError::NoAvailableFallbackGroup)));
    }

    #[tokio::test]
    async fn test_fallback_all_fail() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = selector(store_serving(&[], Arc::clone(&calls)), settings());
        let token = with_priorities(r#"[{"group":"primary","priority":1}]"#, true);
        let mut ctx = RequestContext::new("req").with_user_group("primary");

        let err = selector.select_channel(&mut ctx, &token, "gpt-4", 0).await.unwrap_err();
        assert!(matches!(err.as_group_error(), Some(GroupError::AllGroupsFailed)));
        assert_eq!(calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_malformed_priorities_attempt_one_group() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = selector(store_serving(&[], Arc::clone(&calls)), settings());
        let mut token = with_priorities("{broken", true);
        token.group = "vip".to_string();
        let mut ctx = RequestContext::new("req").with_user_group("primary");

        let err = selector.select_channel(&mut ctx, &token, "gpt-4", 0).await.unwrap_err();

        // 存储错误原样返回
        assert!(matches!(err, ProxyError::Database { .. }));
        assert_eq!(*calls.lock().unwrap(), vec!["vip"]);
    }

    #[tokio::test]
    async fn test_malformed_priorities_prefer_using_group() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = selector(store_serving(&["standard"], Arc::clone(&calls)), settings());
        let token = with_priorities("[1,2", false);
        let mut ctx = RequestContext::new("req").with_user_group("primary");
        ctx.set_text(ContextKey::UsingGroup, "standard");

        let (_, group) = selector.select_channel(&mut ctx, &token, "gpt-4", 0).await.unwrap();
        assert_eq!(group, "standard");
        assert_eq!(*calls.lock().unwrap(), vec!["standard"]);
    }

    #[tokio::test]
    async fn test_empty_list_uses_user_group_as_base() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = selector(store_serving(&["primary"], Arc::clone(&calls)), settings());
        let token = token_model("");
        let mut ctx = RequestContext::new("req").with_user_group("primary");

        let (_, group) = selector.select_channel(&mut ctx, &token, "gpt-4", 0).await.unwrap();
        assert_eq!(group, "primary");
        assert!(!ctx.auto_smart_group_used());
    }

    #[tokio::test]
    async fn test_single_group_miss_reports_no_channel() {
        let mut store = MockChannelStore::new();
        store.expect_random_satisfied_channel().returning(|_, _, _| Ok(None));
        let selector = selector(store, settings());
        let token = token_model("");
        let mut ctx = RequestContext::new("req").with_user_group("vip");

        let err = selector.select_channel(&mut ctx, &token, "gpt-4", 0).await.unwrap_err();
        assert!(matches!(
            err.as_group_error(),
            Some(GroupError::NoChannelAvailable { group, model }) if group == "vip" && model == "gpt-4"
        ));
    }

    #[tokio::test]
    async fn test_retry_is_passed_through() {
        let mut store = MockChannelStore::new();
        store
            .expect_random_satisfied_channel()
            .times(1)
            .returning(|group, model, retry| {
                assert_eq!(retry, 3);
                Ok(Some(channel_model(7, group, model, 0, 0)))
            });
        let selector = selector(store, settings());
        let token = with_priorities(r#"[{"group":"vip","priority":1}]"#, false);
        let mut ctx = RequestContext::new("req").with_user_group("primary");

        let (channel, _) = selector.select_channel(&mut ctx, &token, "gpt-4", 3).await.unwrap();
        assert_eq!(channel.id, 7);
    }

    #[tokio::test]
    async fn test_auto_sentinel_expands_user_auto_groups() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let selector = selector(store_serving(&["vip"], Arc::clone(&calls)), settings());
        let token = with_priorities(r#"[{"group":"auto","priority":1}]"#, false);
        let mut ctx = RequestContext::new("req").with_user_group("primary");

        let (_, group) = selector.select_channel(&mut ctx, &token, "gpt-4", 0).await.unwrap();

        assert_eq!(group, "vip");
        assert_eq!(ctx.auto_group(), Some("vip"));
        assert_eq!(ctx.selected_group(), Some("vip"));
        assert_eq!(*calls.lock().unwrap(), vec!["standard", "vip"]);
    }

    #[tokio::test]
    async fn test_auto_sentinel_without_auto_groups() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut no_auto = settings();
        no_auto.auto_groups.clear();
        let selector = selector(store_serving(&["vip"], Arc::clone(&calls)), no_auto);
        let mut token = with_priorities("oops", false);
        token.group = AUTO_GROUP.to_string();
        let mut ctx = RequestContext::new("req").with_user_group("primary");

        let err = selector.select_channel(&mut ctx, &token, "gpt-4", 0).await.unwrap_err();
        assert!(matches!(err.as_group_error(), Some(GroupError::AutoGroupsDisabled)));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auto_in_middle_of_list_is_skipped_when_disabled() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut no_auto = settings();
        no_auto.auto_groups.clear();
        let selector = selector(store_serving(&["basic"], Arc::clone(&calls)), no_auto);
        let token = with_priorities(
            r#"[{"group":"auto","priority":1},{"group":"basic","priority":2}]"#,
            false,
        );
        let mut ctx = RequestContext::new("req").with_user_group("primary");

        let (_, group) = selector.select_channel(&mut ctx, &token, "gpt-4", 0).await.unwrap();
        assert_eq!(group, "basic");
    }

    #[test]
    fn test_ratio_candidates_are_stable_on_ties() {
        let mut settings = settings();
        settings.ratios.insert("primary".to_string(), 0.5);
        let candidates = ratio_candidates(&settings, "primary", &[GroupPriority::new("basic", 1)]);
        assert_eq!(
            candidates,
            vec![
                ("primary".to_string(), 0.5),
                ("standard".to_string(), 0.5),
                ("vip".to_string(), 1.0),
            ]
        );
    }
}
