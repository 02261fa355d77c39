//! # 令牌管理服务
//!
//! 令牌的增删改查。写入分组优先级前先做分组鉴权，再交给编解码规范化；
//! 任一步失败都不会修改数据库。

use chrono::Utc;
use entity::tokens::{self, NEVER_EXPIRES, TokenStatus};
use indexmap::IndexMap;
use rand::{Rng, distributions::Alphanumeric};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};

use super::pagination::PaginationParams;
use crate::auth::utils::TOKEN_KEY_PREFIX;
use crate::error::{Context, GroupError, ProxyError, Result};
use crate::groups::{
    GroupPriority, GroupSettings, GroupSettingsHandle, TokenGroups, collect_groups, ensure_accessible,
};
use crate::management::middleware::AuthContext;
use crate::management::response::PageData;
use crate::management::server::ManagementState;

/// 令牌名称的最大字符数
pub const MAX_TOKEN_NAME_CHARS: usize = 30;
/// 令牌密钥长度
pub const TOKEN_KEY_LENGTH: usize = 48;
/// 优先级写入失败的提示前缀
pub const PRIORITY_FAILURE_PREFIX: &str = "分组优先级设置失败: ";

/// 创建/更新令牌请求
///
/// `group_priorities_array` 优先于 `group_priorities`；数组缺失或为空且
/// `group_priorities` 显式传入空串时表示清空。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenRequest {
    /// 令牌ID，仅更新时使用
    pub id: i32,
    /// 令牌名称
    pub name: String,
    /// 目标状态码
    pub status: i32,
    /// 过期时间（秒），-1 表示永不过期
    pub expired_time: i64,
    /// 剩余额度
    pub remain_quota: i64,
    /// 是否无限额度
    pub unlimited_quota: bool,
    /// 是否启用模型限制
    pub model_limits_enabled: bool,
    /// 允许的模型，逗号分隔
    pub model_limits: String,
    /// 允许的来源IP
    pub allow_ips: Option<String>,
    /// 主分组
    pub group: String,
    /// 已序列化的列表，只用来表达清空意图
    pub group_priorities: Option<String>,
    /// 新的优先级列表
    pub group_priorities_array: Option<Vec<GroupPriority>>,
    /// 是否启用倍率回退
    pub auto_smart_group: bool,
}

impl Default for TokenRequest {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            status: 0,
            expired_time: NEVER_EXPIRES,
            remain_quota: 0,
            unlimited_quota: false,
            model_limits_enabled: false,
            model_limits: String::new(),
            allow_ips: None,
            group: String::new(),
            group_priorities: None,
            group_priorities_array: None,
            auto_smart_group: false,
        }
    }
}

/// 请求对已保存优先级列表的意图
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriorityIntent {
    /// 保持现有列表
    Keep,
    /// 替换为新列表
    Replace(Vec<GroupPriority>),
    /// 清空列表
    Clear,
}

impl TokenRequest {
    /// 解析请求对优先级列表的意图
    #[must_use]
    pub fn priority_intent(&self) -> PriorityIntent {
        match &self.group_priorities_array {
            Some(list) if !list.is_empty() => PriorityIntent::Replace(list.clone()),
            _ if self.group_priorities.as_deref() == Some("") => PriorityIntent::Clear,
            _ => PriorityIntent::Keep,
        }
    }

    fn trimmed_group(&self) -> String {
        self.group.trim().to_string()
    }
}

/// 令牌列表查询参数
#[derive(Debug, Default, Deserialize)]
pub struct TokenListQuery {
    /// 页码，从 1 开始
    pub p: Option<u64>,
    /// 每页条数
    pub page_size: Option<u64>,
}

/// 令牌搜索参数
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    /// 名称前缀
    pub keyword: Option<String>,
    /// 密钥片段，可带 `sk-` 前缀
    pub token: Option<String>,
}

/// 批量删除请求
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BatchDeleteRequest {
    /// 待删除的令牌ID
    pub ids: Vec<i32>,
}

/// 令牌用量
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TokenUsage {
    /// 固定为 `token_usage`
    pub object: String,
    /// 令牌名称
    pub name: String,
    /// 已用与剩余之和
    pub total_granted: i64,
    /// 已用额度
    pub total_used: i64,
    /// 剩余额度
    pub total_available: i64,
    /// 是否无限额度
    pub unlimited_quota: bool,
    /// 模型名 -> true
    pub model_limits: IndexMap<String, bool>,
    /// 是否启用模型限制
    pub model_limits_enabled: bool,
    /// 过期时间（秒），0 表示永不过期
    pub expires_at: i64,
}

impl From<&tokens::Model> for TokenUsage {
    fn from(token: &tokens::Model) -> Self {
        Self {
            object: "token_usage".to_string(),
            name: token.name.clone(),
            total_granted: token.remain_quota.saturating_add(token.used_quota),
            total_used: token.used_quota,
            total_available: token.remain_quota,
            unlimited_quota: token.unlimited_quota,
            model_limits: token
                .model_limit_list()
                .into_iter()
                .map(|model| (model.to_string(), true))
                .collect(),
            model_limits_enabled: token.model_limits_enabled,
            expires_at: token.expires_at_seconds(),
        }
    }
}

/// 生成 48 位字母数字令牌密钥
#[must_use]
pub fn generate_token_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_KEY_LENGTH)
        .map(char::from)
        .collect()
}

/// 按密钥查询令牌用量，密钥可带 `sk-` 前缀
pub async fn token_usage(db: &DatabaseConnection, key: &str) -> Result<TokenUsage> {
    let key = key.strip_prefix(TOKEN_KEY_PREFIX).unwrap_or(key);
    let token = tokens::Entity::find()
        .filter(tokens::Column::Key.eq(key))
        .one(db)
        .await
        .context("查询令牌失败")?
        .ok_or_else(|| ProxyError::business("无效的令牌"))?;
    Ok(TokenUsage::from(&token))
}

/// 令牌服务
pub struct TokenService<'a> {
    db: &'a DatabaseConnection,
    groups: &'a GroupSettingsHandle,
}

impl<'a> TokenService<'a> {
    /// 从应用状态借用数据库与分组设置
    #[must_use]
    pub fn new(state: &'a ManagementState) -> Self {
        Self {
            db: state.database.as_ref(),
            groups: &state.groups,
        }
    }

    /// 分页列出当前用户的令牌
    pub async fn list(&self, auth: &AuthContext, query: &TokenListQuery) -> Result<PageData<tokens::Model>> {
        let params = PaginationParams::new(query.p, query.page_size);
        let select = tokens::Entity::find().filter(tokens::Column::UserId.eq(auth.user_id));

        let total = select.clone().count(self.db).await.context("统计令牌失败")?;
        let items = select
            .order_by_desc(tokens::Column::Id)
            .offset(params.offset())
            .limit(params.page_size)
            .all(self.db)
            .await
            .context("查询令牌列表失败")?;

        Ok(PageData {
            page: params.page,
            page_size: params.page_size,
            total,
            items,
        })
    }

    /// 按名称前缀与密钥片段搜索
    pub async fn search(&self, auth: &AuthContext, query: &SearchQuery) -> Result<Vec<tokens::Model>> {
        let mut select = tokens::Entity::find().filter(tokens::Column::UserId.eq(auth.user_id));

        if let Some(keyword) = query.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            select = select.filter(tokens::Column::Name.starts_with(keyword));
        }
        if let Some(key) = query.token.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            let key = key.strip_prefix(TOKEN_KEY_PREFIX).unwrap_or(key);
            select = select.filter(tokens::Column::Key.contains(key));
        }

        select
            .order_by_desc(tokens::Column::Id)
            .all(self.db)
            .await
            .context("搜索令牌失败")
    }

    /// 获取单个令牌
    pub async fn get(&self, auth: &AuthContext, id: i32) -> Result<tokens::Model> {
        tokens::Entity::find_by_id(id)
            .filter(tokens::Column::UserId.eq(auth.user_id))
            .one(self.db)
            .await
            .context("查询令牌失败")?
            .ok_or_else(|| ProxyError::not_found("令牌", id.to_string()))
    }

    /// 创建令牌
    pub async fn create(&self, auth: &AuthContext, request: &TokenRequest) -> Result<tokens::Model> {
        ensure_name_length(&request.name)?;

        let now = Utc::now().timestamp();
        let mut token = tokens::Model {
            id: 0,
            user_id: auth.user_id,
            key: generate_token_key(),
            status: TokenStatus::Enabled.code(),
            name: request.name.clone(),
            created_time: now,
            accessed_time: now,
            expired_time: request.expired_time,
            remain_quota: request.remain_quota,
            used_quota: 0,
            unlimited_quota: request.unlimited_quota,
            model_limits_enabled: request.model_limits_enabled,
            model_limits: request.model_limits.clone(),
            allow_ips: request.allow_ips.clone(),
            group: request.trimmed_group(),
            group_priorities: String::new(),
            auto_smart_group: request.auto_smart_group,
        };

        let settings = self.groups.snapshot().await;
        // 新建令牌没有可清空的列表
        let intent = match request.priority_intent() {
            PriorityIntent::Clear => PriorityIntent::Keep,
            intent => intent,
        };
        apply_priority_intent(&mut token, intent, &settings, &auth.user_group)?;

        let active = tokens::ActiveModel {
            user_id: Set(token.user_id),
            key: Set(token.key),
            status: Set(token.status),
            name: Set(token.name),
            created_time: Set(token.created_time),
            accessed_time: Set(token.accessed_time),
            expired_time: Set(token.expired_time),
            remain_quota: Set(token.remain_quota),
            used_quota: Set(token.used_quota),
            unlimited_quota: Set(token.unlimited_quota),
            model_limits_enabled: Set(token.model_limits_enabled),
            model_limits: Set(token.model_limits),
            allow_ips: Set(token.allow_ips),
            group: Set(token.group),
            group_priorities: Set(token.group_priorities),
            auto_smart_group: Set(token.auto_smart_group),
            ..Default::default()
        };
        active.insert(self.db).await.context("创建令牌失败")
    }

    /// 更新令牌；`status_only` 时只修改状态
    pub async fn update(
        &self,
        auth: &AuthContext,
        request: &TokenRequest,
        status_only: bool,
    ) -> Result<tokens::Model> {
        ensure_name_length(&request.name)?;

        let current = self.get(auth, request.id).await?;
        if request.status == TokenStatus::Enabled.code() {
            ensure_can_enable(&current, Utc::now().timestamp())?;
        }

        let mut active: tokens::ActiveModel = current.clone().into();

        if status_only {
            if TokenStatus::from_code(request.status).is_none() {
                return Err(ProxyError::business("令牌状态无效"));
            }
            active.status = Set(request.status);
            return active.update(self.db).await.context("更新令牌状态失败");
        }

        let mut token = current;
        token.name.clone_from(&request.name);
        token.expired_time = request.expired_time;
        token.remain_quota = request.remain_quota;
        token.unlimited_quota = request.unlimited_quota;
        token.model_limits_enabled = request.model_limits_enabled;
        token.model_limits.clone_from(&request.model_limits);
        token.allow_ips.clone_from(&request.allow_ips);
        token.group = request.trimmed_group();
        token.auto_smart_group = request.auto_smart_group;

        let settings = self.groups.snapshot().await;
        apply_priority_intent(&mut token, request.priority_intent(), &settings, &auth.user_group)?;

        active.name = Set(token.name);
        active.expired_time = Set(token.expired_time);
        active.remain_quota = Set(token.remain_quota);
        active.unlimited_quota = Set(token.unlimited_quota);
        active.model_limits_enabled = Set(token.model_limits_enabled);
        active.model_limits = Set(token.model_limits);
        active.allow_ips = Set(token.allow_ips);
        active.group = Set(token.group);
        active.group_priorities = Set(token.group_priorities);
        active.auto_smart_group = Set(token.auto_smart_group);
        active.update(self.db).await.context("更新令牌失败")
    }

    /// 删除单个令牌
    pub async fn delete(&self, auth: &AuthContext, id: i32) -> Result<()> {
        let result = tokens::Entity::delete_many()
            .filter(tokens::Column::Id.eq(id))
            .filter(tokens::Column::UserId.eq(auth.user_id))
            .exec(self.db)
            .await
            .context("删除令牌失败")?;

        if result.rows_affected == 0 {
            return Err(ProxyError::not_found("令牌", id.to_string()));
        }
        Ok(())
    }

    /// 批量删除，返回删除数量
    pub async fn batch_delete(&self, auth: &AuthContext, request: &BatchDeleteRequest) -> Result<u64> {
        if request.ids.is_empty() {
            return Err(ProxyError::business("参数错误"));
        }

        let result = tokens::Entity::delete_many()
            .filter(tokens::Column::Id.is_in(request.ids.iter().copied()))
            .filter(tokens::Column::UserId.eq(auth.user_id))
            .exec(self.db)
            .await
            .context("批量删除令牌失败")?;
        Ok(result.rows_affected)
    }
}

fn ensure_name_length(name: &str) -> Result<()> {
    crate::ensure_business!(name.chars().count() <= MAX_TOKEN_NAME_CHARS, "令牌名称过长");
    Ok(())
}

/// 启用前的状态检查
fn ensure_can_enable(token: &tokens::Model, now: i64) -> Result<()> {
    match token.token_status() {
        Some(TokenStatus::Expired) if token.is_expired_at(now) => Err(ProxyError::business(
            "令牌已过期，无法启用，请先修改令牌过期时间，或者设置为永不过期",
        )),
        Some(TokenStatus::Exhausted) if token.is_quota_exhausted() => Err(ProxyError::business(
            "令牌可用额度已用尽，无法启用，请先修改令牌剩余额度，或者设置为无限额度",
        )),
        _ => Ok(()),
    }
}

/// 按意图鉴权并写入优先级列表，失败时令牌不变
fn apply_priority_intent(
    token: &mut tokens::Model,
    intent: PriorityIntent,
    settings: &GroupSettings,
    user_group: &str,
) -> Result<()> {
    match intent {
        PriorityIntent::Replace(list) => {
            ensure_accessible(settings, user_group, &collect_groups(&list))?;
            token
                .set_group_priorities(&list, settings.max_group_priorities)
                .map_err(|e| priority_failure(&e))?;
        }
        PriorityIntent::Clear => {
            token.clear_group_priorities();
            ensure_group_accessible(settings, user_group, &token.group)?;
        }
        PriorityIntent::Keep => {
            ensure_group_accessible(settings, user_group, &token.group)?;
            sync_primary_group(token)?;
        }
    }
    Ok(())
}

/// 保留已保存列表时，主分组跟随列表第一项
fn sync_primary_group(token: &mut tokens::Model) -> Result<()> {
    if token.group_priorities.is_empty() {
        return Ok(());
    }
    let list = token
        .group_priorities()
        .map_err(|e| priority_failure(&ProxyError::from(e)))?;
    if let Some(first) = list.first() {
        token.group.clone_from(&first.group);
    }
    Ok(())
}

fn ensure_group_accessible(
    settings: &GroupSettings,
    user_group: &str,
    group: &str,
) -> std::result::Result<(), GroupError> {
    if group.is_empty() {
        return Ok(());
    }
    ensure_accessible(settings, user_group, &[group])
}

fn priority_failure(error: &ProxyError) -> ProxyError {
    let detail = error
        .as_group_error()
        .map_or_else(|| error.to_string(), ToString::to_string);
    ProxyError::business(format!("{PRIORITY_FAILURE_PREFIX}{detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::token_model;
    use pretty_assertions::assert_eq;

    fn request_json(json: &str) -> TokenRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_priority_intent_three_way() {
        let replace = request_json(r#"{"group_priorities_array":[{"group":"vip","priority":1}]}"#);
        assert_eq!(
            replace.priority_intent(),
            PriorityIntent::Replace(vec![GroupPriority::new("vip", 1)])
        );

        let clear = request_json(r#"{"group_priorities_array":[],"group_priorities":""}"#);
        assert_eq!(clear.priority_intent(), PriorityIntent::Clear);

        let keep = request_json(r#"{"name":"t"}"#);
        assert_eq!(keep.priority_intent(), PriorityIntent::Keep);

        let keep_string = request_json(r#"{"group_priorities":"[{\"group\":\"vip\",\"priority\":1}]"}"#);
        assert_eq!(keep_string.priority_intent(), PriorityIntent::Keep);
    }

    #[test]
    fn test_request_defaults_never_expire() {
        let request = request_json("{}");
        assert_eq!(request.expired_time, NEVER_EXPIRES);
        assert!(request.group_priorities_array.is_none());
    }

    #[test]
    fn test_generated_key_shape() {
        let key = generate_token_key();
        assert_eq!(key.len(), TOKEN_KEY_LENGTH);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(key, generate_token_key());
    }

    #[test]
    fn test_name_length_counts_characters() {
        assert!(ensure_name_length(&"名".repeat(30)).is_ok());
        let err = ensure_name_length(&"a".repeat(31)).unwrap_err();
        assert_eq!(err.to_string(), "业务错误: 令牌名称过长");
    }

    #[test]
    fn test_enable_guards() {
        let now = 1_000;
        let mut expired = token_model("default");
        expired.status = TokenStatus::Expired.code();
        expired.expired_time = 500;
        assert!(ensure_can_enable(&expired, now).unwrap_err().to_string().contains("令牌已过期"));

        expired.expired_time = NEVER_EXPIRES;
        assert!(ensure_can_enable(&expired, now).is_ok());

        let mut exhausted = token_model("default");
        exhausted.status = TokenStatus::Exhausted.code();
        exhausted.unlimited_quota = false;
        exhausted.remain_quota = 0;
        assert!(ensure_can_enable(&exhausted, now).unwrap_err().to_string().contains("额度已用尽"));

        exhausted.unlimited_quota = true;
        assert!(ensure_can_enable(&exhausted, now).is_ok());
    }

    #[test]
    fn test_apply_intent_gate_runs_before_codec() {
        let settings = GroupSettings::default();
        let mut token = token_model("default");
        let before = token.clone();

        let err = apply_priority_intent(
            &mut token,
            PriorityIntent::Replace(vec![GroupPriority::new("svip", 1), GroupPriority::new("svip", 2)]),
            &settings,
            "default",
        )
        .unwrap_err();

        assert_eq!(err.as_group_error().map(ToString::to_string), Some("无权访问分组: svip".to_string()));
        assert_eq!(token, before);
    }

    #[test]
    fn test_apply_intent_codec_failure_is_prefixed() {
        let settings = GroupSettings::default();
        let mut token = token_model("default");

        let err = apply_priority_intent(
            &mut token,
            PriorityIntent::Replace(vec![GroupPriority::new("vip", 0)]),
            &settings,
            "default",
        )
        .unwrap_err();

        assert!(err.to_string().contains(PRIORITY_FAILURE_PREFIX));
        assert_eq!(token.group_priorities, "");
    }

    #[test]
    fn test_apply_intent_clear_reauthorizes_group() {
        let settings = GroupSettings::default();
        let mut token = token_model("svip");
        token.group_priorities = r#"[{"group":"svip","priority":1}]"#.to_string();

        let err = apply_priority_intent(&mut token, PriorityIntent::Clear, &settings, "default").unwrap_err();
        assert!(matches!(err.as_group_error(), Some(GroupError::UnauthorizedGroup { .. })));

        let mut token = token_model("vip");
        token.group_priorities = r#"[{"group":"vip","priority":1}]"#.to_string();
        apply_priority_intent(&mut token, PriorityIntent::Clear, &settings, "default").unwrap();
        assert_eq!(token.group_priorities, "");
        assert_eq!(token.group, "vip");
    }

    #[test]
    fn test_apply_intent_keep_follows_stored_list() {
        let settings = GroupSettings::default();
        let stored = r#"[{"group":"vip","priority":1},{"group":"default","priority":2}]"#;

        // 请求带了不同的主分组
        let mut token = token_model("default");
        token.group_priorities = stored.to_string();
        apply_priority_intent(&mut token, PriorityIntent::Keep, &settings, "default").unwrap();
        assert_eq!(token.group, "vip");
        assert_eq!(token.group_priorities, stored);

        // 请求未带主分组
        let mut token = token_model("");
        token.group_priorities = stored.to_string();
        apply_priority_intent(&mut token, PriorityIntent::Keep, &settings, "default").unwrap();
        assert_eq!(token.group, "vip");

        // 无列表时沿用请求的主分组
        let mut token = token_model("default");
        apply_priority_intent(&mut token, PriorityIntent::Keep, &settings, "default").unwrap();
        assert_eq!(token.group, "default");
    }

    #[test]
    fn test_apply_intent_keep_rejects_malformed_list() {
        let settings = GroupSettings::default();
        let mut token = token_model("default");
        token.group_priorities = "not-json".to_string();

        let err = apply_priority_intent(&mut token, PriorityIntent::Keep, &settings, "default").unwrap_err();
        assert!(err.to_string().contains(PRIORITY_FAILURE_PREFIX));
    }

    #[test]
    fn test_usage_from_token() {
        let mut token = token_model("default");
        token.name = "demo".to_string();
        token.remain_quota = 70;
        token.used_quota = 30;
        token.model_limits = "gpt-4, claude".to_string();
        token.model_limits_enabled = true;

        let usage = TokenUsage::from(&token);
        assert_eq!(usage.total_granted, 100);
        assert_eq!(usage.total_available, 70);
        assert_eq!(usage.expires_at, 0);
        assert_eq!(usage.model_limits.keys().collect::<Vec<_>>(), vec!["gpt-4", "claude"]);
    }

    #[test]
    fn test_usage_saturates_granted_total() {
        let mut token = token_model("default");
        token.remain_quota = i64::MAX;
        token.used_quota = 10;
        assert_eq!(TokenUsage::from(&token).total_granted, i64::MAX);
    }
}
