//! # 测试数据 Fixtures
//!
//! 提供测试用的数据结构和预设数据

use chrono::Utc;
use entity::{channels, tokens, users};
use entity::tokens::{NEVER_EXPIRES, TokenStatus};
use sea_orm::Set;

/// 未入库的令牌模型，主分组为 `group`
#[must_use]
pub fn token_model(group: &str) -> tokens::Model {
    tokens::Model {
        id: 1,
        user_id: 1,
        key: "testkey0000000000000000000000000000000000000000".to_string(),
        status: TokenStatus::Enabled.code(),
        name: "test-token".to_string(),
        created_time: 0,
        accessed_time: 0,
        expired_time: NEVER_EXPIRES,
        remain_quota: 0,
        used_quota: 0,
        unlimited_quota: true,
        model_limits_enabled: false,
        model_limits: String::new(),
        allow_ips: None,
        group: group.to_string(),
        group_priorities: String::new(),
        auto_smart_group: false,
    }
}

/// 未入库的渠道模型
#[must_use]
pub fn channel_model(id: i32, groups: &str, models: &str, weight: i32, priority: i64) -> channels::Model {
    let now = Utc::now().naive_utc();
    channels::Model {
        id,
        name: format!("channel-{id}"),
        groups: groups.to_string(),
        models: models.to_string(),
        status: channels::CHANNEL_STATUS_ENABLED,
        weight,
        priority,
        created_at: now,
        updated_at: now,
    }
}

/// 用户测试数据构建器
pub struct UserFixture {
    /// 用户名
    pub username: String,
    /// 用户分组
    pub user_group: String,
    /// 是否启用
    pub is_active: bool,
}

impl Default for UserFixture {
    fn default() -> Self {
        Self {
            username: "test_user".to_string(),
            user_group: "default".to_string(),
            is_active: true,
        }
    }
}

impl UserFixture {
    /// 默认启用的 `default` 分组用户
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置用户名
    #[must_use]
    pub fn username(mut self, username: &str) -> Self {
        self.username = username.to_string();
        self
    }

    /// 设置用户分组
    #[must_use]
    pub fn user_group(mut self, user_group: &str) -> Self {
        self.user_group = user_group.to_string();
        self
    }

    /// 设置为非激活状态
    #[must_use]
    pub const fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// 构建 `ActiveModel`
    #[must_use]
    pub fn build(self) -> users::ActiveModel {
        let now = Utc::now().naive_utc();
        users::ActiveModel {
            username: Set(self.username),
            user_group: Set(self.user_group),
            is_active: Set(self.is_active),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
    }
}

/// 令牌测试数据构建器
pub struct TokenFixture {
    model: tokens::Model,
}

impl TokenFixture {
    /// 属于 `user_id` 的启用令牌
    #[must_use]
    pub fn new(user_id: i32, key: &str) -> Self {
        let mut model = token_model("");
        model.user_id = user_id;
        model.key = key.to_string();
        Self { model }
    }

    /// 设置名称
    #[must_use]
    pub fn name(mut self, name: &str) -> Self {
        self.model.name = name.to_string();
        self
    }

    /// 设置主分组
    #[must_use]
    pub fn group(mut self, group: &str) -> Self {
        self.model.group = group.to_string();
        self
    }

    /// 直接写入已序列化的优先级列表
    #[must_use]
    pub fn group_priorities(mut self, raw: &str) -> Self {
        self.model.group_priorities = raw.to_string();
        self
    }

    /// 设置倍率回退开关
    #[must_use]
    pub const fn auto_smart_group(mut self, enabled: bool) -> Self {
        self.model.auto_smart_group = enabled;
        self
    }

    /// 设置状态
    #[must_use]
    pub const fn status(mut self, status: TokenStatus) -> Self {
        self.model.status = status.code();
        self
    }

    /// 设置过期时间（秒）
    #[must_use]
    pub const fn expired_time(mut self, expired_time: i64) -> Self {
        self.model.expired_time = expired_time;
        self
    }

    /// 设置有限额度
    #[must_use]
    pub const fn quota(mut self, remain: i64, used: i64) -> Self {
        self.model.remain_quota = remain;
        self.model.used_quota = used;
        self.model.unlimited_quota = false;
        self
    }

    /// 启用模型限制并设置允许的模型
    #[must_use]
    pub fn model_limits(mut self, limits: &str) -> Self {
        self.model.model_limits_enabled = true;
        self.model.model_limits = limits.to_string();
        self
    }

    /// 构建 `ActiveModel`（主键由数据库生成）
    #[must_use]
    pub fn build(self) -> tokens::ActiveModel {
        let m = self.model;
        tokens::ActiveModel {
            user_id: Set(m.user_id),
            key: Set(m.key),
            status: Set(m.status),
            name: Set(m.name),
            created_time: Set(m.created_time),
            accessed_time: Set(m.accessed_time),
            expired_time: Set(m.expired_time),
            remain_quota: Set(m.remain_quota),
            used_quota: Set(m.used_quota),
            unlimited_quota: Set(m.unlimited_quota),
            model_limits_enabled: Set(m.model_limits_enabled),
            model_limits: Set(m.model_limits),
            allow_ips: Set(m.allow_ips),
            group: Set(m.group),
            group_priorities: Set(m.group_priorities),
            auto_smart_group: Set(m.auto_smart_group),
            ..Default::default()
        }
    }
}
