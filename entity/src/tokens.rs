//! # 令牌实体定义
//!
//! 用户访问令牌表的 Sea-ORM 实体模型，包含分组优先级配置

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 令牌永不过期的标记值
pub const NEVER_EXPIRES: i64 = -1;

/// 令牌实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "tokens")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    #[sea_orm(unique)]
    pub key: String,
    pub status: i32,
    pub name: String,
    pub created_time: i64,
    pub accessed_time: i64,
    /// 过期时间（Unix 秒），-1 表示永不过期
    pub expired_time: i64,
    pub remain_quota: i64,
    pub used_quota: i64,
    pub unlimited_quota: bool,
    pub model_limits_enabled: bool,
    #[sea_orm(column_type = "Text")]
    pub model_limits: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub allow_ips: Option<String>,
    /// 主分组，与优先级列表中的第一项保持同步
    pub group: String,
    /// 分组优先级（JSON 数组字符串），空串表示未配置
    #[sea_orm(column_type = "Text")]
    pub group_priorities: String,
    pub auto_smart_group: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// 令牌状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenStatus {
    Enabled,
    Disabled,
    Expired,
    Exhausted,
}

impl TokenStatus {
    /// 数据库中存储的状态码
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Enabled => 1,
            Self::Disabled => 2,
            Self::Expired => 3,
            Self::Exhausted => 4,
        }
    }

    /// 从状态码解析，未知状态码返回 `None`
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Enabled),
            2 => Some(Self::Disabled),
            3 => Some(Self::Expired),
            4 => Some(Self::Exhausted),
            _ => None,
        }
    }
}

impl Model {
    /// 获取令牌状态
    #[must_use]
    pub const fn token_status(&self) -> Option<TokenStatus> {
        TokenStatus::from_code(self.status)
    }

    /// 在给定时间点是否已过期
    #[must_use]
    pub const fn is_expired_at(&self, now: i64) -> bool {
        self.expired_time != NEVER_EXPIRES && self.expired_time <= now
    }

    /// 额度是否已用尽
    #[must_use]
    pub const fn is_quota_exhausted(&self) -> bool {
        !self.unlimited_quota && self.remain_quota <= 0
    }

    /// 对外展示的过期时间（秒），永不过期时为 0
    #[must_use]
    pub const fn expires_at_seconds(&self) -> i64 {
        if self.expired_time == NEVER_EXPIRES {
            0
        } else {
            self.expired_time
        }
    }

    /// 解析模型限制列表
    pub fn model_limit_list(&self) -> Vec<&str> {
        self.model_limits
            .split(',')
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .collect()
    }
}
