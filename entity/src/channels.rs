//! # 渠道实体定义
//!
//! 上游服务渠道表的 Sea-ORM 实体模型

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// 渠道启用状态码
pub const CHANNEL_STATUS_ENABLED: i32 = 1;

/// 渠道实体
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "channels")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    /// 所属分组，逗号分隔
    #[sea_orm(column_type = "Text")]
    pub groups: String,
    /// 支持的模型，逗号分隔
    #[sea_orm(column_type = "Text")]
    pub models: String,
    /// 1 启用，2 手动禁用，3 自动禁用
    pub status: i32,
    pub weight: i32,
    /// 数值越大越优先
    pub priority: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// 渠道是否启用
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.status == CHANNEL_STATUS_ENABLED
    }

    /// 所属分组列表
    pub fn group_list(&self) -> impl Iterator<Item = &str> {
        split_list(&self.groups)
    }

    /// 支持的模型列表
    pub fn model_list(&self) -> impl Iterator<Item = &str> {
        split_list(&self.models)
    }

    /// 是否能在指定分组下服务指定模型
    pub fn serves(&self, group: &str, model: &str) -> bool {
        self.group_list().any(|g| g == group) && self.model_list().any(|m| m == model)
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|item| !item.is_empty())
}
