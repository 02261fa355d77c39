//! # 分组与渠道选择错误
//!
//! 优先级编解码、分组鉴权与渠道选择共用的错误类型

use thiserror::Error;

/// 优先级列表校验失败的具体原因
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidPriorityReason {
    /// 去除空白后分组名为空
    #[error("第 {index} 项分组名称为空")]
    EmptyGroup { index: usize },

    /// 优先级小于 1
    #[error("分组 {group} 的优先级必须大于等于 1，当前为 {priority}")]
    NonPositivePriority { group: String, priority: i64 },

    /// 分组重复
    #[error("分组 {group} 重复")]
    DuplicateGroup { group: String },

    /// 超出数量上限
    #[error("分组数量 {len} 超过上限 {max}")]
    TooMany { len: usize, max: usize },
}

/// 分组核心错误
#[derive(Debug, Error)]
pub enum GroupError {
    /// 写入的优先级列表不合法
    #[error("{reason}")]
    InvalidPriorityList { reason: InvalidPriorityReason },

    /// 已存储的优先级 JSON 无法解析
    #[error("分组优先级数据无法解析: {source}")]
    MalformedPriorityList {
        #[source]
        source: serde_json::Error,
    },

    /// 引用了用户无权使用的分组
    #[error("无权访问分组: {name}")]
    UnauthorizedGroup { name: String },

    /// 使用了 auto 分组但未配置自动分组
    #[error("auto groups is not enabled")]
    AutoGroupsDisabled,

    /// 所有尝试的分组均无可用渠道
    #[error("all configured groups failed")]
    AllGroupsFailed,

    /// 比率回退没有候选分组
    #[error("no available fallback group")]
    NoAvailableFallbackGroup,

    /// 单个分组下没有满足模型的渠道
    #[error("分组 {group} 下没有可用于模型 {model} 的渠道")]
    NoChannelAvailable { group: String, model: String },
}

impl GroupError {
    /// 构造校验错误
    #[must_use]
    pub const fn invalid(reason: InvalidPriorityReason) -> Self {
        Self::InvalidPriorityList { reason }
    }

    /// 构造越权错误
    pub fn unauthorized(name: impl Into<String>) -> Self {
        Self::UnauthorizedGroup { name: name.into() }
    }

    /// 是否属于选择阶段的"无渠道"类错误
    #[must_use]
    pub const fn is_selection_failure(&self) -> bool {
        matches!(
            self,
            Self::AllGroupsFailed
                | Self::NoAvailableFallbackGroup
                | Self::NoChannelAvailable { .. }
                | Self::AutoGroupsDisabled
        )
    }
}
