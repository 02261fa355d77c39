//! # 请求上下文
//!
//! 单个请求内在认证、分发与渠道选择之间传递的键值上下文，键为强类型枚举。

use std::collections::HashMap;
use std::fmt;

/// 上下文键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    /// 令牌所属用户的分组
    UserGroup,
    /// 当前使用的分组
    UsingGroup,
    /// 最终选中的分组
    SelectedGroup,
    /// `auto` 分组展开后命中的分组
    AutoGroup,
    /// 是否经由倍率回退选中
    AutoSmartGroupUsed,
}

impl ContextKey {
    /// 键的字符串名
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserGroup => "user_group",
            Self::UsingGroup => "using_group",
            Self::SelectedGroup => "selected_group",
            Self::AutoGroup => "auto_group",
            Self::AutoSmartGroupUsed => "auto_smart_group_used",
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 上下文值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextValue {
    /// 文本值
    Text(String),
    /// 布尔标记
    Flag(bool),
}

/// 单个请求的上下文
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// 请求ID
    pub request_id: String,
    /// 用户ID
    pub user_id: i32,
    /// 令牌ID
    pub token_id: i32,
    values: HashMap<ContextKey, ContextValue>,
}

impl RequestContext {
    /// 创建上下文
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Self::default()
        }
    }

    /// 以用户分组初始化
    #[must_use]
    pub fn with_user_group(mut self, user_group: impl Into<String>) -> Self {
        self.set_text(ContextKey::UserGroup, user_group);
        self
    }

    /// 写入文本值
    pub fn set_text(&mut self, key: ContextKey, value: impl Into<String>) {
        self.values.insert(key, ContextValue::Text(value.into()));
    }

    /// 写入布尔值
    pub fn set_flag(&mut self, key: ContextKey, value: bool) {
        self.values.insert(key, ContextValue::Flag(value));
    }

    /// 读取文本值；未设置或为空时返回 `None`
    #[must_use]
    pub fn text(&self, key: ContextKey) -> Option<&str> {
        match self.values.get(&key) {
            Some(ContextValue::Text(value)) if !value.is_empty() => Some(value.as_str()),
            _ => None,
        }
    }

    /// 读取布尔值；未设置时为 `None`
    #[must_use]
    pub fn flag(&self, key: ContextKey) -> Option<bool> {
        match self.values.get(&key) {
            Some(ContextValue::Flag(value)) => Some(*value),
            _ => None,
        }
    }

    /// 用户分组，未设置时为空串
    #[must_use]
    pub fn user_group(&self) -> &str {
        self.text(ContextKey::UserGroup).unwrap_or_default()
    }

    /// 当前使用的分组
    #[must_use]
    pub fn using_group(&self) -> Option<&str> {
        self.text(ContextKey::UsingGroup)
    }

    /// 选中的分组
    #[must_use]
    pub fn selected_group(&self) -> Option<&str> {
        self.text(ContextKey::SelectedGroup)
    }

    /// `auto` 展开命中的分组
    #[must_use]
    pub fn auto_group(&self) -> Option<&str> {
        self.text(ContextKey::AutoGroup)
    }

    /// 是否由倍率回退选中
    #[must_use]
    pub fn auto_smart_group_used(&self) -> bool {
        self.flag(ContextKey::AutoSmartGroupUsed).unwrap_or(false)
    }

    /// 记录分组选择结果，空分组不写入
    pub fn record_selection(&mut self, group: &str, auto_smart: bool) {
        if group.is_empty() {
            return;
        }
        self.set_text(ContextKey::SelectedGroup, group);
        self.set_text(ContextKey::UsingGroup, group);
        self.set_flag(ContextKey::AutoSmartGroupUsed, auto_smart);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_selection_sets_all_keys() {
        let mut ctx = RequestContext::new("req").with_user_group("default");
        ctx.record_selection("vip", true);

        assert_eq!(ctx.selected_group(), Some("vip"));
        assert_eq!(ctx.using_group(), Some("vip"));
        assert!(ctx.auto_smart_group_used());
        assert_eq!(ctx.user_group(), "default");
    }

    #[test]
    fn test_record_selection_ignores_empty_group() {
        let mut ctx = RequestContext::new("req");
        ctx.record_selection("", false);
        assert_eq!(ctx.selected_group(), None);
        assert_eq!(ctx.flag(ContextKey::AutoSmartGroupUsed), None);
    }

    #[test]
    fn test_empty_text_reads_as_unset() {
        let mut ctx = RequestContext::new("req");
        ctx.set_text(ContextKey::UsingGroup, "");
        assert_eq!(ctx.using_group(), None);
        assert_eq!(ContextKey::AutoSmartGroupUsed.to_string(), "auto_smart_group_used");
    }
}
