//! # 分组访问控制
//!
//! 计算用户可用分组，并在写入令牌前校验引用的分组是否越权。

use indexmap::{IndexMap, IndexSet};

use super::priority::GroupPriority;
use super::settings::GroupSettings;
use crate::error::GroupError;

/// 用户自身分组在可用分组表中的描述
pub const USER_GROUP_DESCRIPTION: &str = "用户分组";

/// 计算用户分组可使用的分组表（分组名 -> 描述），保持配置顺序
#[must_use]
pub fn usable_groups(settings: &GroupSettings, user_group: &str) -> IndexMap<String, String> {
    let mut groups = settings.usable_groups.clone();
    if user_group.is_empty() {
        return groups;
    }

    if let Some(rules) = settings.special_usable_groups.get(user_group) {
        for (rule, description) in rules {
            if let Some(removed) = rule.strip_prefix("-:") {
                groups.shift_remove(removed);
            } else if let Some(added) = rule.strip_prefix("+:") {
                groups.insert(added.to_string(), description.clone());
            } else {
                groups.insert(rule.clone(), description.clone());
            }
        }
    }

    if !groups.contains_key(user_group) {
        groups.insert(user_group.to_string(), USER_GROUP_DESCRIPTION.to_string());
    }
    groups
}

/// 用户可用的自动分组：按配置顺序过滤掉不可用的分组
#[must_use]
pub fn auto_groups_for(settings: &GroupSettings, user_group: &str) -> Vec<String> {
    let usable = usable_groups(settings, user_group);
    settings
        .auto_groups
        .iter()
        .filter(|group| usable.contains_key(group.as_str()))
        .cloned()
        .collect()
}

/// 校验所有分组均在用户可用范围内，空名称忽略，按输入顺序报告第一个越权分组
pub fn ensure_accessible<S: AsRef<str>>(
    settings: &GroupSettings,
    user_group: &str,
    groups: &[S],
) -> Result<(), GroupError> {
    if groups.is_empty() {
        return Ok(());
    }

    let usable = usable_groups(settings, user_group);
    for group in groups {
        let name = group.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        if !usable.contains_key(name) {
            return Err(GroupError::unauthorized(name));
        }
    }
    Ok(())
}

/// 提取优先级列表中的分组名（去空白、去空、去重，保持顺序）
#[must_use]
pub fn collect_groups(priorities: &[GroupPriority]) -> Vec<String> {
    priorities
        .iter()
        .map(|item| item.group.trim())
        .filter(|group| !group.is_empty())
        .collect::<IndexSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn settings() -> GroupSettings {
        let mut settings = GroupSettings::default();
        settings.usable_groups = IndexMap::from([
            ("default".to_string(), "默认分组".to_string()),
            ("standard".to_string(), "标准".to_string()),
        ]);
        settings.special_usable_groups.insert(
            "vip".to_string(),
            IndexMap::from([
                ("+:premium".to_string(), "高级".to_string()),
                ("-:default".to_string(), String::new()),
                ("standard".to_string(), "VIP 标准".to_string()),
            ]),
        );
        settings.auto_groups = vec!["premium".to_string(), "default".to_string(), "standard".to_string()];
        settings
    }

    #[test]
    fn test_usable_groups_plain_user() {
        let groups = usable_groups(&settings(), "default");
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["default", "standard"]);
    }

    #[test]
    fn test_usable_groups_applies_special_rules_and_own_group() {
        let groups = usable_groups(&settings(), "vip");
        assert_eq!(
            groups.keys().collect::<Vec<_>>(),
            vec!["standard", "premium", "vip"]
        );
        assert_eq!(groups["standard"], "VIP 标准");
        assert_eq!(groups["vip"], USER_GROUP_DESCRIPTION);
    }

    #[test]
    fn test_usable_groups_empty_user_group_is_global_table() {
        let settings = settings();
        assert_eq!(usable_groups(&settings, ""), settings.usable_groups);
    }

    #[test]
    fn test_auto_groups_filtered_by_usable_set() {
        assert_eq!(auto_groups_for(&settings(), "vip"), vec!["premium", "standard"]);
        assert_eq!(auto_groups_for(&settings(), "default"), vec!["default", "standard"]);
    }

    #[rstest]
    #[case::empty(&[], None)]
    #[case::allowed(&["default", "standard"], None)]
    #[case::blank_ignored(&["", "  ", "default"], None)]
    #[case::trimmed(&[" standard "], None)]
    #[case::first_offender(&["default", "unknown", "other"], Some("unknown"))]
    fn test_ensure_accessible(#[case] groups: &[&str], #[case] rejected: Option<&str>) {
        let result = ensure_accessible(&settings(), "default", groups);
        match rejected {
            None => assert!(result.is_ok()),
            Some(name) => {
                let err = result.unwrap_err();
                assert_eq!(err.to_string(), format!("无权访问分组: {name}"));
            }
        }
    }

    #[test]
    fn test_collect_groups_dedups_in_order() {
        let list = vec![
            GroupPriority::new(" vip", 2),
            GroupPriority::new("", 1),
            GroupPriority::new("basic", 3),
            GroupPriority::new("vip ", 4),
        ];
        assert_eq!(collect_groups(&list), vec!["vip", "basic"]);
    }
}
