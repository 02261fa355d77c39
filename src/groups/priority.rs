//! # 分组优先级编解码
//!
//! 令牌上的 `group_priorities` 列以 JSON 数组保存规范化后的优先级列表，
//! `group` 列始终与列表中优先级最高（数值最小）的分组保持一致。

use entity::tokens;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{GroupError, InvalidPriorityReason, Result};

/// 分组与其优先级，数值越小越先尝试
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPriority {
    /// 分组名
    pub group: String,
    /// 优先级（>= 1）
    pub priority: i64,
}

impl GroupPriority {
    /// 构造优先级项
    pub fn new(group: impl Into<String>, priority: i64) -> Self {
        Self {
            group: group.into(),
            priority,
        }
    }
}

/// 校验并规范化优先级列表：去除首尾空白，按优先级稳定升序
pub fn normalize_priorities(
    list: &[GroupPriority],
    max: usize,
) -> std::result::Result<Vec<GroupPriority>, GroupError> {
    if list.len() > max {
        return Err(GroupError::invalid(InvalidPriorityReason::TooMany {
            len: list.len(),
            max,
        }));
    }

    let mut seen = HashSet::with_capacity(list.len());
    let mut normalized = Vec::with_capacity(list.len());
    for (index, item) in list.iter().enumerate() {
        let group = item.group.trim();
        if group.is_empty() {
            return Err(GroupError::invalid(InvalidPriorityReason::EmptyGroup { index }));
        }
        if item.priority < 1 {
            return Err(GroupError::invalid(
                InvalidPriorityReason::NonPositivePriority {
                    group: group.to_string(),
                    priority: item.priority,
                },
            ));
        }
        if !seen.insert(group) {
            return Err(GroupError::invalid(InvalidPriorityReason::DuplicateGroup {
                group: group.to_string(),
            }));
        }
        normalized.push(GroupPriority::new(group, item.priority));
    }

    normalized.sort_by_key(|item| item.priority);
    Ok(normalized)
}

/// 令牌上的分组优先级读写
pub trait TokenGroups {
    /// 读取排好序的优先级列表
    ///
    /// 未保存列表时退化为 `[(group, 1)]`，两者皆空时返回空列表。
    fn group_priorities(&self) -> std::result::Result<Vec<GroupPriority>, GroupError>;

    /// 写入优先级列表并同步主分组；失败时令牌保持不变
    fn set_group_priorities(&mut self, list: &[GroupPriority], max: usize) -> Result<()>;

    /// 清空已保存的列表，主分组不变
    fn clear_group_priorities(&mut self);
}

impl TokenGroups for tokens::Model {
    fn group_priorities(&self) -> std::result::Result<Vec<GroupPriority>, GroupError> {
        if self.group_priorities.is_empty() {
            if self.group.is_empty() {
                return Ok(Vec::new());
            }
            return Ok(vec![GroupPriority::new(self.group.clone(), 1)]);
        }

        let mut list: Vec<GroupPriority> = serde_json::from_str(&self.group_priorities)
            .map_err(|source| GroupError::MalformedPriorityList { source })?;
        list.sort_by_key(|item| item.priority);
        Ok(list)
    }

    fn set_group_priorities(&mut self, list: &[GroupPriority], max: usize) -> Result<()> {
        if list.is_empty() {
            self.clear_group_priorities();
            return Ok(());
        }

        let normalized = normalize_priorities(list, max)?;
        let encoded = serde_json::to_string(&normalized)?;

        self.group_priorities = encoded;
        if let Some(first) = normalized.first() {
            self.group.clone_from(&first.group);
        }
        Ok(())
    }

    fn clear_group_priorities(&mut self) {
        self.group_priorities.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::token_model;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;

    fn gp(group: &str, priority: i64) -> GroupPriority {
        GroupPriority::new(group, priority)
    }

    #[test]
    fn test_set_sorts_and_syncs_primary_group() {
        let mut token = token_model("default");
        token
            .set_group_priorities(&[gp("standard", 3), gp("vip", 1), gp("basic", 2)], 32)
            .unwrap();

        assert_eq!(token.group, "vip");
        assert_eq!(
            token.group_priorities().unwrap(),
            vec![gp("vip", 1), gp("basic", 2), gp("standard", 3)]
        );
        assert_eq!(
            token.group_priorities,
            r#"[{"group":"vip","priority":1},{"group":"basic","priority":2},{"group":"standard","priority":3}]"#
        );
    }

    #[test]
    fn test_set_trims_and_keeps_tie_order() {
        let mut token = token_model("");
        token
            .set_group_priorities(&[gp("  b ", 2), gp("a", 2), gp(" c", 1)], 32)
            .unwrap();

        assert_eq!(token.group, "c");
        assert_eq!(
            token.group_priorities().unwrap(),
            vec![gp("c", 1), gp("b", 2), gp("a", 2)]
        );
    }

    #[test]
    fn test_set_empty_clears_and_keeps_group() {
        let mut token = token_model("default");
        token.set_group_priorities(&[gp("vip", 1)], 32).unwrap();
        token.set_group_priorities(&[], 32).unwrap();

        assert_eq!(token.group_priorities, "");
        assert_eq!(token.group, "vip");
        assert_eq!(token.group_priorities().unwrap(), vec![gp("vip", 1)]);
    }

    #[test]
    fn test_get_without_list() {
        assert_eq!(
            token_model("default").group_priorities().unwrap(),
            vec![gp("default", 1)]
        );
        assert!(token_model("").group_priorities().unwrap().is_empty());
    }

    #[test]
    fn test_get_sorts_unsorted_storage() {
        let mut token = token_model("x");
        token.group_priorities =
            r#"[{"group":"b","priority":5},{"group":"a","priority":1}]"#.to_string();
        assert_eq!(token.group_priorities().unwrap(), vec![gp("a", 1), gp("b", 5)]);
    }

    #[test]
    fn test_get_malformed() {
        let mut token = token_model("default");
        token.group_priorities = "{not json".to_string();
        assert!(matches!(
            token.group_priorities(),
            Err(GroupError::MalformedPriorityList { .. })
        ));
    }

    #[rstest]
    #[case::empty_group(vec![gp("", 1)], InvalidPriorityReason::EmptyGroup { index: 0 })]
    #[case::blank_group(vec![gp("vip", 1), gp("   ", 2)], InvalidPriorityReason::EmptyGroup { index: 1 })]
    #[case::zero_priority(
        vec![gp("vip", 0)],
        InvalidPriorityReason::NonPositivePriority { group: "vip".into(), priority: 0 }
    )]
    #[case::negative_priority(
        vec![gp("vip", -3)],
        InvalidPriorityReason::NonPositivePriority { group: "vip".into(), priority: -3 }
    )]
    #[case::duplicate(
        vec![gp("vip", 1), gp(" vip ", 2)],
        InvalidPriorityReason::DuplicateGroup { group: "vip".into() }
    )]
    fn test_set_rejects(#[case] list: Vec<GroupPriority>, #[case] expected: InvalidPriorityReason) {
        let mut token = token_model("default");
        let before = token.clone();

        let err = token.set_group_priorities(&list, 32).unwrap_err();
        match err.as_group_error() {
            Some(GroupError::InvalidPriorityList { reason }) => assert_eq!(*reason, expected),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(token, before);
    }

    #[test]
    fn test_set_rejects_too_many() {
        let list: Vec<_> = (1..=33).map(|i| gp(&format!("g{i}"), i)).collect();
        let mut token = token_model("default");

        let err = token.set_group_priorities(&list, 32).unwrap_err();
        assert!(matches!(
            err.as_group_error(),
            Some(GroupError::InvalidPriorityList {
                reason: InvalidPriorityReason::TooMany { len: 33, max: 32 }
            })
        ));
        assert_eq!(token.group_priorities, "");
        assert!(token.set_group_priorities(&list[..32], 32).is_ok());
    }

    fn distinct_list() -> impl Strategy<Value = Vec<GroupPriority>> {
        prop::collection::btree_set("[a-z]{1,8}", 1..12).prop_flat_map(|groups| {
            let groups: Vec<String> = groups.into_iter().collect();
            let len = groups.len();
            (
                Just(groups),
                prop::collection::vec(1i64..6, len),
                prop::collection::vec(0usize..3, len),
            )
                .prop_map(|(groups, priorities, pads)| {
                    groups
                        .into_iter()
                        .zip(priorities)
                        .zip(pads)
                        .map(|((group, priority), pad)| {
                            GroupPriority::new(format!("{}{group}", " ".repeat(pad)), priority)
                        })
                        .collect()
                })
        })
    }

    proptest! {
        #[test]
        fn prop_round_trip_is_stable_sort_of_trimmed(list in distinct_list()) {
            let mut token = token_model("seed");
            token.set_group_priorities(&list, 32).unwrap();

            let mut expected: Vec<GroupPriority> = list
                .iter()
                .map(|item| GroupPriority::new(item.group.trim(), item.priority))
                .collect();
            expected.sort_by_key(|item| item.priority);

            let stored = token.group_priorities().unwrap();
            prop_assert_eq!(&stored, &expected);
            prop_assert_eq!(&token.group, &expected[0].group);

            let encoded = token.group_priorities.clone();
            token.set_group_priorities(&stored, 32).unwrap();
            prop_assert_eq!(token.group_priorities, encoded);
        }
    }
}
