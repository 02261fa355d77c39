//! # 分组模块
//!
//! 令牌分组优先级的编解码、分组访问控制以及进程级分组设置

pub mod access;
pub mod priority;
pub mod settings;

pub use access::{auto_groups_for, collect_groups, ensure_accessible, usable_groups};
pub use priority::{GroupPriority, TokenGroups, normalize_priorities};
pub use settings::{GroupSettings, GroupSettingsHandle};
