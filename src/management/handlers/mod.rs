//! # 管理端请求处理器

pub mod tokens;
pub mod usage;
