//! # Token Router Library
//!
//! 多租户 AI 网关的令牌分组优先级管理与渠道选择

pub mod app;
pub mod auth;
pub mod channel;
pub mod config;
pub mod database;
pub mod error;
pub mod groups;
pub mod logging;
pub mod management;
pub mod relay;
pub mod testing;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{GroupError, ProxyError, Result};
