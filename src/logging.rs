//! # 日志配置模块
//!
//! 统一的结构化日志：阶段 + 组件 + 操作名，外加初始化订阅器

use std::env;
use std::fmt;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 日志所处的处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    /// 服务启动
    Startup,
    /// 服务关闭
    Shutdown,
    /// 配置加载与热重载
    Configuration,
    /// 数据库读写
    Db,
    /// 身份认证
    Authentication,
    /// 渠道调度
    Scheduling,
    /// 缓存读写
    Cache,
    /// 请求进入
    RequestStart,
    /// 后台任务
    BackgroundTask,
    /// 内部错误
    Internal,
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Configuration => "configuration",
            Self::Db => "db",
            Self::Authentication => "authentication",
            Self::Scheduling => "scheduling",
            Self::Cache => "cache",
            Self::RequestStart => "request_start",
            Self::BackgroundTask => "background_task",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// 产生日志的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogComponent {
    /// 进程入口
    Main,
    /// 配置管理
    Config,
    /// 数据库
    Database,
    /// 认证
    Auth,
    /// 令牌管理
    Token,
    /// 分组设置与权限
    Groups,
    /// 渠道选择器
    Selector,
    /// 渠道存储
    ChannelStore,
    /// 转发入口
    Relay,
    /// HTTP 服务装配
    ServerSetup,
}

impl fmt::Display for LogComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Main => "main",
            Self::Config => "config",
            Self::Database => "database",
            Self::Auth => "auth",
            Self::Token => "token",
            Self::Groups => "groups",
            Self::Selector => "selector",
            Self::ChannelStore => "channel_store",
            Self::Relay => "relay",
            Self::ServerSetup => "server_setup",
        };
        f.write_str(name)
    }
}

/// 结构化 info 日志
#[macro_export]
macro_rules! linfo {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(,)?) => {
        ::tracing::info!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}", $message
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr, $($fields:tt)+) => {
        ::tracing::info!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($fields)+,
            "{}", $message
        )
    };
}

/// 结构化 debug 日志
#[macro_export]
macro_rules! ldebug {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(,)?) => {
        ::tracing::debug!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}", $message
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr, $($fields:tt)+) => {
        ::tracing::debug!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($fields)+,
            "{}", $message
        )
    };
}

/// 结构化 warn 日志
#[macro_export]
macro_rules! lwarn {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(,)?) => {
        ::tracing::warn!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}", $message
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr, $($fields:tt)+) => {
        ::tracing::warn!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($fields)+,
            "{}", $message
        )
    };
}

/// 结构化 error 日志
#[macro_export]
macro_rules! lerror {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr $(,)?) => {
        ::tracing::error!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            "{}", $message
        )
    };
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $message:expr, $($fields:tt)+) => {
        ::tracing::error!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = $operation,
            $($fields)+,
            "{}", $message
        )
    };
}

/// 默认过滤规则：应用自身 debug，屏蔽 SQL 明细
#[must_use]
pub fn default_filter(level: &str) -> String {
    format!("{level},token_router=debug,sqlx::query=off,sea_orm::query=warn")
}

/// 初始化优化的日志系统
pub fn init_optimized_logging(log_level: Option<&String>) {
    let level = log_level.map_or("info", String::as_str);
    let log_filter = env::var("RUST_LOG").unwrap_or_else(|_| default_filter(level));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            tracing_fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();

    if env::var("RUST_LOG").is_ok_and(|v| v.contains("sqlx::query=info") || v.contains("sqlx::query=debug")) {
        tracing::info!("🔍 SQLx database query logging enabled");
    } else {
        tracing::info!("📋 SQLx database query logging disabled for production performance");
    }
}
