//! # 错误类型定义

use axum::http::StatusCode;
use thiserror::Error;

use super::{ErrorCategory, GroupError};

/// 应用主要错误类型
#[derive(Debug, Error)]
pub enum ProxyError {
    /// 配置相关错误
    #[error("配置错误: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 数据库相关错误
    #[error("数据库错误: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 认证和授权错误
    #[error("认证错误: {message}")]
    Auth {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 业务逻辑错误
    #[error("业务错误: {message}")]
    Business { message: String },

    /// 资源不存在
    #[error("资源未找到: {resource_type} {identifier}")]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    /// 系统内部错误
    #[error("内部错误: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// IO相关错误
    #[error("IO错误: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// 序列化/反序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// 服务器启动错误
    #[error("服务器启动错误: {message}")]
    ServerStart {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 分组优先级与渠道选择错误
    #[error(transparent)]
    Group(#[from] GroupError),

    /// 附加了上下文的错误
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<ProxyError>,
    },
}

impl ProxyError {
    /// 将错误转换为HTTP状态码和错误代码
    #[must_use]
    pub fn to_http_response_parts(&self) -> (StatusCode, &str) {
        match self {
            Self::Config { .. } => (StatusCode::BAD_REQUEST, "CONFIG_ERROR"),
            Self::Database { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            Self::Auth { .. } => (StatusCode::UNAUTHORIZED, "AUTH_ERROR"),
            Self::Business { .. } => (StatusCode::BAD_REQUEST, "BUSINESS_ERROR"),
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, "RESOURCE_NOT_FOUND"),
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            Self::Io { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Self::Serialization { .. } => (StatusCode::BAD_REQUEST, "SERIALIZATION_ERROR"),
            Self::ServerStart { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "SERVER_START_ERROR"),
            Self::Group(err) => match err {
                GroupError::InvalidPriorityList { .. } => {
                    (StatusCode::BAD_REQUEST, "INVALID_GROUP_PRIORITIES")
                }
                GroupError::UnauthorizedGroup { .. } => (StatusCode::FORBIDDEN, "GROUP_FORBIDDEN"),
                GroupError::MalformedPriorityList { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "MALFORMED_GROUP_PRIORITIES")
                }
                GroupError::AutoGroupsDisabled
                | GroupError::AllGroupsFailed
                | GroupError::NoAvailableFallbackGroup
                | GroupError::NoChannelAvailable { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "NO_AVAILABLE_CHANNEL")
                }
            },
            Self::Context { source, .. } => source.to_http_response_parts(),
        }
    }

    /// 错误归属（客户端或服务端）
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        if self.to_http_response_parts().0.is_client_error() {
            ErrorCategory::Client
        } else {
            ErrorCategory::Server
        }
    }

    /// 返回最内层的分组错误（穿透上下文包装）
    #[must_use]
    pub fn as_group_error(&self) -> Option<&GroupError> {
        match self {
            Self::Group(err) => Some(err),
            Self::Context { source, .. } => source.as_group_error(),
            _ => None,
        }
    }

    /// 创建配置错误
    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带来源的配置错误
    pub fn config_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建数据库错误
    pub fn database<T: Into<String>>(message: T) -> Self {
        Self::Database {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带来源的数据库错误
    pub fn database_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Database {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建认证错误
    pub fn auth<T: Into<String>>(message: T) -> Self {
        Self::Auth {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带来源的认证错误
    pub fn auth_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Auth {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建业务错误
    pub fn business<T: Into<String>>(message: T) -> Self {
        Self::Business {
            message: message.into(),
        }
    }

    /// 创建资源未找到错误
    pub fn not_found<T: Into<String>, I: Into<String>>(resource_type: T, identifier: I) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            identifier: identifier.into(),
        }
    }

    /// 创建带来源的内部错误
    pub fn internal_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建带来源的服务器启动错误
    pub fn server_start_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::ServerStart {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

// 自动转换常见错误类型
impl From<std::io::Error> for ProxyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: "文件操作失败".to_string(),
            source: err,
        }
    }
}

impl From<toml::de::Error> for ProxyError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_with_source("TOML解析失败", err)
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: "JSON处理失败".to_string(),
            source: err.into(),
        }
    }
}

impl From<sea_orm::error::DbErr> for ProxyError {
    fn from(err: sea_orm::error::DbErr) -> Self {
        Self::database_with_source("数据库操作失败", err)
    }
}

impl From<jsonwebtoken::errors::Error> for ProxyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::auth_with_source("JWT处理失败", err)
    }
}

impl From<notify::Error> for ProxyError {
    fn from(err: notify::Error) -> Self {
        Self::config_with_source("配置文件监听失败", err)
    }
}
