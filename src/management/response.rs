//! # API 响应结构
//!
//! 管理端统一使用 `{success, message, data?}` 信封，业务拒绝同样返回 HTTP 200

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCategory, ProxyError};

/// # 标准响应信封
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// 是否成功
    pub success: bool,
    /// 提示信息，成功时为空
    pub message: String,
    /// 响应数据
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// # 分页数据
#[derive(Debug, Serialize, Deserialize)]
pub struct PageData<T> {
    /// 当前页码
    pub page: u64,
    /// 每页条数
    pub page_size: u64,
    /// 总条数
    pub total: u64,
    /// 当前页数据
    pub items: Vec<T>,
}

/// # API响应枚举
///
/// 统一所有API出口，方便转换为 `axum::response::Response`
#[derive(Debug)]
pub enum ApiResponse<T: Serialize> {
    Success(T),
    SuccessWithoutData,
    Rejected(String),
    Error(StatusCode, String),
    AppError(ProxyError),
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            Self::Success(data) => envelope(StatusCode::OK, true, String::new(), Some(data)),
            Self::SuccessWithoutData => envelope::<()>(StatusCode::OK, true, String::new(), None),
            Self::Rejected(message) => envelope::<()>(StatusCode::OK, false, message, None),
            Self::Error(status, message) => envelope::<()>(status, false, message, None),
            Self::AppError(error) => {
                let (status, _) = error.to_http_response_parts();
                let status = match error.category() {
                    // 业务拒绝走 200，认证失败保留 401
                    ErrorCategory::Client if status != StatusCode::UNAUTHORIZED => StatusCode::OK,
                    _ => status,
                };
                envelope::<()>(status, false, user_message(&error), None)
            }
        }
    }
}

fn envelope<T: Serialize>(status: StatusCode, success: bool, message: String, data: Option<T>) -> Response {
    (status, Json(Envelope { success, message, data })).into_response()
}

/// 面向用户的错误消息，业务与分组错误不带分类前缀
fn user_message(error: &ProxyError) -> String {
    match error {
        ProxyError::Business { message } => message.clone(),
        ProxyError::Group(err) => err.to_string(),
        ProxyError::Context { source, .. } => user_message(source),
        other => other.to_string(),
    }
}

/// # 便捷函数：成功响应
pub fn success<T: Serialize>(data: T) -> Response {
    ApiResponse::Success(data).into_response()
}

/// # 便捷函数：无数据体的成功响应
pub fn success_without_data() -> Response {
    ApiResponse::<()>::SuccessWithoutData.into_response()
}

/// # 便捷函数：业务拒绝（HTTP 200，`success = false`）
pub fn rejected(message: impl Into<String>) -> Response {
    ApiResponse::<()>::Rejected(message.into()).into_response()
}

/// # 便捷函数：HTTP错误响应
pub fn error(status: StatusCode, message: &str) -> Response {
    ApiResponse::<()>::Error(status, message.to_string()).into_response()
}

/// # 便捷函数：应用错误响应
pub fn app_error(error: ProxyError) -> Response {
    ApiResponse::<()>::AppError(error).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GroupError;

    #[test]
    fn test_business_rejection_is_http_200() {
        let response = app_error(ProxyError::business("令牌名称过长"));
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_auth_error_keeps_401() {
        let response = app_error(ProxyError::auth("未登录"));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_database_error_is_server_error() {
        let response = app_error(ProxyError::database("连接断开"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_user_message_strips_category_prefix() {
        assert_eq!(user_message(&ProxyError::business("参数错误")), "参数错误");
        assert_eq!(
            user_message(&GroupError::unauthorized("svip").into()),
            "无权访问分组: svip"
        );
    }
}
