//! # 令牌用量查询
//!
//! 使用令牌密钥（而非登录态）认证

use axum::{
    Json,
    extract::{Extension, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::auth::AuthUtils;
use crate::ldebug;
use crate::logging::{LogComponent, LogStage};
use crate::management::services::tokens::{TokenUsage, token_usage};
use crate::management::{middleware::RequestId, response, server::ManagementState};

/// 用量响应
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    /// 查询成功时为 true
    pub code: bool,
    /// 提示信息
    pub message: String,
    /// 用量数据
    pub data: TokenUsage,
}

/// `GET /api/usage/token`
pub async fn get_token_usage(
    State(state): State<ManagementState>,
    Extension(request_id): Extension<RequestId>,
    headers: HeaderMap,
) -> Response {
    let Some(header) = headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) else {
        return response::error(StatusCode::UNAUTHORIZED, "No Authorization header");
    };
    let Some(key) = AuthUtils::extract_bearer_token(header) else {
        return response::error(StatusCode::UNAUTHORIZED, "Invalid Bearer token");
    };

    match token_usage(state.database.as_ref(), &key).await {
        Ok(data) => Json(UsageResponse {
            code: true,
            message: "ok".to_string(),
            data,
        })
        .into_response(),
        Err(err) => {
            ldebug!(
                request_id,
                LogStage::Authentication,
                LogComponent::Token,
                "usage_lookup_fail",
                &format!("查询令牌用量失败: {err}")
            );
            response::app_error(err)
        }
    }
}
