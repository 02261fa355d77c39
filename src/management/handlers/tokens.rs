//! # 令牌管理处理器
//!
//! 处理 HTTP 请求，委托具体业务给 `TokenService`。

use axum::{
    Json,
    extract::{Extension, Path, Query, State, rejection::JsonRejection},
    response::Response,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::{ErrorCategory, ProxyError};
use crate::logging::{LogComponent, LogStage};
use crate::management::{
    middleware::{AuthContext, RequestId},
    response,
    server::ManagementState,
    services::tokens::{BatchDeleteRequest, SearchQuery, TokenListQuery, TokenRequest, TokenService},
};
use crate::{lerror, linfo, lwarn};

/// 更新令牌的查询参数
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTokenQuery {
    /// 非空即只更新状态
    pub status_only: Option<String>,
}

impl UpdateTokenQuery {
    fn is_status_only(&self) -> bool {
        self.status_only.as_deref().is_some_and(|v| !v.is_empty())
    }
}

/// 记录失败并转换为响应
fn failure(request_id: &RequestId, operation: &str, description: &str, err: ProxyError) -> Response {
    if err.category() == ErrorCategory::Client {
        lwarn!(
            request_id,
            LogStage::Internal,
            LogComponent::Token,
            operation,
            &format!("{description}: {err}")
        );
    } else {
        lerror!(
            request_id,
            LogStage::Db,
            LogComponent::Token,
            operation,
            &format!("{description}: {err:?}")
        );
    }
    response::app_error(err)
}

/// 分页列出令牌
pub async fn list_tokens(
    State(state): State<ManagementState>,
    Query(query): Query<TokenListQuery>,
    Extension(request_id): Extension<RequestId>,
    Extension(auth): Extension<Arc<AuthContext>>,
) -> Response {
    match TokenService::new(&state).list(&auth, &query).await {
        Ok(page) => response::success(page),
        Err(err) => failure(&request_id, "list_tokens_fail", "获取令牌列表失败", err),
    }
}

/// 搜索令牌
pub async fn search_tokens(
    State(state): State<ManagementState>,
    Query(query): Query<SearchQuery>,
    Extension(request_id): Extension<RequestId>,
    Extension(auth): Extension<Arc<AuthContext>>,
) -> Response {
    match TokenService::new(&state).search(&auth, &query).await {
        Ok(tokens) => response::success(tokens),
        Err(err) => failure(&request_id, "search_tokens_fail", "搜索令牌失败", err),
    }
}

/// 获取令牌详情
pub async fn get_token(
    State(state): State<ManagementState>,
    Path(id): Path<i32>,
    Extension(request_id): Extension<RequestId>,
    Extension(auth): Extension<Arc<AuthContext>>,
) -> Response {
    match TokenService::new(&state).get(&auth, id).await {
        Ok(token) => response::success(token),
        Err(err) => failure(&request_id, "get_token_fail", "获取令牌失败", err),
    }
}

/// 创建令牌
pub async fn create_token(
    State(state): State<ManagementState>,
    Extension(request_id): Extension<RequestId>,
    Extension(auth): Extension<Arc<AuthContext>>,
    Json(request): Json<TokenRequest>,
) -> Response {
    match TokenService::new(&state).create(&auth, &request).await {
        Ok(token) => {
            linfo!(
                request_id,
                LogStage::Db,
                LogComponent::Token,
                "token_created",
                "令牌已创建",
                token_id = token.id,
                user_id = auth.user_id,
                group = %token.group
            );
            response::success(token)
        }
        Err(err) => failure(&request_id, "create_token_fail", "创建令牌失败", err),
    }
}

/// 更新令牌
pub async fn update_token(
    State(state): State<ManagementState>,
    Query(query): Query<UpdateTokenQuery>,
    Extension(request_id): Extension<RequestId>,
    Extension(auth): Extension<Arc<AuthContext>>,
    Json(request): Json<TokenRequest>,
) -> Response {
    let status_only = query.is_status_only();
    match TokenService::new(&state).update(&auth, &request, status_only).await {
        Ok(token) => {
            linfo!(
                request_id,
                LogStage::Db,
                LogComponent::Token,
                "token_updated",
                "令牌已更新",
                token_id = token.id,
                status_only = status_only
            );
            response::success(token)
        }
        Err(err) => failure(&request_id, "update_token_fail", "更新令牌失败", err),
    }
}

/// 删除令牌
pub async fn delete_token(
    State(state): State<ManagementState>,
    Path(id): Path<i32>,
    Extension(request_id): Extension<RequestId>,
    Extension(auth): Extension<Arc<AuthContext>>,
) -> Response {
    match TokenService::new(&state).delete(&auth, id).await {
        Ok(()) => response::success_without_data(),
        Err(err) => failure(&request_id, "delete_token_fail", "删除令牌失败", err),
    }
}

/// 批量删除令牌
///
/// 请求体无法解析时同样按参数错误处理
pub async fn delete_token_batch(
    State(state): State<ManagementState>,
    Extension(request_id): Extension<RequestId>,
    Extension(auth): Extension<Arc<AuthContext>>,
    request: Result<Json<BatchDeleteRequest>, JsonRejection>,
) -> Response {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    match TokenService::new(&state).batch_delete(&auth, &request).await {
        Ok(count) => response::success(count),
        Err(err) => failure(&request_id, "batch_delete_fail", "批量删除令牌失败", err),
    }
}
