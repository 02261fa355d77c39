//! # 认证中间件
//!
//! 从请求头中提取JWT，验证后加载用户及其分组，注入到请求扩展中。

use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use entity::users;
use sea_orm::EntityTrait;
use std::sync::Arc;

use crate::auth::AuthUtils;
use crate::logging::{LogComponent, LogStage};
use crate::lwarn;
use crate::management::response;
use crate::management::server::ManagementState;

/// 包含认证用户信息的上下文
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// 用户ID
    pub user_id: i32,
    /// 用户名
    pub username: String,
    /// 用户所属分组，决定可访问的分组集合
    pub user_group: String,
}

/// Axum认证中间件
pub async fn auth(State(state): State<ManagementState>, mut request: Request, next: Next) -> Response {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(AuthUtils::extract_bearer_token);

    let Some(token) = token else {
        return response::error(StatusCode::UNAUTHORIZED, "未提供认证令牌");
    };

    let claims = match state.jwt.validate_token(&token) {
        Ok(claims) => claims,
        Err(e) => {
            lwarn!(
                "system",
                LogStage::Authentication,
                LogComponent::Auth,
                "jwt_rejected",
                &format!("JWT 校验失败: {e}")
            );
            return response::error(StatusCode::UNAUTHORIZED, "认证令牌无效或已过期");
        }
    };

    let Ok(user_id) = claims.user_id() else {
        return response::error(StatusCode::UNAUTHORIZED, "认证令牌无效或已过期");
    };

    let user = match users::Entity::find_by_id(user_id).one(state.database.as_ref()).await {
        Ok(Some(user)) if user.is_active => user,
        Ok(_) => return response::error(StatusCode::UNAUTHORIZED, "用户不存在或已被禁用"),
        Err(e) => return response::app_error(e.into()),
    };

    request.extensions_mut().insert(Arc::new(AuthContext {
        user_id: user.id,
        username: user.username,
        user_group: user.user_group,
    }));
    next.run(request).await
}
