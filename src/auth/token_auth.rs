//! # 转发令牌认证
//!
//! 按密钥查找令牌，检查状态、过期时间与额度，并加载所属用户

use chrono::Utc;
use entity::tokens::{self, TokenStatus};
use entity::users;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use super::AuthUtils;
use crate::channel::RequestContext;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, linfo};

/// 认证通过的令牌及其用户
#[derive(Debug, Clone)]
pub struct AuthenticatedToken {
    /// 令牌记录
    pub token: tokens::Model,
    /// 令牌所属用户
    pub user: users::Model,
}

impl AuthenticatedToken {
    /// 以令牌和用户信息构建请求上下文
    #[must_use]
    pub fn request_context(&self, request_id: &str) -> RequestContext {
        let mut ctx = RequestContext::new(request_id).with_user_group(self.user.user_group.clone());
        ctx.user_id = self.user.id;
        ctx.token_id = self.token.id;
        ctx
    }
}

/// 校验令牌密钥（不含 `sk-` 前缀）
pub async fn authenticate_token(
    db: &DatabaseConnection,
    key: &str,
    request_id: &str,
) -> Result<AuthenticatedToken> {
    let token = tokens::Entity::find()
        .filter(tokens::Column::Key.eq(key))
        .one(db)
        .await?
        .ok_or_else(|| ProxyError::auth("无效的令牌"))?;

    match token.token_status() {
        Some(TokenStatus::Enabled) => {}
        Some(TokenStatus::Exhausted) => return Err(exhausted_error(key)),
        Some(TokenStatus::Expired) => return Err(ProxyError::auth("该令牌已过期")),
        Some(TokenStatus::Disabled) | None => return Err(ProxyError::auth("该令牌状态不可用")),
    }

    if token.is_expired_at(Utc::now().timestamp()) {
        mark_status(db, &token, TokenStatus::Expired, request_id).await?;
        return Err(ProxyError::auth("该令牌已过期"));
    }

    if token.is_quota_exhausted() {
        mark_status(db, &token, TokenStatus::Exhausted, request_id).await?;
        return Err(exhausted_error(key));
    }

    let user = users::Entity::find_by_id(token.user_id)
        .one(db)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| ProxyError::auth("用户已被禁用"))?;

    ldebug!(
        request_id,
        LogStage::Authentication,
        LogComponent::Auth,
        "token_authenticated",
        "令牌认证通过",
        token_id = token.id,
        user_id = user.id,
        user_group = %user.user_group
    );

    Ok(AuthenticatedToken { token, user })
}

fn exhausted_error(key: &str) -> ProxyError {
    ProxyError::auth(format!("该令牌额度已用尽 [{}]", AuthUtils::mask_key(key)))
}

async fn mark_status(
    db: &DatabaseConnection,
    token: &tokens::Model,
    status: TokenStatus,
    request_id: &str,
) -> Result<()> {
    let mut active: tokens::ActiveModel = token.clone().into();
    active.status = Set(status.code());
    active.update(db).await?;

    linfo!(
        request_id,
        LogStage::Authentication,
        LogComponent::Auth,
        "token_status_marked",
        &format!("令牌状态已更新为 {status:?}"),
        token_id = token.id
    );
    Ok(())
}
