//! # 转发路由

use axum::{
    Extension, Json, Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::distributor::{ChannelSelection, authenticate, distribute};
use crate::app::AppContext;
use crate::auth::AuthenticatedToken;

/// 令牌额度摘要
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreditSummary {
    /// 固定为 `credit_summary`
    pub object: String,
    /// 总额度，取剩余额度
    pub total_granted: i64,
    /// 暂不统计，恒为 0
    pub total_used: i64,
    /// 剩余额度
    pub total_available: i64,
    /// 毫秒，0 表示永不过期
    pub expires_at: i64,
}

impl From<&entity::tokens::Model> for CreditSummary {
    fn from(token: &entity::tokens::Model) -> Self {
        Self {
            object: "credit_summary".to_string(),
            total_granted: token.remain_quota,
            total_used: 0,
            total_available: token.remain_quota,
            expires_at: token.expires_at_seconds().saturating_mul(1000),
        }
    }
}

/// `GET /v1/dashboard/billing/credit_summary`
pub async fn credit_summary(Extension(authenticated): Extension<Arc<AuthenticatedToken>>) -> Json<CreditSummary> {
    Json(CreditSummary::from(&authenticated.token))
}

/// `POST /v1/route`：仅返回选择结果，不转发上游
pub async fn preview_route(Extension(selection): Extension<ChannelSelection>) -> Json<ChannelSelection> {
    Json(selection)
}

/// 创建 `/v1` 路由
pub fn create_routes(context: Arc<AppContext>) -> Router {
    let routed = Router::new()
        .route("/route", post(preview_route))
        .route_layer(from_fn_with_state(Arc::clone(&context), distribute));

    Router::new()
        .merge(routed)
        .route("/dashboard/billing/credit_summary", get(credit_summary))
        .route_layer(from_fn_with_state(Arc::clone(&context), authenticate))
        .with_state(context)
}
