//! # 路由配置
//!
//! `/api` 下的管理路由；令牌接口需要 JWT，用量查询使用令牌密钥

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};

use super::handlers::{tokens, usage};
use super::middleware::auth;
use super::server::ManagementState;

/// 创建所有路由
pub fn create_routes(state: ManagementState) -> Router {
    Router::new()
        .merge(token_routes(state.clone()))
        .route("/usage/token", get(usage::get_token_usage))
        .with_state(state)
}

/// 令牌管理路由
fn token_routes(state: ManagementState) -> Router<ManagementState> {
    let collection = get(tokens::list_tokens)
        .post(tokens::create_token)
        .put(tokens::update_token);

    Router::new()
        .route("/token", collection.clone())
        .route("/token/", collection)
        .route("/token/search", get(tokens::search_tokens))
        .route("/token/batch", post(tokens::delete_token_batch))
        .route("/token/{id}", get(tokens::get_token).delete(tokens::delete_token))
        .route_layer(from_fn_with_state(state, auth))
}
