//! # HTTP 服务器
//!
//! 组装管理端与转发端路由，挂载请求ID、访问日志与 CORS 中间件

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::get;
use std::ops::Deref;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::middleware::request_id_middleware;
use crate::app::AppContext;
use crate::config::ServerConfig;
use crate::error::{ProxyError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{linfo, lwarn};

/// 管理端应用状态
#[derive(Clone)]
pub struct ManagementState {
    context: Arc<AppContext>,
}

impl ManagementState {
    /// 包装应用上下文
    #[must_use]
    pub const fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }
}

impl Deref for ManagementState {
    type Target = AppContext;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

/// 创建完整路由：`/api` 管理接口、`/v1` 转发接口与 `/ping`
pub fn create_router(context: Arc<AppContext>, config: &ServerConfig) -> Router {
    let api = super::routes::create_routes(ManagementState::new(Arc::clone(&context)));
    let relay = crate::relay::create_routes(context);

    Router::new()
        .nest("/api", api)
        .nest("/v1", relay)
        .route("/ping", get(|| async { "pong" }))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.cors_origins)),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT, header::ORIGIN]);

    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return layer.allow_origin(Any);
    }

    match origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<std::result::Result<Vec<_>, _>>()
    {
        Ok(origins) => layer.allow_origin(origins),
        Err(e) => {
            lwarn!(
                "system",
                LogStage::Startup,
                LogComponent::ServerSetup,
                "cors_config_fail",
                &format!("Invalid CORS origin configuration: {e}, falling back to allow any")
            );
            layer.allow_origin(Any)
        }
    }
}

/// 监听并服务，直到收到 Ctrl+C
pub async fn serve(context: Arc<AppContext>, config: &ServerConfig) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ProxyError::server_start_with_source(format!("无法监听地址 {addr}"), e))?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::ServerSetup,
        "server_listening",
        &format!("HTTP 服务已启动: http://{addr}")
    );

    axum::serve(listener, create_router(context, config))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ProxyError::server_start_with_source("HTTP 服务异常退出", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        lwarn!(
            "system",
            LogStage::Shutdown,
            LogComponent::ServerSetup,
            "signal_fail",
            &format!("无法监听关闭信号: {e}")
        );
        std::future::pending::<()>().await;
    }
    linfo!("system", LogStage::Shutdown, LogComponent::ServerSetup, "shutdown", "收到关闭信号，正在停止服务");
}
