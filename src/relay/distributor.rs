//! # 渠道分发中间件
//!
//! `authenticate` 按令牌密钥认证并注入 `AuthenticatedToken`；
//! `distribute` 读取请求体中的模型名，运行渠道选择器并注入 `ChannelSelection`。

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::app::AppContext;
use crate::auth::{AuthUtils, AuthenticatedToken, authenticate_token};
use crate::channel::RequestContext;
use crate::error::ProxyError;
use crate::logging::{LogComponent, LogStage};
use crate::management::middleware::RequestId;
use crate::{ldebug, linfo, lwarn};

/// 请求体大小上限
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// 选择结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChannelSelection {
    /// 渠道ID
    pub channel_id: i32,
    /// 渠道名称
    pub channel_name: String,
    /// 请求的模型
    pub model: String,
    /// 实际使用的分组
    pub group: String,
    /// 通过 `auto` 展开命中的分组
    pub auto_group: Option<String>,
    /// 是否由倍率回退选中
    pub auto_smart_group_used: bool,
}

impl ChannelSelection {
    fn from_context(ctx: &RequestContext, channel: &entity::channels::Model, model: &str, group: String) -> Self {
        Self {
            channel_id: channel.id,
            channel_name: channel.name.clone(),
            model: model.to_string(),
            group,
            auto_group: ctx.auto_group().map(ToString::to_string),
            auto_smart_group_used: ctx.auto_smart_group_used(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ModelRequest {
    #[serde(default)]
    model: String,
}

/// OpenAI 风格的错误响应
pub fn relay_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": {
                "message": message.into(),
                "type": "token_router_error",
            }
        })),
    )
        .into_response()
}

fn relay_app_error(err: &ProxyError) -> Response {
    let (status, _) = err.to_http_response_parts();
    let message = err.as_group_error().map_or_else(|| err.to_string(), ToString::to_string);
    relay_error(status, message)
}

fn request_id_of(request: &Request) -> RequestId {
    request.extensions().get::<RequestId>().cloned().unwrap_or_default()
}

/// 令牌认证中间件
pub async fn authenticate(State(context): State<Arc<AppContext>>, mut request: Request, next: Next) -> Response {
    let request_id = request_id_of(&request);
    let Some(key) = AuthUtils::extract_token_key(request.headers()) else {
        return relay_error(StatusCode::UNAUTHORIZED, "未提供令牌");
    };

    match authenticate_token(context.database.as_ref(), &key, &request_id).await {
        Ok(authenticated) => {
            request.extensions_mut().insert(Arc::new(authenticated));
            next.run(request).await
        }
        Err(err) => {
            lwarn!(
                request_id,
                LogStage::Authentication,
                LogComponent::Relay,
                "token_rejected",
                &format!("令牌认证失败: {err}"),
                key = %AuthUtils::mask_key(&key)
            );
            relay_app_error(&err)
        }
    }
}

/// 渠道分发中间件，需在 `authenticate` 之后运行
pub async fn distribute(State(context): State<Arc<AppContext>>, request: Request, next: Next) -> Response {
    let request_id = request_id_of(&request);
    let Some(authenticated) = request.extensions().get::<Arc<AuthenticatedToken>>().cloned() else {
        return relay_error(StatusCode::UNAUTHORIZED, "未提供令牌");
    };

    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => return relay_error(StatusCode::BAD_REQUEST, format!("读取请求体失败: {e}")),
    };
    let model = serde_json::from_slice::<ModelRequest>(&bytes)
        .map(|body| body.model)
        .unwrap_or_default();
    if model.is_empty() {
        return relay_error(StatusCode::BAD_REQUEST, "未指定模型名称");
    }

    let token = &authenticated.token;
    if token.model_limits_enabled && !token.model_limit_list().contains(&model.as_str()) {
        return relay_error(StatusCode::FORBIDDEN, format!("该令牌无权使用模型：{model}"));
    }

    let mut ctx = authenticated.request_context(&request_id);
    let (channel, group) = match context.selector.select_channel(&mut ctx, token, &model, 0).await {
        Ok(selected) => selected,
        Err(err) => {
            lwarn!(
                request_id,
                LogStage::Scheduling,
                LogComponent::Relay,
                "no_channel",
                &format!("渠道选择失败: {err}"),
                token_id = token.id,
                model = %model
            );
            return relay_app_error(&err);
        }
    };

    let selection = ChannelSelection::from_context(&ctx, &channel, &model, group);
    linfo!(
        request_id,
        LogStage::Scheduling,
        LogComponent::Relay,
        "channel_distributed",
        "渠道分发完成",
        channel_id = selection.channel_id,
        group = %selection.group,
        auto_smart_group_used = selection.auto_smart_group_used
    );
    ldebug!(
        request_id,
        LogStage::Scheduling,
        LogComponent::Relay,
        "context_keys",
        &format!("selected_group={:?} using_group={:?}", ctx.selected_group(), ctx.using_group())
    );

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(selection);
    request.extensions_mut().insert(ctx);
    next.run(request).await
}
