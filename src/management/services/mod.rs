//! # 管理端服务层
//!
//! 业务逻辑集中在服务中，handler 只负责解析请求与组装响应

pub mod pagination;
pub mod tokens;

pub use pagination::PaginationParams;
pub use tokens::{
    BatchDeleteRequest, PriorityIntent, SearchQuery, TokenListQuery, TokenRequest, TokenService, TokenUsage,
    generate_token_key, token_usage,
};
