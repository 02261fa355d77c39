//! # 认证模块
//!
//! 管理端使用 JWT，转发端使用令牌密钥

pub mod jwt;
pub mod token_auth;
pub mod utils;

pub use jwt::{JwtClaims, JwtManager};
pub use token_auth::{AuthenticatedToken, authenticate_token};
pub use utils::AuthUtils;
