//! # 管理API模块
//!
//! 提供令牌管理的 RESTful 接口

pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod server;
pub mod services;

pub use routes::create_routes;
pub use server::{ManagementState, create_router, serve};
