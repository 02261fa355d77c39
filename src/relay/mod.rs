//! # 转发入口
//!
//! 令牌认证、渠道分发以及面向令牌的查询接口

pub mod distributor;
pub mod routes;

pub use distributor::{ChannelSelection, authenticate, distribute};
pub use routes::create_routes;
