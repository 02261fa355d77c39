//! # 渠道模块
//!
//! 请求上下文、渠道存储接口及其数据库实现，以及基于分组优先级的渠道选择器

pub mod context;
pub mod database_store;
pub mod selector;
pub mod store;

pub use context::{ContextKey, RequestContext};
pub use database_store::DatabaseChannelStore;
pub use selector::ChannelSelector;
pub use store::ChannelStore;
