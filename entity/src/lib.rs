//! # Entity 模块
//!
//! 包含所有 Sea-ORM 实体定义

pub mod channels;
pub mod tokens;
pub mod users;

pub use channels::Entity as Channels;
pub use tokens::Entity as Tokens;
pub use users::Entity as Users;
