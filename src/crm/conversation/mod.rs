//! 会话模块
//!
//! 会话列表的分页拉取、聚合与乐观更新

pub mod api;
pub mod listener;
pub mod paginator;
pub mod types;

// 重新导出主要类型和函数
pub use api::ConversationApi;
pub use listener::{ConversationListener, EmptyConversationListener};
pub use paginator::{flatten_dedup, ConversationPageSource, ConversationPaginator};
pub use types::{Conversation, ConversationPage, ConversationPatch, ConversationStatus};
