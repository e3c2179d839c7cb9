//! 消息模块
//!
//! 消息数据模型、乐观发送日志与消息 API

pub mod api;
pub mod listener;
pub mod outbox;
pub mod types;

// 重新导出主要类型和函数
pub use api::MessageApi;
pub use listener::{EmptyMessageListener, MessageListener};
pub use outbox::{build_optimistic_message, OutboxLog, PendingSend};
pub use types::{
    ChatMessage, MessageDirection, MessageStatus, MessageStatusUpdate, MessageType, SenderType,
};
