pub mod client;
pub mod connection;
pub mod conversation;
pub mod events;
pub mod message;
pub mod serialization;
pub mod store;
pub mod types;

// 重新导出客户端与连接状态相关类型
pub use client::{ClientConfig, CrmClient};
pub use connection::{ConnectionState, ConnectionTracker};

// 重新导出实时事件类型
pub use events::{decode_push_batch, PushBatch, RealtimeEvent};
