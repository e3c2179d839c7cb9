pub mod crm;

// 重新导出常用类型和函数，方便外部使用
pub use crm::{
    client::{ClientConfig, CrmClient},
    connection::{ConnectionState, ConnectionTracker},
    conversation::{Conversation, ConversationPaginator, ConversationStatus},
    message::{ChatMessage, MessageStatus, MessageType},
    store::ChatStore,
};
