//! 会话监听器回调接口

use crate::crm::conversation::types::Conversation;
use async_trait::async_trait;

/// 会话监听器回调接口
///
/// 回调由序列化点任务触发，实现方不应在回调中长时间阻塞。
#[async_trait]
pub trait ConversationListener: Send + Sync {
    /// 新会话（分页加载或实时事件首次出现）
    async fn on_new_conversation(&self, conversation_list: Vec<Conversation>);

    /// 会话字段变更（recency、未读、收藏、指派、状态）
    async fn on_conversation_changed(&self, conversation_list: Vec<Conversation>);

    /// 总未读消息数变更
    async fn on_total_unread_message_count_changed(&self, total_unread_count: i32);
}

/// 空实现（默认监听器）
pub struct EmptyConversationListener;

#[async_trait]
impl ConversationListener for EmptyConversationListener {
    async fn on_new_conversation(&self, _conversation_list: Vec<Conversation>) {}
    async fn on_conversation_changed(&self, _conversation_list: Vec<Conversation>) {}
    async fn on_total_unread_message_count_changed(&self, _total_unread_count: i32) {}
}
