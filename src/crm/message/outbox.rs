//! 乐观发送日志（Optimistic Mutation Log）
//!
//! 跟踪尚未被服务器确认的本地消息。每次发送分配一个全新的临时 ID，
//! 终态（替换为确认记录或标记失败）之后立刻丢弃跟踪条目，保证临时 ID
//! 不会被二次消费。

use crate::crm::message::types::{ChatMessage, MessageStatus, MessageType};
use std::collections::HashMap;
use tracing::warn;

/// 在途发送的跟踪条目
#[derive(Debug, Clone)]
pub struct PendingSend {
    pub conversation_id: String,
    pub content: String,
    pub msg_type: MessageType,
    pub created_at: i64,
}

/// 乐观发送日志
#[derive(Debug, Default)]
pub struct OutboxLog {
    pending: HashMap<String, PendingSend>,
}

impl OutboxLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一条乐观消息
    ///
    /// 临时 ID 由调用方生成（序列化点之外即可同步返回给发送者）；
    /// 并发发送互不阻塞：每次调用产生独立的条目。
    pub fn register(
        &mut self,
        temp_id: &str,
        conversation_id: &str,
        content: &str,
        msg_type: MessageType,
        created_at: i64,
    ) {
        let replaced = self.pending.insert(
            temp_id.to_string(),
            PendingSend {
                conversation_id: conversation_id.to_string(),
                content: content.to_string(),
                msg_type,
                created_at,
            },
        );
        debug_assert!(replaced.is_none(), "临时 ID 被复用: {temp_id}");
    }

    /// 指定临时 ID 是否仍在途
    pub fn is_pending(&self, temp_id: &str) -> bool {
        self.pending.contains_key(temp_id)
    }

    /// 读取在途条目
    pub fn get(&self, temp_id: &str) -> Option<&PendingSend> {
        self.pending.get(temp_id)
    }

    /// 终态解析：取出并丢弃跟踪条目
    ///
    /// 返回 None 说明该临时 ID 已被解析过（重复确认/失败），调用方应当忽略。
    pub fn resolve(&mut self, temp_id: &str) -> Option<PendingSend> {
        let entry = self.pending.remove(temp_id);
        if entry.is_none() {
            warn!("[Outbox] 临时 ID 已解析或不存在，忽略: {}", temp_id);
        }
        entry
    }

    /// 在途条目数
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// 由外部已有的临时 ID 与内容构造乐观消息（重发失败消息时使用）
pub fn build_optimistic_message(
    temp_id: &str,
    conversation_id: &str,
    content: &str,
    msg_type: MessageType,
    created_at: i64,
) -> ChatMessage {
    ChatMessage {
        id: None,
        temp_id: Some(temp_id.to_string()),
        conversation_id: conversation_id.to_string(),
        content: content.to_string(),
        msg_type,
        direction: crate::crm::message::types::MessageDirection::Outbound,
        sender_type: crate::crm::message::types::SenderType::Agent,
        status: MessageStatus::Sending,
        created_at,
        is_optimistic: true,
        failure_reason: None,
    }
}
