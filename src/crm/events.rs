//! 实时事件定义与解码
//!
//! 推送通道下发的事件用封闭的带标签枚举表示，合并器对其做穷尽匹配；
//! 通道语义为 at-least-once、单通道内尽力有序，因此所有事件的应用都必须幂等。

use crate::crm::conversation::types::Conversation;
use crate::crm::message::types::{ChatMessage, MessageStatusUpdate};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// 实时事件（每种事件一个变体）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RealtimeEvent {
    /// 新消息
    MessageInsert { message: ChatMessage },
    /// 消息状态变更（送达/已读回执）
    MessageUpdate { update: MessageStatusUpdate },
    /// 新会话
    ConversationInsert { conversation: Conversation },
    /// 会话字段变更
    ConversationUpdate { conversation: Conversation },
}

impl RealtimeEvent {
    /// 事件所属的会话 ID
    pub fn conversation_id(&self) -> &str {
        match self {
            RealtimeEvent::MessageInsert { message } => &message.conversation_id,
            RealtimeEvent::MessageUpdate { update } => &update.conversation_id,
            RealtimeEvent::ConversationInsert { conversation }
            | RealtimeEvent::ConversationUpdate { conversation } => &conversation.id,
        }
    }
}

/// 推送帧载荷：一批实时事件
#[derive(Debug, Deserialize)]
pub struct PushBatch {
    #[serde(default)]
    pub events: Vec<RealtimeEvent>,
}

/// 解码推送帧的 JSON 载荷
pub fn decode_push_batch(data: &[u8]) -> Result<PushBatch> {
    serde_json::from_slice(data).context("推送事件载荷解析失败")
}
