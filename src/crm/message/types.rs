//! 消息类型定义
//!
//! WhatsApp CRM 的消息数据模型：已确认消息与乐观（未确认）消息共用同一结构体，
//! 由 `id` / `temp_id` 区分当前所处的生命周期阶段。

use serde::{Deserialize, Serialize};

/// 消息内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    Document,
}

/// 消息方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    /// 客户（线索）发来的消息
    Inbound,
    /// 坐席发出的消息
    Outbound,
}

/// 发送者类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Lead,
    Agent,
}

/// 消息状态
///
/// 状态迁移单调：sending → sent → delivered → read；failed 为终态，
/// 重发会产生新的乐观消息而不是复活旧记录。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// 单调序（failed 不参与比较，单独作为终态处理）
    pub fn rank(self) -> u8 {
        match self {
            MessageStatus::Sending => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Read => 3,
            MessageStatus::Failed => 4,
        }
    }

    /// 判断从 `self` 迁移到 `next` 是否合法
    pub fn can_advance_to(self, next: MessageStatus) -> bool {
        if self == MessageStatus::Failed {
            return false;
        }
        if next == MessageStatus::Failed {
            return true;
        }
        next.rank() > self.rank()
    }
}

/// 聊天消息
///
/// 服务器确认前 `id` 为空、`temp_id` 非空；确认后二者互换角色。
/// 会话内全序键为 `(created_at, id-or-temp_id)`。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// 服务器分配的稳定 ID（确认后存在）
    #[serde(default)]
    pub id: Option<String>,
    /// 客户端生成的临时 ID（本地发送时分配，确认后废弃）
    #[serde(default)]
    pub temp_id: Option<String>,
    #[serde(rename = "conversationID")]
    pub conversation_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub direction: MessageDirection,
    pub sender_type: SenderType,
    pub status: MessageStatus,
    /// 逻辑时间戳（unix 毫秒），用于排序
    pub created_at: i64,
    /// 是否为未被服务器记录替换的乐观消息
    #[serde(default)]
    pub is_optimistic: bool,
    /// 发送失败原因（仅 status=failed 时有值）
    #[serde(default)]
    pub failure_reason: Option<String>,
}

impl ChatMessage {
    /// 排序用的 tiebreak 键：优先服务器 ID，其次临时 ID
    pub fn tiebreak_id(&self) -> &str {
        self.id
            .as_deref()
            .or(self.temp_id.as_deref())
            .unwrap_or_default()
    }

    /// 会话内全序键 `(created_at, id-or-temp_id)`
    pub fn sort_key(&self) -> (i64, String) {
        (self.created_at, self.tiebreak_id().to_string())
    }
}

/// 消息状态更新（送达回执等，由推送通道下发）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatusUpdate {
    /// 服务器消息 ID
    pub id: String,
    #[serde(rename = "conversationID")]
    pub conversation_id: String,
    pub status: MessageStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_monotonic() {
        assert!(MessageStatus::Sending.can_advance_to(MessageStatus::Sent));
        assert!(MessageStatus::Sent.can_advance_to(MessageStatus::Read));
        assert!(!MessageStatus::Delivered.can_advance_to(MessageStatus::Sent));
        assert!(!MessageStatus::Read.can_advance_to(MessageStatus::Read));
    }

    #[test]
    fn failed_is_terminal() {
        assert!(MessageStatus::Sending.can_advance_to(MessageStatus::Failed));
        assert!(!MessageStatus::Failed.can_advance_to(MessageStatus::Sent));
        assert!(!MessageStatus::Failed.can_advance_to(MessageStatus::Failed));
    }

    #[test]
    fn tiebreak_prefers_server_id() {
        let msg = ChatMessage {
            id: Some("M1".to_string()),
            temp_id: Some("T1".to_string()),
            conversation_id: "c1".to_string(),
            content: "hi".to_string(),
            msg_type: MessageType::Text,
            direction: MessageDirection::Outbound,
            sender_type: SenderType::Agent,
            status: MessageStatus::Sent,
            created_at: 100,
            is_optimistic: false,
            failure_reason: None,
        };
        assert_eq!(msg.tiebreak_id(), "M1");
        assert_eq!(msg.sort_key(), (100, "M1".to_string()));
    }
}
