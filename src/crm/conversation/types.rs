//! 会话类型定义

use serde::{Deserialize, Serialize};

/// 会话处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Open,
    Pending,
    Resolved,
}

/// 本地会话数据结构
///
/// 可以直接从服务器返回的 JSON 反序列化，缺失的字段使用默认值。
/// 会话在客户端会话期内只增不删（归档由服务端处理）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// 会话 ID
    #[serde(rename = "conversationID")]
    pub id: String,
    /// 处理状态：open / pending / resolved
    pub status: ConversationStatus,
    /// 最新消息时间（unix 毫秒），合并时保证单调不回退
    pub last_message_at: i64,
    /// 未读消息数
    #[serde(default)]
    pub unread_count: i32,
    /// 是否收藏
    #[serde(default)]
    pub is_favorite: bool,
    /// 分配的坐席 ID
    #[serde(default)]
    pub assigned_to: Option<String>,
    /// 客户显示名称
    #[serde(default)]
    pub contact_name: String,
    /// 客户 WhatsApp 号码
    #[serde(default)]
    pub contact_phone: String,
    /// 最新消息摘要（列表展示用）
    #[serde(default)]
    pub latest_msg: String,
}

/// 会话局部补丁（本地乐观更新用）
///
/// 仅包含用户本地动作会立刻生效的字段；None 表示该字段不变。
#[derive(Debug, Clone, Default)]
pub struct ConversationPatch {
    pub status: Option<ConversationStatus>,
    pub is_favorite: Option<bool>,
    pub assigned_to: Option<Option<String>>,
}

/// 一页会话列表的抓取结果
#[derive(Debug, Clone)]
pub struct ConversationPage {
    /// 去掉 lookahead 之后实际返回的条目
    pub items: Vec<Conversation>,
    /// 下一页游标（最后一条的 last_message_at）；None 表示没有更多
    pub next_cursor: Option<i64>,
    /// 是否还有更早的会话
    pub has_more: bool,
}
