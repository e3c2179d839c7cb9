//! 状态 actor：唯一的序列化点
//!
//! 所有状态变更命令经由一个 mpsc 通道进入此处的单任务循环，依次作用到
//! [`ChatState`] 上，因此两次合并永远不会在同一会话的消息列表上竞争。
//! 读取命令通过 oneshot 回传不可变快照。监听器回调也在这里触发，
//! 回调看到的变更顺序与状态实际演进的顺序一致。

use crate::crm::conversation::listener::ConversationListener;
use crate::crm::conversation::types::{Conversation, ConversationPatch};
use crate::crm::events::RealtimeEvent;
use crate::crm::message::listener::MessageListener;
use crate::crm::message::types::{ChatMessage, MessageStatus, MessageType};
use crate::crm::serialization::generate_temp_id;
use crate::crm::store::state::{ChatState, StateChange};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 命令通道容量（推送突发时由通道提供背压）
const COMMAND_BUFFER: usize = 256;

/// 状态变更/读取命令
pub enum StoreCommand {
    // ---- 会话列表 ----
    ResetPagination {
        epoch: u64,
    },
    ApplyConversationPage {
        epoch: u64,
        items: Vec<Conversation>,
    },
    AddConversationOptimistic {
        conversation: Conversation,
    },
    PatchConversation {
        id: String,
        patch: ConversationPatch,
    },
    MarkConversationRead {
        id: String,
    },
    SetActiveConversation {
        id: Option<String>,
    },
    // ---- 消息时间线 ----
    ApplyMessagePage {
        conversation_id: String,
        messages: Vec<ChatMessage>,
    },
    // ---- 乐观发送 ----
    AddOptimistic {
        temp_id: String,
        conversation_id: String,
        content: String,
        msg_type: MessageType,
        created_at: i64,
    },
    ReplaceOptimistic {
        temp_id: String,
        confirmed: ChatMessage,
    },
    MarkSendFailed {
        temp_id: String,
        reason: String,
    },
    UpdateOptimistic {
        temp_id: String,
        status: MessageStatus,
    },
    DiscardFailed {
        conversation_id: String,
        temp_id: String,
    },
    // ---- 实时事件 ----
    MergeEvent {
        event: RealtimeEvent,
    },
    // ---- 快照读取 ----
    SnapshotConversations {
        reply: oneshot::Sender<Vec<Conversation>>,
    },
    SnapshotMessages {
        conversation_id: String,
        reply: oneshot::Sender<Vec<ChatMessage>>,
    },
    TotalUnread {
        reply: oneshot::Sender<i32>,
    },
    FindMessageByTempId {
        conversation_id: String,
        temp_id: String,
        reply: oneshot::Sender<Option<ChatMessage>>,
    },
    TimelineResumeCursor {
        conversation_id: String,
        reply: oneshot::Sender<Option<i64>>,
    },
}

/// 状态监听器集合
pub struct StoreListeners {
    pub conversation: Arc<dyn ConversationListener>,
    pub message: Arc<dyn MessageListener>,
}

/// 状态 actor 的外部句柄（可克隆，内部只是发送端）
#[derive(Clone)]
pub struct ChatStore {
    tx: mpsc::Sender<StoreCommand>,
}

impl ChatStore {
    /// 启动 actor 任务，返回句柄与任务 JoinHandle
    pub fn spawn(listeners: StoreListeners) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = tokio::spawn(run_actor(rx, listeners));
        (Self { tx }, handle)
    }

    async fn send(&self, cmd: StoreCommand) -> Result<()> {
        self.tx.send(cmd).await.ok().context("状态 actor 已退出")
    }

    pub async fn reset_pagination(&self, epoch: u64) -> Result<()> {
        self.send(StoreCommand::ResetPagination { epoch }).await
    }

    pub async fn apply_conversation_page(
        &self,
        epoch: u64,
        items: Vec<Conversation>,
    ) -> Result<()> {
        self.send(StoreCommand::ApplyConversationPage { epoch, items })
            .await
    }

    pub async fn add_conversation_optimistically(&self, conversation: Conversation) -> Result<()> {
        self.send(StoreCommand::AddConversationOptimistic { conversation })
            .await
    }

    pub async fn patch_conversation(&self, id: &str, patch: ConversationPatch) -> Result<()> {
        self.send(StoreCommand::PatchConversation {
            id: id.to_string(),
            patch,
        })
        .await
    }

    pub async fn mark_conversation_read(&self, id: &str) -> Result<()> {
        self.send(StoreCommand::MarkConversationRead { id: id.to_string() })
            .await
    }

    pub async fn set_active_conversation(&self, id: Option<String>) -> Result<()> {
        self.send(StoreCommand::SetActiveConversation { id }).await
    }

    pub async fn apply_message_page(
        &self,
        conversation_id: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<()> {
        self.send(StoreCommand::ApplyMessagePage {
            conversation_id: conversation_id.to_string(),
            messages,
        })
        .await
    }

    /// 乐观落地一条待发送消息，临时 ID 立即返回（不等待任何网络 I/O）
    pub async fn add_optimistic(
        &self,
        conversation_id: &str,
        content: &str,
        msg_type: MessageType,
        created_at: i64,
    ) -> Result<String> {
        let temp_id = generate_temp_id();
        self.send(StoreCommand::AddOptimistic {
            temp_id: temp_id.clone(),
            conversation_id: conversation_id.to_string(),
            content: content.to_string(),
            msg_type,
            created_at,
        })
        .await?;
        Ok(temp_id)
    }

    pub async fn replace_optimistic(&self, temp_id: &str, confirmed: ChatMessage) -> Result<()> {
        self.send(StoreCommand::ReplaceOptimistic {
            temp_id: temp_id.to_string(),
            confirmed,
        })
        .await
    }

    pub async fn mark_send_failed(&self, temp_id: &str, reason: &str) -> Result<()> {
        self.send(StoreCommand::MarkSendFailed {
            temp_id: temp_id.to_string(),
            reason: reason.to_string(),
        })
        .await
    }

    pub async fn update_optimistic(&self, temp_id: &str, status: MessageStatus) -> Result<()> {
        self.send(StoreCommand::UpdateOptimistic {
            temp_id: temp_id.to_string(),
            status,
        })
        .await
    }

    pub async fn discard_failed(&self, conversation_id: &str, temp_id: &str) -> Result<()> {
        self.send(StoreCommand::DiscardFailed {
            conversation_id: conversation_id.to_string(),
            temp_id: temp_id.to_string(),
        })
        .await
    }

    pub async fn merge_event(&self, event: RealtimeEvent) -> Result<()> {
        self.send(StoreCommand::MergeEvent { event }).await
    }

    pub async fn snapshot_conversations(&self) -> Result<Vec<Conversation>> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::SnapshotConversations { reply })
            .await?;
        rx.await.context("状态 actor 未回传快照")
    }

    pub async fn snapshot_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::SnapshotMessages {
            conversation_id: conversation_id.to_string(),
            reply,
        })
        .await?;
        rx.await.context("状态 actor 未回传快照")
    }

    pub async fn total_unread(&self) -> Result<i32> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::TotalUnread { reply }).await?;
        rx.await.context("状态 actor 未回传快照")
    }

    pub async fn find_message_by_temp_id(
        &self,
        conversation_id: &str,
        temp_id: &str,
    ) -> Result<Option<ChatMessage>> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::FindMessageByTempId {
            conversation_id: conversation_id.to_string(),
            temp_id: temp_id.to_string(),
            reply,
        })
        .await?;
        rx.await.context("状态 actor 未回传快照")
    }

    pub async fn timeline_resume_cursor(&self, conversation_id: &str) -> Result<Option<i64>> {
        let (reply, rx) = oneshot::channel();
        self.send(StoreCommand::TimelineResumeCursor {
            conversation_id: conversation_id.to_string(),
            reply,
        })
        .await?;
        rx.await.context("状态 actor 未回传快照")
    }
}

/// actor 主循环：发送端全部关闭后退出
async fn run_actor(mut rx: mpsc::Receiver<StoreCommand>, listeners: StoreListeners) {
    let mut state = ChatState::new();
    // 上次对外广播过的总未读数，只在变化时触发回调
    let mut last_total_unread = 0i32;
    info!("[Store] 状态 actor 启动");
    while let Some(cmd) = rx.recv().await {
        let change = match cmd {
            StoreCommand::ResetPagination { epoch } => {
                state.reset_pagination(epoch);
                StateChange::default()
            }
            StoreCommand::ApplyConversationPage { epoch, items } => {
                state.apply_conversation_page(epoch, items)
            }
            StoreCommand::AddConversationOptimistic { conversation } => {
                state.add_conversation_optimistically(conversation)
            }
            StoreCommand::PatchConversation { id, patch } => {
                state.patch_conversation(&id, patch)
            }
            StoreCommand::MarkConversationRead { id } => state.mark_conversation_read(&id),
            StoreCommand::SetActiveConversation { id } => {
                state.set_active_conversation(id);
                StateChange::default()
            }
            StoreCommand::ApplyMessagePage {
                conversation_id,
                messages,
            } => state.apply_message_page(&conversation_id, messages),
            StoreCommand::AddOptimistic {
                temp_id,
                conversation_id,
                content,
                msg_type,
                created_at,
            } => state.add_optimistic(&temp_id, &conversation_id, &content, msg_type, created_at),
            StoreCommand::ReplaceOptimistic { temp_id, confirmed } => {
                state.replace_optimistic(&temp_id, confirmed)
            }
            StoreCommand::MarkSendFailed { temp_id, reason } => {
                state.mark_send_failed(&temp_id, &reason)
            }
            StoreCommand::UpdateOptimistic { temp_id, status } => {
                state.update_optimistic(&temp_id, status)
            }
            StoreCommand::DiscardFailed {
                conversation_id,
                temp_id,
            } => {
                state.discard_failed(&conversation_id, &temp_id);
                StateChange::default()
            }
            StoreCommand::MergeEvent { event } => match state.merge_event(event) {
                Ok(change) => change,
                Err(err) => {
                    // 开发期大声失败；线上告警后丢弃，绝不污染共享状态
                    debug_assert!(false, "畸形实时事件: {err:#}");
                    warn!("[Store] 丢弃畸形实时事件: {:#}", err);
                    StateChange::default()
                }
            },
            StoreCommand::SnapshotConversations { reply } => {
                let _ = reply.send(state.snapshot_conversations());
                continue;
            }
            StoreCommand::SnapshotMessages {
                conversation_id,
                reply,
            } => {
                let _ = reply.send(state.snapshot_messages(&conversation_id));
                continue;
            }
            StoreCommand::TotalUnread { reply } => {
                let _ = reply.send(state.total_unread());
                continue;
            }
            StoreCommand::FindMessageByTempId {
                conversation_id,
                temp_id,
                reply,
            } => {
                let _ = reply.send(state.find_message_by_temp_id(&conversation_id, &temp_id));
                continue;
            }
            StoreCommand::TimelineResumeCursor {
                conversation_id,
                reply,
            } => {
                let _ = reply.send(state.timeline_resume_cursor(&conversation_id));
                continue;
            }
        };
        notify(&state, &listeners, change, &mut last_total_unread).await;
    }
    info!("[Store] 状态 actor 退出");
}

/// 把一次状态变更翻译成监听器回调
async fn notify(
    state: &ChatState,
    listeners: &StoreListeners,
    change: StateChange,
    last_total_unread: &mut i32,
) {
    if change.is_empty() {
        return;
    }
    let check_unread = change.touches_unread();
    if !change.new_conversations.is_empty() {
        listeners
            .conversation
            .on_new_conversation(change.new_conversations)
            .await;
    }
    if !change.changed_conversations.is_empty() {
        listeners
            .conversation
            .on_conversation_changed(change.changed_conversations)
            .await;
    }
    for msg in change.new_messages {
        listeners.message.on_recv_new_message(msg).await;
    }
    for msg in change.changed_messages {
        listeners.message.on_message_status_changed(msg).await;
    }
    if check_unread {
        let total = state.total_unread();
        if total != *last_total_unread {
            *last_total_unread = total;
            listeners
                .conversation
                .on_total_unread_message_count_changed(total)
                .await;
        }
    }
}
