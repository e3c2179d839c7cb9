//! 会话/消息内存状态（序列化点持有的规范数据）
//!
//! 所有变更（分页结果、乐观写入、实时事件）都经由唯一的 actor 任务作用到
//! 本结构体上，读取方只拿到克隆出的不可变快照。这里的代码是纯同步逻辑，
//! 幂等性、排序与单调性不依赖任何运行时调度。

use crate::crm::conversation::types::{Conversation, ConversationPatch, ConversationStatus};
use crate::crm::events::RealtimeEvent;
use crate::crm::message::outbox::{build_optimistic_message, OutboxLog};
use crate::crm::message::types::{
    ChatMessage, MessageDirection, MessageStatus, MessageStatusUpdate, MessageType,
};
use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// 单个会话的消息时间线（按 `(created_at, tiebreak_id)` 升序）
#[derive(Debug, Default)]
pub struct Timeline {
    messages: Vec<ChatMessage>,
    /// 已知的服务器消息 ID，用于幂等合并
    server_ids: HashSet<String>,
    /// 被逐出的旧滚动历史的续读游标（最老保留消息的 created_at）
    resume_cursor: Option<i64>,
}

impl Timeline {
    /// 按全序键插入；同一服务器 ID 的重复插入为 no-op，返回是否实际插入
    fn insert_sorted(&mut self, msg: ChatMessage) -> bool {
        if let Some(id) = &msg.id {
            if !self.server_ids.insert(id.clone()) {
                return false;
            }
        }
        let key = msg.sort_key();
        let pos = self.messages.partition_point(|m| m.sort_key() <= key);
        self.messages.insert(pos, msg);
        true
    }

    /// 只匹配尚未确认的条目（`id` 为空）；已确认消息不再按临时 ID 寻址
    fn position_of_temp(&self, temp_id: &str) -> Option<usize> {
        self.messages
            .iter()
            .position(|m| m.id.is_none() && m.temp_id.as_deref() == Some(temp_id))
    }

    fn position_of_id(&self, id: &str) -> Option<usize> {
        if !self.server_ids.contains(id) {
            return None;
        }
        self.messages.iter().position(|m| m.id.as_deref() == Some(id))
    }

    /// 保留最新 `keep` 条消息，逐出更早的滚动历史并记录续读游标
    fn evict_scrollback(&mut self, keep: usize) {
        if self.messages.len() <= keep {
            return;
        }
        let drop_count = self.messages.len() - keep;
        for evicted in self.messages.drain(..drop_count) {
            if let Some(id) = &evicted.id {
                self.server_ids.remove(id);
            }
        }
        // 最老保留消息的时间戳即可重新抓取被逐出的页
        self.resume_cursor = self.messages.first().map(|m| m.created_at);
    }

    pub fn resume_cursor(&self) -> Option<i64> {
        self.resume_cursor
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

/// 每个会话时间线在内存中保留的消息上限（更早的页可按游标重新抓取）
pub const MAX_TIMELINE_LEN: usize = 400;

/// 一次状态变更对外可见的增量（actor 据此触发监听器回调）
#[derive(Debug, Default)]
pub struct StateChange {
    pub new_conversations: Vec<Conversation>,
    pub changed_conversations: Vec<Conversation>,
    pub new_messages: Vec<ChatMessage>,
    pub changed_messages: Vec<ChatMessage>,
}

impl StateChange {
    pub fn is_empty(&self) -> bool {
        self.new_conversations.is_empty()
            && self.changed_conversations.is_empty()
            && self.new_messages.is_empty()
            && self.changed_messages.is_empty()
    }

    /// 本次变更是否可能影响未读数
    pub fn touches_unread(&self) -> bool {
        !self.new_messages.is_empty()
            || !self.changed_conversations.is_empty()
            || !self.new_conversations.is_empty()
    }
}

/// 会话/消息状态
pub struct ChatState {
    conversations: HashMap<String, Conversation>,
    /// 物化的会话顺序：按 (last_message_at, id) 降序，每个 ID 至多出现一次
    order: Vec<String>,
    timelines: HashMap<String, Timeline>,
    /// 本地未知消息的状态更新积压（会话加载后重试，而不是丢弃）
    pending_status_updates: HashMap<String, Vec<MessageStatusUpdate>>,
    outbox: OutboxLog,
    /// 当前打开的会话（该会话的入站消息不计未读）
    active_conversation: Option<String>,
    /// 分页纪元：过期页结果在此处二次拦截
    fetch_epoch: u64,
    /// 物化顺序所属的纪元；新纪元首页到达时才整体取代旧列表
    applied_epoch: u64,
}

impl ChatState {
    pub fn new() -> Self {
        Self {
            conversations: HashMap::new(),
            order: Vec::new(),
            timelines: HashMap::new(),
            pending_status_updates: HashMap::new(),
            outbox: OutboxLog::new(),
            active_conversation: None,
            fetch_epoch: 0,
            applied_epoch: 0,
        }
    }

    // ===================== 会话列表（聚合器） =====================

    fn order_key(&self, id: &str) -> (i64, String) {
        let ts = self
            .conversations
            .get(id)
            .map(|c| c.last_message_at)
            .unwrap_or(0);
        (ts, id.to_string())
    }

    /// 将会话 ID 插入顺序表中的正确位置（降序）；已存在则先移除再插入
    fn reposition(&mut self, id: &str) {
        self.order.retain(|existing| existing != id);
        let key = self.order_key(id);
        let pos = self
            .order
            .partition_point(|existing| self.order_key(existing) > key);
        self.order.insert(pos, id.to_string());
    }

    /// 开启新的分页周期（刷新/切换过滤范围）
    ///
    /// 只推进纪元；已展示的物化顺序保留到新纪元的首页真正到达，刷新失败
    /// 因此不会清空已有列表。
    pub fn reset_pagination(&mut self, epoch: u64) {
        self.fetch_epoch = epoch;
    }

    pub fn fetch_epoch(&self) -> u64 {
        self.fetch_epoch
    }

    /// 应用一页会话结果
    ///
    /// 纪元不匹配说明该页在途期间被更新的请求取代，直接丢弃（§5 取消语义）。
    /// 跨页重复的 ID 保留首次出现（flatten-dedup）。
    pub fn apply_conversation_page(&mut self, epoch: u64, items: Vec<Conversation>) -> StateChange {
        let mut change = StateChange::default();
        if epoch != self.fetch_epoch {
            debug!(
                "[Store] 丢弃过期的会话页: epoch={}, 当前={}",
                epoch, self.fetch_epoch
            );
            return change;
        }
        if epoch != self.applied_epoch {
            // 新纪元的首页到达，旧列表整体让位
            self.order.clear();
            self.applied_epoch = epoch;
        }
        for conv in items {
            let in_order = self.order.contains(&conv.id);
            if !self.conversations.contains_key(&conv.id) {
                self.conversations.insert(conv.id.clone(), conv.clone());
                self.reposition(&conv.id);
                change.new_conversations.push(conv);
                continue;
            }
            let merged = self.merge_existing(&conv, false);
            if let Some(merged) = merged {
                self.reposition(&merged.id);
                change.changed_conversations.push(merged);
            } else if !in_order {
                // 字段没变也要补进物化顺序
                self.reposition(&conv.id);
            }
        }
        change
    }

    /// 本地乐观新增会话（用户刚发起的新对话）
    pub fn add_conversation_optimistically(&mut self, conv: Conversation) -> StateChange {
        let mut change = StateChange::default();
        if self.conversations.contains_key(&conv.id) {
            return self.apply_patch_like_update(conv);
        }
        self.conversations.insert(conv.id.clone(), conv.clone());
        self.reposition(&conv.id);
        change.new_conversations.push(conv);
        change
    }

    /// 本地乐观更新会话（收藏/指派/状态等不等待服务器回包的动作）
    pub fn patch_conversation(&mut self, id: &str, patch: ConversationPatch) -> StateChange {
        let mut change = StateChange::default();
        let Some(conv) = self.conversations.get_mut(id) else {
            warn!("[Store] 乐观更新的会话不存在: {}", id);
            return change;
        };
        let mut changed = false;
        if let Some(status) = patch.status {
            changed |= conv.status != status;
            conv.status = status;
        }
        if let Some(fav) = patch.is_favorite {
            changed |= conv.is_favorite != fav;
            conv.is_favorite = fav;
        }
        if let Some(assigned) = patch.assigned_to {
            changed |= conv.assigned_to != assigned;
            conv.assigned_to = assigned;
        }
        if changed {
            change.changed_conversations.push(conv.clone());
        }
        change
    }

    fn apply_patch_like_update(&mut self, conv: Conversation) -> StateChange {
        let mut change = StateChange::default();
        let merged = self.merge_existing(&conv, false);
        if let Some(merged) = merged {
            self.reposition(&merged.id);
            change.changed_conversations.push(merged);
        }
        change
    }

    /// 就地合并一条会话更新，字段有实际变化时返回合并后的克隆
    ///
    /// `allow_unread_decrease` 只在服务端会话事件路径为 true：页抓取的
    /// 快照可能落后于本地计数，不允许借合并隐式递减未读数。
    fn merge_existing(
        &mut self,
        incoming: &Conversation,
        allow_unread_decrease: bool,
    ) -> Option<Conversation> {
        self.conversations.get_mut(&incoming.id).and_then(|existing| {
            merge_conversation_fields(existing, incoming, allow_unread_decrease)
                .then(|| existing.clone())
        })
    }

    /// 显式标记会话已读：未读数清零（未读数不会被其他路径隐式递减）
    pub fn mark_conversation_read(&mut self, id: &str) -> StateChange {
        let mut change = StateChange::default();
        if let Some(conv) = self.conversations.get_mut(id) {
            if conv.unread_count != 0 {
                conv.unread_count = 0;
                change.changed_conversations.push(conv.clone());
            }
        }
        change
    }

    pub fn set_active_conversation(&mut self, id: Option<String>) {
        self.active_conversation = id;
    }

    pub fn active_conversation(&self) -> Option<&str> {
        self.active_conversation.as_deref()
    }

    // ===================== 消息时间线 =====================

    fn timeline_mut(&mut self, conversation_id: &str) -> &mut Timeline {
        self.timelines
            .entry(conversation_id.to_string())
            .or_default()
    }

    /// 应用一页历史消息（或断线后的补拉结果），并重试该会话积压的状态更新
    pub fn apply_message_page(
        &mut self,
        conversation_id: &str,
        messages: Vec<ChatMessage>,
    ) -> StateChange {
        let mut change = StateChange::default();
        let timeline = self.timeline_mut(conversation_id);
        for msg in messages {
            if timeline.insert_sorted(msg.clone()) {
                change.new_messages.push(msg);
            }
        }
        timeline.evict_scrollback(MAX_TIMELINE_LEN);
        self.retry_pending_updates(conversation_id, &mut change);
        change
    }

    fn retry_pending_updates(&mut self, conversation_id: &str, change: &mut StateChange) {
        let Some(queued) = self.pending_status_updates.remove(conversation_id) else {
            return;
        };
        let mut still_missing = Vec::new();
        for update in queued {
            match self.apply_status_update(&update) {
                Some(msg) => change.changed_messages.push(msg),
                None => still_missing.push(update),
            }
        }
        if !still_missing.is_empty() {
            self.pending_status_updates
                .insert(conversation_id.to_string(), still_missing);
        }
    }

    /// 按服务器 ID 应用一条状态更新（单调保护），命中返回更新后的消息
    fn apply_status_update(&mut self, update: &MessageStatusUpdate) -> Option<ChatMessage> {
        let timeline = self.timelines.get_mut(&update.conversation_id)?;
        let pos = timeline.position_of_id(&update.id)?;
        let msg = &mut timeline.messages[pos];
        if !msg.status.can_advance_to(update.status) {
            // 迟到或重复的回执，幂等忽略
            return Some(msg.clone());
        }
        msg.status = update.status;
        Some(msg.clone())
    }

    // ===================== 乐观发送（Mutation Log） =====================

    /// 登记并落地一条乐观消息；临时 ID 由调用方生成以保证同步返回
    pub fn add_optimistic(
        &mut self,
        temp_id: &str,
        conversation_id: &str,
        content: &str,
        msg_type: MessageType,
        created_at: i64,
    ) -> StateChange {
        let mut change = StateChange::default();
        self.outbox
            .register(temp_id, conversation_id, content, msg_type, created_at);
        let msg = build_optimistic_message(temp_id, conversation_id, content, msg_type, created_at);
        self.timeline_mut(conversation_id).insert_sorted(msg.clone());
        change.new_messages.push(msg);

        // 会话立即跳到列表最前
        let updated = match self.conversations.get_mut(conversation_id) {
            Some(conv) if created_at > conv.last_message_at => {
                conv.last_message_at = created_at;
                conv.latest_msg = preview_of(content, msg_type);
                Some(conv.clone())
            }
            _ => None,
        };
        if let Some(updated) = updated {
            self.reposition(conversation_id);
            change.changed_conversations.push(updated);
        }
        change
    }

    /// 用服务器确认记录原位替换乐观消息（不重排序）
    ///
    /// 若确认 ID 已被推送通道先行合并，则移除乐观条目而不是替换，
    /// 保证同一逻辑消息只有一个活动表示。
    pub fn replace_optimistic(&mut self, temp_id: &str, confirmed: ChatMessage) -> StateChange {
        let mut change = StateChange::default();
        let Some(pending) = self.outbox.resolve(temp_id) else {
            return change;
        };
        let timeline = self.timeline_mut(&pending.conversation_id);
        let Some(pos) = timeline.position_of_temp(temp_id) else {
            warn!("[Store] 乐观消息不在时间线中: tempID={}", temp_id);
            return change;
        };
        let confirmed_id = confirmed.id.clone();
        if let Some(id) = &confirmed_id {
            if timeline.server_ids.contains(id) {
                // 推送先到：丢弃乐观条目即可
                timeline.messages.remove(pos);
                debug!(
                    "[Store] 确认记录已由推送合并，移除乐观条目: id={}, tempID={}",
                    id, temp_id
                );
                return change;
            }
            timeline.server_ids.insert(id.clone());
        }
        let mut confirmed = confirmed;
        confirmed.temp_id = None;
        confirmed.is_optimistic = false;
        timeline.messages[pos] = confirmed.clone();
        change.changed_messages.push(confirmed);
        self.retry_pending_updates(&pending.conversation_id, &mut change);
        change
    }

    /// 发送失败：保留内容、状态置为 failed，条目仍然可见
    pub fn mark_send_failed(&mut self, temp_id: &str, reason: &str) -> StateChange {
        let mut change = StateChange::default();
        let Some(pending) = self.outbox.resolve(temp_id) else {
            return change;
        };
        let timeline = self.timeline_mut(&pending.conversation_id);
        if let Some(pos) = timeline.position_of_temp(temp_id) {
            let msg = &mut timeline.messages[pos];
            msg.status = MessageStatus::Failed;
            msg.failure_reason = Some(reason.to_string());
            change.changed_messages.push(msg.clone());
        }
        change
    }

    /// 丢弃一条已失败的乐观条目（用户重发时旧条目让位给新的发送）
    ///
    /// 只移除终态为 failed 的条目，在途或已确认的消息不受影响。
    pub fn discard_failed(&mut self, conversation_id: &str, temp_id: &str) -> bool {
        let Some(timeline) = self.timelines.get_mut(conversation_id) else {
            return false;
        };
        match timeline.position_of_temp(temp_id) {
            Some(pos) if timeline.messages[pos].status == MessageStatus::Failed => {
                timeline.messages.remove(pos);
                true
            }
            _ => false,
        }
    }

    /// 中间状态更新（发送调用未返回完整确认记录时，例如 sending → sent）
    pub fn update_optimistic(&mut self, temp_id: &str, status: MessageStatus) -> StateChange {
        let mut change = StateChange::default();
        let Some(conversation_id) = self.outbox.get(temp_id).map(|p| p.conversation_id.clone())
        else {
            warn!("[Store] 更新已终结的乐观消息，忽略: tempID={}", temp_id);
            return change;
        };
        let timeline = self.timeline_mut(&conversation_id);
        if let Some(pos) = timeline.position_of_temp(temp_id) {
            let msg = &mut timeline.messages[pos];
            if msg.status.can_advance_to(status) {
                msg.status = status;
                change.changed_messages.push(msg.clone());
            }
        }
        change
    }

    // ===================== 实时事件合并（Merger） =====================

    /// 合并一条实时事件
    ///
    /// 畸形事件返回 Err，由调用方决定（开发期断言 / 线上告警丢弃）；
    /// 合法事件的重复应用不改变可观测状态。
    pub fn merge_event(&mut self, event: RealtimeEvent) -> Result<StateChange> {
        if event.conversation_id().is_empty() {
            bail!("事件缺少 conversationID: {:?}", event);
        }
        let mut change = StateChange::default();
        match event {
            RealtimeEvent::MessageInsert { message } => {
                if message.id.is_none() {
                    bail!("messageInsert 事件缺少服务器 ID");
                }
                // 在途发送的推送回声（服务端按 tempID 去重后原样下发临时 ID）：
                // 按确认记录就地调和，绝不落成第二个条目
                if let Some(temp_id) = message.temp_id.clone() {
                    if self.outbox.is_pending(&temp_id) {
                        debug!(
                            "[Store] 推送回声先于发送响应到达，就地确认: tempID={}",
                            temp_id
                        );
                        return Ok(self.replace_optimistic(&temp_id, message));
                    }
                }
                let conversation_id = message.conversation_id.clone();
                let inbound = message.direction == MessageDirection::Inbound;
                let created_at = message.created_at;
                let preview = preview_of(&message.content, message.msg_type);

                let timeline = self.timeline_mut(&conversation_id);
                if !timeline.insert_sorted(message.clone()) {
                    // 已在本地（推送重复投递或已被 replace_optimistic 合并）
                    return Ok(change);
                }
                change.new_messages.push(message);
                self.bump_conversation(&conversation_id, created_at, preview, inbound, &mut change);
                // 该消息可能有先到的状态更新在积压
                self.retry_pending_updates(&conversation_id, &mut change);
            }
            RealtimeEvent::MessageUpdate { update } => {
                if update.id.is_empty() {
                    bail!("messageUpdate 事件缺少服务器 ID");
                }
                match self.apply_status_update(&update) {
                    Some(msg) => change.changed_messages.push(msg),
                    None => {
                        debug!(
                            "[Store] 状态更新先于消息到达，入队等待: id={}, conversationID={}",
                            update.id, update.conversation_id
                        );
                        self.pending_status_updates
                            .entry(update.conversation_id.clone())
                            .or_default()
                            .push(update);
                    }
                }
            }
            RealtimeEvent::ConversationInsert { conversation }
            | RealtimeEvent::ConversationUpdate { conversation } => {
                if conversation.id.is_empty() {
                    bail!("会话事件缺少 ID");
                }
                if !self.conversations.contains_key(&conversation.id) {
                    self.conversations
                        .insert(conversation.id.clone(), conversation.clone());
                    self.reposition(&conversation.id);
                    change.new_conversations.push(conversation);
                } else {
                    // 服务端会话事件是未读数回落（坐席在别处已读）的唯一合法来源
                    let merged = self.merge_existing(&conversation, true);
                    if let Some(merged) = merged {
                        self.reposition(&merged.id);
                        change.changed_conversations.push(merged);
                    }
                }
            }
        }
        Ok(change)
    }

    /// 新消息落地后更新所属会话（recency 单调、未读规则、骨架会话）
    fn bump_conversation(
        &mut self,
        conversation_id: &str,
        created_at: i64,
        preview: String,
        inbound: bool,
        change: &mut StateChange,
    ) {
        let count_unread = inbound && self.active_conversation.as_deref() != Some(conversation_id);
        if !self.conversations.contains_key(conversation_id) {
            // 消息先于会话到达：用必要字段建骨架，详情等会话事件补齐
            let conv = Conversation {
                id: conversation_id.to_string(),
                status: ConversationStatus::Open,
                last_message_at: created_at,
                unread_count: if count_unread { 1 } else { 0 },
                is_favorite: false,
                assigned_to: None,
                contact_name: String::new(),
                contact_phone: String::new(),
                latest_msg: preview,
            };
            self.conversations
                .insert(conversation_id.to_string(), conv.clone());
            self.reposition(conversation_id);
            change.new_conversations.push(conv);
            return;
        }
        let updated = match self.conversations.get_mut(conversation_id) {
            Some(conv) => {
                let mut changed = false;
                if created_at > conv.last_message_at {
                    conv.last_message_at = created_at;
                    conv.latest_msg = preview;
                    changed = true;
                }
                if count_unread {
                    conv.unread_count += 1;
                    changed = true;
                }
                changed.then(|| conv.clone())
            }
            None => None,
        };
        if let Some(updated) = updated {
            self.reposition(conversation_id);
            change.changed_conversations.push(updated);
        }
    }

    // ===================== 快照读取 =====================

    /// 物化会话列表快照（去重、按 recency 降序）
    pub fn snapshot_conversations(&self) -> Vec<Conversation> {
        self.order
            .iter()
            .filter_map(|id| self.conversations.get(id).cloned())
            .collect()
    }

    /// 指定会话的消息快照（升序）
    pub fn snapshot_messages(&self, conversation_id: &str) -> Vec<ChatMessage> {
        self.timelines
            .get(conversation_id)
            .map(|t| t.messages.to_vec())
            .unwrap_or_default()
    }

    /// 总未读数（列表中所有会话的聚合）
    pub fn total_unread(&self) -> i32 {
        self.conversations.values().map(|c| c.unread_count).sum()
    }

    /// 按临时 ID 查找消息（重发失败消息时取回内容）
    pub fn find_message_by_temp_id(
        &self,
        conversation_id: &str,
        temp_id: &str,
    ) -> Option<ChatMessage> {
        self.timelines
            .get(conversation_id)
            .and_then(|t| t.position_of_temp(temp_id).map(|pos| t.messages[pos].clone()))
    }

    /// 指定会话被逐出历史的续读游标
    pub fn timeline_resume_cursor(&self, conversation_id: &str) -> Option<i64> {
        self.timelines
            .get(conversation_id)
            .and_then(|t| t.resume_cursor())
    }
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new()
    }
}

/// 字段逐一合并，`last_message_at` 带单调保护；返回是否有字段实际变化
fn merge_conversation_fields(
    existing: &mut Conversation,
    incoming: &Conversation,
    allow_unread_decrease: bool,
) -> bool {
    let mut changed = false;
    if incoming.last_message_at > existing.last_message_at {
        existing.last_message_at = incoming.last_message_at;
        if !incoming.latest_msg.is_empty() {
            existing.latest_msg = incoming.latest_msg.clone();
        }
        changed = true;
    }
    if existing.status != incoming.status {
        existing.status = incoming.status;
        changed = true;
    }
    if existing.unread_count != incoming.unread_count
        && (allow_unread_decrease || incoming.unread_count > existing.unread_count)
    {
        existing.unread_count = incoming.unread_count;
        changed = true;
    }
    if existing.is_favorite != incoming.is_favorite {
        existing.is_favorite = incoming.is_favorite;
        changed = true;
    }
    if existing.assigned_to != incoming.assigned_to {
        existing.assigned_to = incoming.assigned_to.clone();
        changed = true;
    }
    if !incoming.contact_name.is_empty() && existing.contact_name != incoming.contact_name {
        existing.contact_name = incoming.contact_name.clone();
        changed = true;
    }
    if !incoming.contact_phone.is_empty() && existing.contact_phone != incoming.contact_phone {
        existing.contact_phone = incoming.contact_phone.clone();
        changed = true;
    }
    changed
}

/// 列表展示用的最新消息摘要
fn preview_of(content: &str, msg_type: MessageType) -> String {
    match msg_type {
        MessageType::Text => content.to_string(),
        MessageType::Image => "[图片]".to_string(),
        MessageType::Video => "[视频]".to_string(),
        MessageType::Audio => "[语音]".to_string(),
        MessageType::Document => "[文件]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::message::types::SenderType;

    fn conv(id: &str, last_message_at: i64) -> Conversation {
        Conversation {
            id: id.to_string(),
            status: ConversationStatus::Open,
            last_message_at,
            unread_count: 0,
            is_favorite: false,
            assigned_to: None,
            contact_name: format!("客户-{id}"),
            contact_phone: "+8613800000000".to_string(),
            latest_msg: String::new(),
        }
    }

    fn inbound_msg(id: &str, conversation_id: &str, created_at: i64) -> ChatMessage {
        ChatMessage {
            id: Some(id.to_string()),
            temp_id: None,
            conversation_id: conversation_id.to_string(),
            content: format!("msg-{id}"),
            msg_type: MessageType::Text,
            direction: MessageDirection::Inbound,
            sender_type: SenderType::Lead,
            status: MessageStatus::Delivered,
            created_at,
            is_optimistic: false,
            failure_reason: None,
        }
    }

    fn insert_event(id: &str, conversation_id: &str, created_at: i64) -> RealtimeEvent {
        RealtimeEvent::MessageInsert {
            message: inbound_msg(id, conversation_id, created_at),
        }
    }

    fn assert_sorted(state: &ChatState, conversation_id: &str) {
        let msgs = state.snapshot_messages(conversation_id);
        for pair in msgs.windows(2) {
            assert!(
                pair[0].sort_key() < pair[1].sort_key(),
                "时间线乱序: {:?} >= {:?}",
                pair[0].sort_key(),
                pair[1].sort_key()
            );
        }
    }

    #[test]
    fn merge_is_idempotent() {
        let mut state = ChatState::new();
        let event = insert_event("M1", "c1", 100);
        state.merge_event(event.clone()).unwrap();
        let snapshot_once = state.snapshot_messages("c1");
        let convs_once = state.snapshot_conversations();

        // 同一事件二次应用不改变可观测状态（at-least-once 投递）
        let change = state.merge_event(event).unwrap();
        assert!(change.is_empty());
        assert_eq!(state.snapshot_messages("c1").len(), snapshot_once.len());
        assert_eq!(
            state.snapshot_conversations()[0].unread_count,
            convs_once[0].unread_count
        );
    }

    #[test]
    fn out_of_order_delivery_is_resorted() {
        let mut state = ChatState::new();
        state.merge_event(insert_event("M3", "c1", 300)).unwrap();
        state.merge_event(insert_event("M1", "c1", 100)).unwrap();
        state.merge_event(insert_event("M2", "c1", 200)).unwrap();
        let msgs = state.snapshot_messages("c1");
        let ids: Vec<_> = msgs.iter().map(|m| m.tiebreak_id().to_string()).collect();
        assert_eq!(ids, vec!["M1", "M2", "M3"]);
        assert_sorted(&state, "c1");
    }

    #[test]
    fn equal_timestamps_break_ties_by_id() {
        let mut state = ChatState::new();
        state.merge_event(insert_event("B", "c1", 100)).unwrap();
        state.merge_event(insert_event("A", "c1", 100)).unwrap();
        let ids: Vec<_> = state
            .snapshot_messages("c1")
            .iter()
            .map(|m| m.tiebreak_id().to_string())
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn optimistic_reconciliation_leaves_one_entry() {
        let mut state = ChatState::new();
        state.apply_conversation_page(0, vec![conv("c1", 50)]);
        let temp_id = crate::crm::serialization::generate_temp_id();
        state.add_optimistic(&temp_id, "c1", "hello", MessageType::Text, 100);

        let mut confirmed = inbound_msg("M1", "c1", 100);
        confirmed.direction = MessageDirection::Outbound;
        confirmed.sender_type = SenderType::Agent;
        confirmed.content = "hello".to_string();
        confirmed.status = MessageStatus::Sent;
        state.replace_optimistic(&temp_id, confirmed);

        let msgs = state.snapshot_messages("c1");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].id.as_deref(), Some("M1"));
        assert!(msgs[0].temp_id.is_none());
        assert!(!msgs[0].is_optimistic);

        // 场景 3：确认之后同一 ID 的实时插入事件是 no-op
        let change = state.merge_event(insert_event("M1", "c1", 100)).unwrap();
        assert!(change.is_empty());
        assert_eq!(state.snapshot_messages("c1").len(), 1);
    }

    #[test]
    fn push_arriving_before_confirm_drops_optimistic_entry() {
        let mut state = ChatState::new();
        let temp_id = crate::crm::serialization::generate_temp_id();
        state.add_optimistic(&temp_id, "c1", "hi", MessageType::Text, 100);
        // 推送通道先把确认后的消息推了下来
        let mut echoed = inbound_msg("M1", "c1", 100);
        echoed.direction = MessageDirection::Outbound;
        state
            .merge_event(RealtimeEvent::MessageInsert { message: echoed.clone() })
            .unwrap();
        // 发送调用随后返回同一条确认记录
        state.replace_optimistic(&temp_id, echoed);
        let msgs = state.snapshot_messages("c1");
        assert_eq!(msgs.len(), 1, "同一逻辑消息只允许一个活动表示");
        assert_eq!(msgs[0].id.as_deref(), Some("M1"));
    }

    #[test]
    fn push_echo_of_in_flight_send_reconciles_in_place() {
        let mut state = ChatState::new();
        let temp_id = crate::crm::serialization::generate_temp_id();
        state.add_optimistic(&temp_id, "c1", "hi", MessageType::Text, 100);

        // 服务端按 tempID 去重后，推送回声带着临时 ID 一起下发
        let mut echo = inbound_msg("M1", "c1", 100);
        echo.direction = MessageDirection::Outbound;
        echo.sender_type = SenderType::Agent;
        echo.content = "hi".to_string();
        echo.status = MessageStatus::Sent;
        echo.temp_id = Some(temp_id.clone());
        state
            .merge_event(RealtimeEvent::MessageInsert { message: echo })
            .unwrap();

        let msgs = state.snapshot_messages("c1");
        assert_eq!(msgs.len(), 1, "回声不得落成第二个条目");
        assert_eq!(msgs[0].id.as_deref(), Some("M1"));
        assert!(msgs[0].temp_id.is_none());
        assert!(!msgs[0].is_optimistic);

        // HTTP 响应随后超时：失败标记不得弄脏已确认的记录
        let change = state.mark_send_failed(&temp_id, "timeout");
        assert!(change.is_empty());
        let msgs = state.snapshot_messages("c1");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].status, MessageStatus::Sent);
        assert!(msgs[0].failure_reason.is_none());
    }

    #[test]
    fn failure_preserves_content() {
        // 场景 1：离线发送
        let mut state = ChatState::new();
        let temp_id = crate::crm::serialization::generate_temp_id();
        state.add_optimistic(&temp_id, "c1", "hello", MessageType::Text, 100);
        state.mark_send_failed(&temp_id, "network");
        let msgs = state.snapshot_messages("c1");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "hello");
        assert_eq!(msgs[0].status, MessageStatus::Failed);
        assert_eq!(msgs[0].failure_reason.as_deref(), Some("network"));
        // 终态之后的迟到更新被忽略
        let change = state.update_optimistic(&temp_id, MessageStatus::Sent);
        assert!(change.is_empty());
        assert_eq!(
            state.snapshot_messages("c1")[0].status,
            MessageStatus::Failed
        );
    }

    #[test]
    fn resend_discards_only_failed_entries() {
        let mut state = ChatState::new();
        let failed = crate::crm::serialization::generate_temp_id();
        let in_flight = crate::crm::serialization::generate_temp_id();
        state.add_optimistic(&failed, "c1", "hello", MessageType::Text, 100);
        state.add_optimistic(&in_flight, "c1", "world", MessageType::Text, 101);
        state.mark_send_failed(&failed, "network");

        // 在途条目不可丢弃
        assert!(!state.discard_failed("c1", &in_flight));
        assert!(state.discard_failed("c1", &failed));
        let msgs = state.snapshot_messages("c1");
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].content, "world");
    }

    #[test]
    fn intermediate_status_updates_are_rank_guarded() {
        let mut state = ChatState::new();
        let temp_id = crate::crm::serialization::generate_temp_id();
        state.add_optimistic(&temp_id, "c1", "hi", MessageType::Text, 100);
        state.update_optimistic(&temp_id, MessageStatus::Delivered);
        // 迟到的 sent 不允许回退
        let change = state.update_optimistic(&temp_id, MessageStatus::Sent);
        assert!(change.is_empty());
        assert_eq!(
            state.snapshot_messages("c1")[0].status,
            MessageStatus::Delivered
        );
    }

    #[test]
    fn monotonic_recency_guard() {
        let mut state = ChatState::new();
        state.apply_conversation_page(0, vec![conv("c1", 200), conv("c2", 150)]);
        // 携带更旧 lastMessageAt 的更新既不回退时间也不移动位置
        let mut stale = conv("c1", 100);
        stale.contact_name = String::new();
        let change = state
            .merge_event(RealtimeEvent::ConversationUpdate { conversation: stale })
            .unwrap();
        assert!(change.changed_conversations.is_empty());
        let list = state.snapshot_conversations();
        assert_eq!(list[0].id, "c1");
        assert_eq!(list[0].last_message_at, 200);
    }

    #[test]
    fn recency_bump_repositions_single_entry() {
        let mut state = ChatState::new();
        state.apply_conversation_page(0, vec![conv("c1", 300), conv("c2", 200), conv("c3", 100)]);
        state
            .merge_event(RealtimeEvent::ConversationUpdate {
                conversation: conv("c3", 400),
            })
            .unwrap();
        let ids: Vec<_> = state
            .snapshot_conversations()
            .iter()
            .map(|c| c.id.clone())
            .collect();
        assert_eq!(ids, vec!["c3", "c1", "c2"]);
    }

    #[test]
    fn overlapping_pages_are_deduplicated() {
        // 场景 2：两页因并发写入出现重叠
        let mut state = ChatState::new();
        state.reset_pagination(1);
        state.apply_conversation_page(1, vec![conv("A", 10), conv("B", 9)]);
        state.apply_conversation_page(1, vec![conv("B", 9), conv("C", 8)]);
        let ids: Vec<_> = state
            .snapshot_conversations()
            .iter()
            .map(|c| c.id.clone())
            .collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
    }

    #[test]
    fn stale_page_epoch_is_discarded() {
        let mut state = ChatState::new();
        state.reset_pagination(1);
        state.apply_conversation_page(1, vec![conv("A", 10)]);
        // 切换过滤范围开启新纪元；旧列表保留到新纪元首页真正到达
        state.reset_pagination(2);
        let change = state.apply_conversation_page(1, vec![conv("B", 20)]);
        assert!(change.is_empty());
        assert_eq!(state.snapshot_conversations()[0].id, "A");
        state.apply_conversation_page(2, vec![conv("C", 30)]);
        let ids: Vec<_> = state
            .snapshot_conversations()
            .iter()
            .map(|c| c.id.clone())
            .collect();
        assert_eq!(ids, vec!["C"], "新纪元首页整体取代旧列表");
    }

    #[test]
    fn new_epoch_without_pages_keeps_previous_list() {
        let mut state = ChatState::new();
        state.reset_pagination(1);
        state.apply_conversation_page(1, vec![conv("A", 10), conv("B", 9)]);
        // 刷新的抓取失败：只推进了纪元，没有页到达
        state.reset_pagination(2);
        let ids: Vec<_> = state
            .snapshot_conversations()
            .iter()
            .map(|c| c.id.clone())
            .collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn unread_counts_inbound_only_when_not_active() {
        let mut state = ChatState::new();
        state.apply_conversation_page(0, vec![conv("c1", 10), conv("c2", 10)]);
        state.set_active_conversation(Some("c1".to_string()));
        state.merge_event(insert_event("M1", "c1", 100)).unwrap();
        state.merge_event(insert_event("M2", "c2", 100)).unwrap();
        let list = state.snapshot_conversations();
        let by_id = |id: &str| list.iter().find(|c| c.id == id).cloned().unwrap();
        assert_eq!(by_id("c1").unread_count, 0, "当前打开的会话不计未读");
        assert_eq!(by_id("c2").unread_count, 1);
        assert_eq!(state.total_unread(), 1);

        // 只有显式已读才清零
        state.mark_conversation_read("c2");
        assert_eq!(state.total_unread(), 0);
    }

    #[test]
    fn page_refetch_does_not_decrement_unread() {
        let mut state = ChatState::new();
        state.apply_conversation_page(0, vec![conv("c1", 10)]);
        state.merge_event(insert_event("M1", "c1", 100)).unwrap();
        state.merge_event(insert_event("M2", "c1", 200)).unwrap();
        assert_eq!(state.total_unread(), 2);

        // 补拉的页快照落后于本地计数，未读数不得被隐式递减
        let mut stale = conv("c1", 200);
        stale.unread_count = 0;
        state.apply_conversation_page(0, vec![stale]);
        assert_eq!(state.total_unread(), 2);

        // 服务端会话事件（坐席在别处已读）才允许回落
        let mut read_elsewhere = conv("c1", 200);
        read_elsewhere.unread_count = 0;
        state
            .merge_event(RealtimeEvent::ConversationUpdate {
                conversation: read_elsewhere,
            })
            .unwrap();
        assert_eq!(state.total_unread(), 0);
    }

    #[test]
    fn status_update_for_unknown_message_is_queued_then_applied() {
        let mut state = ChatState::new();
        let update = MessageStatusUpdate {
            id: "M1".to_string(),
            conversation_id: "c1".to_string(),
            status: MessageStatus::Read,
        };
        state
            .merge_event(RealtimeEvent::MessageUpdate { update })
            .unwrap();
        // 消息还没到，更新入队而不是丢弃
        assert!(state.snapshot_messages("c1").is_empty());

        let change = state
            .apply_message_page("c1", vec![inbound_msg("M1", "c1", 100)])
            ;
        assert_eq!(change.changed_messages.len(), 1);
        assert_eq!(
            state.snapshot_messages("c1")[0].status,
            MessageStatus::Read
        );
    }

    #[test]
    fn catch_up_fetch_merges_without_duplicates() {
        // 场景 4：断线补拉
        let mut state = ChatState::new();
        state.merge_event(insert_event("M1", "c1", 100)).unwrap();
        state.merge_event(insert_event("M2", "c1", 200)).unwrap();
        // 补拉返回的页与实时已合并的消息有重叠
        let change = state.apply_message_page(
            "c1",
            vec![
                inbound_msg("M1", "c1", 100),
                inbound_msg("M2", "c1", 200),
                inbound_msg("M3", "c1", 300),
            ],
        );
        assert_eq!(change.new_messages.len(), 1);
        assert_eq!(state.snapshot_messages("c1").len(), 3);
        assert_sorted(&state, "c1");
    }

    #[test]
    fn malformed_events_are_rejected() {
        let mut state = ChatState::new();
        let mut msg = inbound_msg("M1", "c1", 100);
        msg.id = None;
        assert!(state
            .merge_event(RealtimeEvent::MessageInsert { message: msg })
            .is_err());
        let update = MessageStatusUpdate {
            id: String::new(),
            conversation_id: "c1".to_string(),
            status: MessageStatus::Read,
        };
        assert!(state
            .merge_event(RealtimeEvent::MessageUpdate { update })
            .is_err());
        // 拒绝的事件不得污染状态
        assert!(state.snapshot_messages("c1").is_empty());
        assert!(state.snapshot_conversations().is_empty());
    }

    #[test]
    fn scrollback_eviction_keeps_resume_cursor() {
        let mut state = ChatState::new();
        let page: Vec<ChatMessage> = (0..(MAX_TIMELINE_LEN as i64 + 50))
            .map(|i| inbound_msg(&format!("M{i:05}"), "c1", 1000 + i))
            .collect();
        state.apply_message_page("c1", page);
        let msgs = state.snapshot_messages("c1");
        assert_eq!(msgs.len(), MAX_TIMELINE_LEN);
        // 续读游标指向最老保留消息，可据此重新抓取被逐出的页
        assert_eq!(
            state.timeline_resume_cursor("c1"),
            Some(msgs.first().map(|m| m.created_at).unwrap_or_default())
        );
        assert_sorted(&state, "c1");
    }

    #[test]
    fn optimistic_send_bumps_conversation_to_front() {
        let mut state = ChatState::new();
        state.apply_conversation_page(0, vec![conv("c1", 100), conv("c2", 200)]);
        let temp_id = crate::crm::serialization::generate_temp_id();
        let change = state.add_optimistic(&temp_id, "c1", "你好", MessageType::Text, 300);
        assert_eq!(change.changed_conversations.len(), 1);
        let list = state.snapshot_conversations();
        assert_eq!(list[0].id, "c1");
        assert_eq!(list[0].latest_msg, "你好");
    }

    #[test]
    fn local_patches_apply_immediately() {
        let mut state = ChatState::new();
        state.apply_conversation_page(0, vec![conv("c1", 100)]);
        let change = state.patch_conversation(
            "c1",
            ConversationPatch {
                is_favorite: Some(true),
                assigned_to: Some(Some("agent_7".to_string())),
                status: Some(ConversationStatus::Pending),
            },
        );
        assert_eq!(change.changed_conversations.len(), 1);
        let c = &state.snapshot_conversations()[0];
        assert!(c.is_favorite);
        assert_eq!(c.assigned_to.as_deref(), Some("agent_7"));
        assert_eq!(c.status, ConversationStatus::Pending);
    }
}
