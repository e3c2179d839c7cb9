//! CRM 客户端核心实现模块
//!
//! 组装序列化点 actor、会话分页器、HTTP API 与推送通道。推送帧在这里
//! 解码后逐条送入状态 actor 合并；发送消息走 HTTP，乐观条目的终态也由
//! 这里决定（确认替换或标记失败）。

use crate::crm::connection::{ConnectionState, ConnectionTracker};
use crate::crm::conversation::api::ConversationApi;
use crate::crm::conversation::listener::{ConversationListener, EmptyConversationListener};
use crate::crm::conversation::paginator::ConversationPaginator;
use crate::crm::conversation::types::{ConversationPage, ConversationPatch, ConversationStatus};
use crate::crm::events::decode_push_batch;
use crate::crm::message::api::MessageApi;
use crate::crm::message::listener::{EmptyMessageListener, MessageListener};
use crate::crm::message::types::{ChatMessage, MessageStatus, MessageType};
use crate::crm::serialization::decompress_gzip;
use crate::crm::store::actor::{ChatStore, StoreListeners};
use crate::crm::types::{frame_type, ConnectAck, PushEnvelope};
use anyhow::{Context, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::interval;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, error, info, warn};

/// WebSocket 写入端类型别名
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// WebSocket 读取端类型别名
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// 心跳间隔
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// 单次拉取的消息页大小（打开会话与断线补拉共用）
const MESSAGE_PAGE_SIZE: usize = 50;

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 坐席 ID
    pub agent_id: String,
    /// 认证 token
    pub token: String,
    /// WebSocket 服务器 URL
    pub ws_url: String,
    /// 压缩方式，例如 "gzip" 或空字符串表示不压缩
    pub compression: String,
    /// HTTP API 基础地址
    pub api_base_url: String,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(agent_id: String, token: String) -> Self {
        Self {
            agent_id,
            token,
            ws_url: "ws://localhost:10001".to_string(),
            compression: "gzip".to_string(),
            api_base_url: "http://localhost:10002".to_string(),
        }
    }
}

/// CRM 客户端
///
/// `connect` 之前注册监听器，之后的所有状态变更通过监听器回调与快照读取观察。
#[derive(Clone)]
pub struct CrmClient {
    pub(crate) config: ClientConfig,
    writer: Arc<Mutex<Option<WsWriter>>>,
    connection: Arc<ConnectionTracker>,
    conversation_listener: Arc<dyn ConversationListener>,
    message_listener: Arc<dyn MessageListener>,
    store: Option<ChatStore>,
    paginator: Option<Arc<ConversationPaginator>>,
    conversation_api: Option<Arc<ConversationApi>>,
    message_api: Option<Arc<MessageApi>>,
    /// 当前打开的会话（断线补拉的目标）
    active_conversation: Arc<std::sync::Mutex<Option<String>>>,
}

impl CrmClient {
    /// 创建新的客户端
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            writer: Arc::new(Mutex::new(None)),
            connection: Arc::new(ConnectionTracker::new()),
            conversation_listener: Arc::new(EmptyConversationListener),
            message_listener: Arc::new(EmptyMessageListener),
            store: None,
            paginator: None,
            conversation_api: None,
            message_api: None,
            active_conversation: Arc::new(std::sync::Mutex::new(None)),
        }
    }

    /// 注册会话监听器（需在 `connect` 之前调用）
    pub fn set_conversation_listener(&mut self, listener: Arc<dyn ConversationListener>) {
        if self.store.is_some() {
            warn!("[Client] 连接后注册的会话监听器不会生效");
        }
        self.conversation_listener = listener;
    }

    /// 注册消息监听器（需在 `connect` 之前调用）
    pub fn set_message_listener(&mut self, listener: Arc<dyn MessageListener>) {
        if self.store.is_some() {
            warn!("[Client] 连接后注册的消息监听器不会生效");
        }
        self.message_listener = listener;
    }

    /// 构建 WebSocket 连接 URL
    fn build_url(&self, operation_id: &str) -> String {
        let compression_param = if self.config.compression.is_empty() {
            String::new()
        } else {
            format!("&compression={}", self.config.compression)
        };

        format!(
            "{}/?token={}&agentID={}&operationID={}{}",
            self.config.ws_url, self.config.token, self.config.agent_id, operation_id,
            compression_param
        )
    }

    /// 连接到服务器并在内部启动推送处理
    pub async fn connect(&mut self) -> Result<()> {
        // 状态 actor 先于任何网络活动启动，它是唯一的序列化点
        let (store, _actor_task) = ChatStore::spawn(StoreListeners {
            conversation: self.conversation_listener.clone(),
            message: self.message_listener.clone(),
        });
        self.store = Some(store.clone());

        // 带认证头的 HTTP 客户端（token 通过 default_headers 自动添加）
        let http_client = reqwest::ClientBuilder::new()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::HeaderName::from_static("token"),
                    reqwest::header::HeaderValue::from_str(&self.config.token)
                        .context("无效的 token")?,
                );
                headers
            })
            .build()
            .context("创建 HTTP 客户端失败")?;

        let conversation_api = Arc::new(ConversationApi::new(
            http_client.clone(),
            self.config.api_base_url.clone(),
            self.config.agent_id.clone(),
        ));
        self.conversation_api = Some(conversation_api.clone());
        self.message_api = Some(Arc::new(MessageApi::new(
            http_client,
            self.config.api_base_url.clone(),
            self.config.agent_id.clone(),
        )));
        let paginator = Arc::new(ConversationPaginator::new(
            conversation_api,
            store.clone(),
        ));
        self.paginator = Some(paginator.clone());

        // 横幅任务盯住连接状态，宽限期规则见 connection 模块
        let _banner_task = self
            .connection
            .spawn_banner_task(self.message_listener.clone());

        self.establish_push_channel().await?;

        // 首屏会话列表
        tokio::spawn(async move {
            info!("[Client] 🔄 加载首页会话列表");
            match paginator.refresh().await {
                Ok(page) => info!(
                    "[Client] ✅ 首页会话就绪: 条数={}, hasMore={}",
                    page.items.len(),
                    page.has_more
                ),
                Err(e) => error!("[Client] ❌ 首页会话加载失败: {e:#}"),
            }
        });

        Ok(())
    }

    /// 建立推送通道：连接、鉴权、启动心跳与读取循环
    async fn establish_push_channel(&self) -> Result<()> {
        let operation_id = format!("{}", chrono::Utc::now().timestamp_millis());
        let url = self.build_url(&operation_id);

        info!(
            "[Client] 🔗 连接到 CRM 推送服务 (agent={})",
            self.config.agent_id
        );

        let (ws_stream, response) = connect_async(&url).await?;
        info!(
            "[Client] ✅ WebSocket 连接成功, 状态: {}",
            response.status()
        );

        let (write, mut read) = ws_stream.split();
        *self.writer.lock().await = Some(write);

        // 等待连接鉴权响应
        if let Some(Ok(WsMessage::Text(text))) = read.next().await {
            debug!("[Client] 📥 WebSocket 连接响应: {}", text);
            match serde_json::from_str::<ConnectAck>(&text) {
                Ok(ack) => {
                    if ack.err_code == 0 {
                        info!("[Client] ✅ 服务器连接鉴权成功");
                    } else {
                        let error_msg = if !ack.err_dlt.is_empty() {
                            format!("{} (详情: {})", ack.err_msg, ack.err_dlt)
                        } else {
                            ack.err_msg.clone()
                        };
                        error!(
                            "[Client] ❌ WebSocket 连接失败，错误码: {}, 错误信息: {}",
                            ack.err_code, error_msg
                        );
                        return Err(anyhow::anyhow!(
                            "WebSocket 连接失败，错误码: {}, 错误信息: {}",
                            ack.err_code,
                            error_msg
                        ));
                    }
                }
                Err(e) => {
                    error!(
                        "[Client] ❌ WebSocket 响应解析失败: {}, 原始响应: {}",
                        e, text
                    );
                    return Err(anyhow::anyhow!(
                        "WebSocket 响应解析失败: {}, 原始响应: {}",
                        e,
                        text
                    ));
                }
            }
        } else {
            error!("[Client] ❌ 未收到 WebSocket 连接响应");
            return Err(anyhow::anyhow!("未收到 WebSocket 连接响应"));
        }

        // 新的连接世代：上一代通道的心跳与读取循环据此自行退出
        let session = self.connection.begin_session();
        self.connection.transition(ConnectionState::Connected);

        // 启动心跳（世代过期即停止，重连不会累积心跳任务）
        info!("[Client] 💓 启动心跳");
        let writer_for_heartbeat = self.writer.clone();
        let connection_for_heartbeat = self.connection.clone();
        tokio::spawn(async move {
            let mut ticker = interval(HEARTBEAT_INTERVAL);
            loop {
                ticker.tick().await;
                if connection_for_heartbeat.current_session() != session {
                    break;
                }
                let mut guard = writer_for_heartbeat.lock().await;
                let Some(w) = guard.as_mut() else { break };
                if w.send(WsMessage::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        });

        // 启动推送处理任务
        info!("[Client] 📥 开始监听服务器推送");
        let client = self.clone();
        tokio::spawn(async move {
            client.handle_push_frames(read).await;
            // 读取循环退出即视为本世代的通道断开；新世代已接管或被踢下线时
            // 状态已先行置好，这里不再动它
            client.connection.mark_session_lost(session);
        });

        Ok(())
    }

    /// 推送通道读取循环
    async fn handle_push_frames(&self, mut read: WsReader) {
        while let Some(frame_result) = read.next().await {
            match frame_result {
                Ok(WsMessage::Binary(data)) => {
                    self.handle_binary_frame(data).await;
                }
                Ok(WsMessage::Text(text)) => {
                    debug!("[Client] 文本帧（忽略）: {}", text);
                }
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
                Ok(WsMessage::Close(frame)) => {
                    warn!("[Client] 👋 连接关闭: {:?}", frame);
                    break;
                }
                Err(e) => {
                    error!("[Client] WebSocket 错误: {}", e);
                    break;
                }
                _ => {}
            }
        }
    }

    async fn handle_binary_frame(&self, data: Vec<u8>) {
        // 解压（靠 gzip 魔数嗅探，服务器按协商决定是否压缩）
        let decompressed = if data.len() >= 2 && data[0] == 0x1f && data[1] == 0x8b {
            match decompress_gzip(&data) {
                Ok(d) => d,
                Err(e) => {
                    error!("[Client] 解压失败: {}", e);
                    return;
                }
            }
        } else {
            data
        };

        let envelope = match serde_json::from_slice::<PushEnvelope>(&decompressed) {
            Ok(env) => env,
            Err(e) => {
                error!(
                    "[Client] JSON 解析失败: {}, 原始数据: {:?}",
                    e,
                    String::from_utf8_lossy(&decompressed)
                );
                return;
            }
        };

        match envelope.frame_type {
            frame_type::WS_PUSH_EVENT => {
                self.handle_push_events(&envelope).await;
            }
            frame_type::WS_KICK_ONLINE => {
                warn!("[Client] ⚠️ 被踢下线");
                self.connection.transition(ConnectionState::Disconnected);
                let listener = self.message_listener.clone();
                tokio::spawn(async move {
                    listener.on_kicked_offline().await;
                });
            }
            frame_type::WS_LOGOUT => {
                warn!("[Client] ⚠️ 服务端要求登出: {}", envelope.err_msg);
                self.connection.transition(ConnectionState::Disconnected);
            }
            other => {
                debug!("[Client] 未知帧类型: {}", other);
            }
        }
    }

    async fn handle_push_events(&self, envelope: &PushEnvelope) {
        if envelope.err_code != 0 {
            error!(
                "[Client] 推送帧携带错误: errCode={}, errMsg={}, operationID={}",
                envelope.err_code, envelope.err_msg, envelope.operation_id
            );
            return;
        }
        let batch = match decode_push_batch(&envelope.data) {
            Ok(batch) => batch,
            Err(e) => {
                error!("[Client] 推送事件解码失败: {e:#}");
                return;
            }
        };
        let Some(store) = &self.store else { return };
        debug!(
            "[Client] 📦 推送事件批次: 条数={}, operationID={}",
            batch.events.len(),
            envelope.operation_id
        );
        for event in batch.events {
            if let Err(e) = store.merge_event(event).await {
                error!("[Client] 事件入队失败: {e:#}");
                return;
            }
        }
    }

    fn store(&self) -> Result<&ChatStore> {
        self.store.as_ref().context("客户端尚未连接")
    }

    fn message_api(&self) -> Result<&Arc<MessageApi>> {
        self.message_api.as_ref().context("客户端尚未连接")
    }

    fn conversation_api(&self) -> Result<&Arc<ConversationApi>> {
        self.conversation_api.as_ref().context("客户端尚未连接")
    }

    fn paginator(&self) -> Result<&Arc<ConversationPaginator>> {
        self.paginator.as_ref().context("客户端尚未连接")
    }

    // ===================== 会话列表 =====================

    /// 刷新会话列表（开启新分页周期）
    pub async fn refresh_conversations(&self) -> Result<ConversationPage> {
        self.paginator()?.refresh().await
    }

    /// 加载下一页会话
    pub async fn load_more_conversations(&self) -> Result<ConversationPage> {
        self.paginator()?.load_next_page().await
    }

    /// 打开会话：置为活动会话、拉取最近消息页、标记已读
    pub async fn open_conversation(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let store = self.store()?;
        *self.active_conversation.lock().ok().context("锁中毒")? =
            Some(conversation_id.to_string());
        store
            .set_active_conversation(Some(conversation_id.to_string()))
            .await?;

        let page = self
            .message_api()?
            .fetch_messages(conversation_id, None, MESSAGE_PAGE_SIZE)
            .await?;
        store.apply_message_page(conversation_id, page).await?;
        self.mark_conversation_read(conversation_id).await?;
        store.snapshot_messages(conversation_id).await
    }

    /// 关闭当前会话（入站消息恢复计未读）
    pub async fn close_conversation(&self) -> Result<()> {
        *self.active_conversation.lock().ok().context("锁中毒")? = None;
        self.store()?.set_active_conversation(None).await
    }

    /// 向上翻页加载更早的历史消息
    pub async fn load_older_messages(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        let store = self.store()?;
        // 游标取当前最老的本地消息；历史被逐出过则用续读游标
        let snapshot = store.snapshot_messages(conversation_id).await?;
        let before = match store.timeline_resume_cursor(conversation_id).await? {
            Some(cursor) => Some(cursor),
            None => snapshot.first().map(|m| m.created_at),
        };
        let page = self
            .message_api()?
            .fetch_messages(conversation_id, before, MESSAGE_PAGE_SIZE)
            .await?;
        store.apply_message_page(conversation_id, page).await?;
        store.snapshot_messages(conversation_id).await
    }

    /// 标记会话已读（本地立即清零，服务器 fire-and-confirm）
    pub async fn mark_conversation_read(&self, conversation_id: &str) -> Result<()> {
        self.store()?.mark_conversation_read(conversation_id).await?;
        let api = self.conversation_api()?.clone();
        let conversation_id = conversation_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = api.mark_read(&conversation_id).await {
                error!("[Client] 标记已读上报失败: {e:#}");
            }
        });
        Ok(())
    }

    /// 收藏/取消收藏会话
    pub async fn toggle_favorite(&self, conversation_id: &str, is_favorite: bool) -> Result<()> {
        self.patch_conversation(
            conversation_id,
            ConversationPatch {
                is_favorite: Some(is_favorite),
                ..Default::default()
            },
        )
        .await
    }

    /// 指派会话给坐席（None 表示取消指派）
    pub async fn assign_conversation(
        &self,
        conversation_id: &str,
        agent: Option<String>,
    ) -> Result<()> {
        self.patch_conversation(
            conversation_id,
            ConversationPatch {
                assigned_to: Some(agent),
                ..Default::default()
            },
        )
        .await
    }

    /// 变更会话处理状态（open/pending/resolved）
    pub async fn set_conversation_status(
        &self,
        conversation_id: &str,
        status: ConversationStatus,
    ) -> Result<()> {
        self.patch_conversation(
            conversation_id,
            ConversationPatch {
                status: Some(status),
                ..Default::default()
            },
        )
        .await
    }

    /// 本地乐观补丁 + 服务器 fire-and-confirm
    async fn patch_conversation(
        &self,
        conversation_id: &str,
        patch: ConversationPatch,
    ) -> Result<()> {
        self.store()?
            .patch_conversation(conversation_id, patch.clone())
            .await?;
        let api = self.conversation_api()?.clone();
        let conversation_id = conversation_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = api.update_conversation(&conversation_id, &patch).await {
                error!("[Client] 会话更新上报失败: {e:#}");
            }
        });
        Ok(())
    }

    // ===================== 发送消息 =====================

    /// 发送文本消息
    pub async fn send_text_message(
        &self,
        conversation_id: &str,
        content: &str,
    ) -> Result<ChatMessage> {
        self.send_message(conversation_id, content, MessageType::Text)
            .await
    }

    /// 发送消息
    ///
    /// 乐观条目同步落地后才发起网络调用；失败时条目转入 failed 并保留内容,
    /// 不做自动重试（避免重复发送），错误原样返回给调用方。
    pub async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        msg_type: MessageType,
    ) -> Result<ChatMessage> {
        let store = self.store()?;
        let created_at = chrono::Utc::now().timestamp_millis();
        let temp_id = store
            .add_optimistic(conversation_id, content, msg_type, created_at)
            .await?;
        info!(
            "[Client] 📤 发送消息: conversationID={}, tempID={}",
            conversation_id, temp_id
        );

        match self
            .message_api()?
            .send_message(conversation_id, content, msg_type, &temp_id)
            .await
        {
            Ok(confirmed) => {
                store.replace_optimistic(&temp_id, confirmed.clone()).await?;
                Ok(confirmed)
            }
            Err(e) => {
                warn!("[Client] ❌ 消息发送失败: tempID={}, 原因: {e:#}", temp_id);
                store.mark_send_failed(&temp_id, &format!("{e:#}")).await?;
                Err(e)
            }
        }
    }

    /// 重发一条失败的消息
    ///
    /// 重发是一次全新的发送（新的临时 ID），旧的失败条目被移除而不是复活。
    pub async fn resend_message(
        &self,
        conversation_id: &str,
        temp_id: &str,
    ) -> Result<ChatMessage> {
        let store = self.store()?;
        let failed = store
            .find_message_by_temp_id(conversation_id, temp_id)
            .await?
            .context("失败消息不存在")?;
        if failed.status != MessageStatus::Failed {
            anyhow::bail!("消息不在失败状态，不能重发: tempID={temp_id}");
        }
        store.discard_failed(conversation_id, temp_id).await?;
        self.send_message(conversation_id, &failed.content, failed.msg_type)
            .await
    }

    // ===================== 连接管理 =====================

    /// 当前连接状态
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// 连接状态跟踪器（横幅订阅等）
    pub fn connection(&self) -> &Arc<ConnectionTracker> {
        &self.connection
    }

    /// 用户触发的强制重连
    ///
    /// 拆除并重建推送订阅；期间本地状态全部保留，重连成功后补拉活动会话的
    /// 最近一页，弥合断开期间漏掉的实时投递。
    pub async fn force_reconnect(&self) -> Result<()> {
        info!("[Client] 🔁 强制重连");
        self.connection.transition(ConnectionState::Disconnecting);
        if let Some(mut writer) = self.writer.lock().await.take() {
            // 主动关闭旧通道，旧读取循环随之退出
            let _ = writer.send(WsMessage::Close(None)).await;
        }
        self.connection.transition(ConnectionState::Disconnected);
        self.connection.transition(ConnectionState::Reconnecting);

        if let Err(e) = self.establish_push_channel().await {
            self.connection.transition(ConnectionState::Disconnected);
            return Err(e);
        }
        self.catch_up_after_reconnect().await
    }

    /// 断线补拉：活动会话拉最近一页与本地合并（幂等），列表刷新
    async fn catch_up_after_reconnect(&self) -> Result<()> {
        let active = self
            .active_conversation
            .lock()
            .ok()
            .context("锁中毒")?
            .clone();
        if let Some(conversation_id) = active {
            info!("[Client] 🩹 补拉活动会话: {}", conversation_id);
            let page = self
                .message_api()?
                .fetch_messages(&conversation_id, None, MESSAGE_PAGE_SIZE)
                .await?;
            self.store()?.apply_message_page(&conversation_id, page).await?;
        }
        let paginator = self.paginator()?.clone();
        tokio::spawn(async move {
            if let Err(e) = paginator.refresh().await {
                error!("[Client] 重连后会话列表刷新失败: {e:#}");
            }
        });
        Ok(())
    }

    /// 主动断开推送通道
    pub async fn disconnect(&self) -> Result<()> {
        info!("[Client] 👋 断开推送通道");
        self.connection.transition(ConnectionState::Disconnecting);
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.send(WsMessage::Close(None)).await;
        }
        self.connection.transition(ConnectionState::Disconnected);
        Ok(())
    }

    // ===================== 快照读取 =====================

    /// 会话列表快照
    pub async fn conversation_list(
        &self,
    ) -> Result<Vec<crate::crm::conversation::types::Conversation>> {
        self.store()?.snapshot_conversations().await
    }

    /// 指定会话的消息快照
    pub async fn message_list(&self, conversation_id: &str) -> Result<Vec<ChatMessage>> {
        self.store()?.snapshot_messages(conversation_id).await
    }

    /// 总未读数
    pub async fn total_unread(&self) -> Result<i32> {
        self.store()?.total_unread().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn init_test_logger() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "debug".into()),
                )
                .with_test_writer()
                .try_init();
        });
    }

    #[test]
    fn build_url_includes_auth_and_compression() {
        let client = CrmClient::new(ClientConfig::new("agent_1".into(), "tok".into()));
        let url = client.build_url("op-1");
        assert!(url.starts_with("ws://localhost:10001/?token=tok"));
        assert!(url.contains("agentID=agent_1"));
        assert!(url.contains("operationID=op-1"));
        assert!(url.contains("compression=gzip"));
    }

    #[test]
    fn build_url_omits_empty_compression() {
        let mut config = ClientConfig::new("agent_1".into(), "tok".into());
        config.compression = String::new();
        let client = CrmClient::new(config);
        assert!(!client.build_url("op-1").contains("compression"));
    }

    /// 端到端冒烟测试，需要本地起一套 CRM 服务：
    /// `cargo test --package wacrm-sync-core-rust client::tests::live -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn live_connect_and_send() {
        init_test_logger();
        let mut client = CrmClient::new(ClientConfig::new(
            std::env::var("CRM_AGENT_ID").unwrap_or_else(|_| "agent_1".into()),
            std::env::var("CRM_TOKEN").unwrap_or_default(),
        ));
        client.connect().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let list = client.conversation_list().await.unwrap();
        if let Some(conv) = list.first() {
            client.open_conversation(&conv.id).await.unwrap();
            client
                .send_text_message(&conv.id, "冒烟测试消息")
                .await
                .unwrap();
        }
        client.disconnect().await.unwrap();
    }
}
