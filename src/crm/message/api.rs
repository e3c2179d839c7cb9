//! 消息 HTTP API 客户端
//!
//! 发送消息与拉取历史消息页。发送可能独立超时/失败，由调用方决定
//! 乐观条目的终态（替换或标记失败）。

use crate::crm::message::types::{ChatMessage, MessageType};
use crate::crm::types::handle_http_response;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

/// 消息相关的 HTTP API 客户端
pub struct MessageApi {
    client: reqwest::Client,
    api_base_url: String,
    agent_id: String,
}

impl MessageApi {
    pub fn new(client: reqwest::Client, api_base_url: String, agent_id: String) -> Self {
        Self {
            client,
            api_base_url,
            agent_id,
        }
    }

    /// 发送消息，成功时返回服务器确认记录（含服务器分配的 ID）
    pub async fn send_message(
        &self,
        conversation_id: &str,
        content: &str,
        msg_type: MessageType,
        temp_id: &str,
    ) -> Result<ChatMessage> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/message/send", self.api_base_url);

        info!("[MsgAPI] 📡 发送消息");
        debug!(
            "[MsgAPI]   请求URL: {}, conversationID: {}, tempID: {}, 操作ID: {}",
            url, conversation_id, temp_id, operation_id
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&serde_json::json!({
                "agentID": self.agent_id,
                "conversationID": conversation_id,
                "content": content,
                "type": msg_type,
                // 服务端用 tempID 做发送幂等去重
                "tempID": temp_id,
            }))
            .send()
            .await
            .context("请求失败")?;

        #[derive(Deserialize)]
        struct SendMessageData {
            message: ChatMessage,
        }

        let api_resp = handle_http_response::<SendMessageData>(response, "发送消息").await?;
        let data = api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 data 字段"))?;

        info!(
            "[MsgAPI] ✅ 消息发送成功: id={:?}, tempID={}",
            data.message.id, temp_id
        );
        Ok(data.message)
    }

    /// 拉取一页历史消息
    ///
    /// `before` 为游标（createdAt，严格更早），None 表示从最新开始；
    /// 断线补拉也走这里（`before=None` 拿最近一页与本地合并即可）。
    pub async fn fetch_messages(
        &self,
        conversation_id: &str,
        before: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/message/list", self.api_base_url);

        info!("[MsgAPI] 📡 请求消息分页");
        debug!(
            "[MsgAPI]   请求URL: {}, conversationID: {}, before: {:?}, limit: {}, 操作ID: {}",
            url, conversation_id, before, limit, operation_id
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&serde_json::json!({
                "agentID": self.agent_id,
                "conversationID": conversation_id,
                "before": before,
                "limit": limit,
            }))
            .send()
            .await
            .context("请求失败")?;

        #[derive(Deserialize)]
        struct MessageListData {
            #[serde(default)]
            messages: Vec<ChatMessage>,
        }

        let api_resp = handle_http_response::<MessageListData>(response, "消息分页").await?;
        let data = api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 data 字段"))?;

        info!("[MsgAPI] ✅ 消息分页响应，消息数: {}", data.messages.len());
        Ok(data.messages)
    }
}
