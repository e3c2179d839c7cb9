//! 会话 HTTP API 客户端
//!
//! 负责所有会话相关的 HTTP 请求

use crate::crm::conversation::types::{Conversation, ConversationPatch};
use crate::crm::types::handle_http_response;
use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

/// 会话相关的 HTTP API 客户端
pub struct ConversationApi {
    client: reqwest::Client,
    api_base_url: String,
    agent_id: String,
}

impl ConversationApi {
    /// 创建新的会话 API 客户端
    ///
    /// `client` 应该已经在外部配置好认证头
    pub fn new(client: reqwest::Client, api_base_url: String, agent_id: String) -> Self {
        Self {
            client,
            api_base_url,
            agent_id,
        }
    }

    /// 按游标拉取一页会话（服务器按 lastMessageAt 降序返回，
    /// 游标存在时只返回严格更早的会话）
    pub async fn fetch_conversations(
        &self,
        cursor: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Conversation>> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}/conversation/list", self.api_base_url);

        info!("[ConvAPI] 📡 请求会话分页");
        debug!(
            "[ConvAPI]   请求URL: {}, 游标: {:?}, limit: {}, 操作ID: {}",
            url, cursor, limit, operation_id
        );

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&serde_json::json!({
                "agentID": self.agent_id,
                "cursor": cursor,
                "limit": limit,
            }))
            .send()
            .await
            .context("请求失败")?;

        #[derive(Deserialize)]
        struct ConversationListData {
            #[serde(default)]
            conversations: Vec<Conversation>,
        }

        let api_resp = handle_http_response::<ConversationListData>(response, "会话分页").await?;
        let data = api_resp
            .data
            .ok_or_else(|| anyhow::anyhow!("响应中缺少 data 字段"))?;

        info!("[ConvAPI] ✅ 会话分页响应，会话数: {}", data.conversations.len());
        debug!(
            "[ConvAPI]   会话ID列表: {:?}",
            data.conversations.iter().map(|c| &c.id).collect::<Vec<_>>()
        );

        Ok(data.conversations)
    }

    /// 标记会话已读
    pub async fn mark_read(&self, conversation_id: &str) -> Result<()> {
        self.post_action(
            "/conversation/mark_read",
            "标记已读",
            serde_json::json!({
                "agentID": self.agent_id,
                "conversationID": conversation_id,
            }),
        )
        .await
    }

    /// 提交会话字段变更（收藏/指派/状态），None 字段不发送
    pub async fn update_conversation(
        &self,
        conversation_id: &str,
        patch: &ConversationPatch,
    ) -> Result<()> {
        let mut body = serde_json::json!({
            "agentID": self.agent_id,
            "conversationID": conversation_id,
        });
        if let Some(status) = patch.status {
            body["status"] = serde_json::to_value(status).context("序列化会话状态失败")?;
        }
        if let Some(fav) = patch.is_favorite {
            body["isFavorite"] = serde_json::Value::Bool(fav);
        }
        if let Some(assigned) = &patch.assigned_to {
            body["assignedTo"] = match assigned {
                Some(agent) => serde_json::Value::String(agent.clone()),
                None => serde_json::Value::Null,
            };
        }
        self.post_action("/conversation/update", "会话更新", body)
            .await
    }

    async fn post_action(
        &self,
        path: &str,
        operation_name: &str,
        body: serde_json::Value,
    ) -> Result<()> {
        let operation_id = Uuid::new_v4().to_string();
        let url = format!("{}{}", self.api_base_url, path);

        info!("[ConvAPI] 📡 {}", operation_name);
        debug!("[ConvAPI]   请求URL: {}, 操作ID: {}", url, operation_id);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("operationID", &operation_id)
            .json(&body)
            .send()
            .await
            .context("请求失败")?;

        // 只关心业务错误码，data 字段忽略
        handle_http_response::<serde_json::Value>(response, operation_name).await?;
        info!("[ConvAPI] ✅ {}成功", operation_name);
        Ok(())
    }
}
