//! 公共线协议类型
//!
//! 推送通道的请求/响应包裹结构与 HTTP API 的统一响应结构。

use serde::{Deserialize, Serialize};

/// WebSocket 帧类型标识符
pub mod frame_type {
    /// 服务端推送事件批次
    pub const WS_PUSH_EVENT: i32 = 2001;
    /// 被踢下线（同一坐席在别处登录）
    pub const WS_KICK_ONLINE: i32 = 2002;
    /// 服务端要求登出
    pub const WS_LOGOUT: i32 = 2003;
}

/// 推送通道二进制帧的包裹结构
#[derive(Debug, Serialize, Deserialize)]
pub struct PushEnvelope {
    #[serde(rename = "frameType")]
    pub frame_type: i32,
    #[serde(rename = "operationID")]
    pub operation_id: String,
    #[serde(rename = "errCode")]
    pub err_code: i32,
    #[serde(rename = "errMsg")]
    pub err_msg: String,
    /// 事件批次的 JSON 载荷（线格式为 base64）
    #[serde(
        default,
        deserialize_with = "crate::crm::serialization::deserialize_base64"
    )]
    pub data: Vec<u8>,
}

/// WebSocket 连接鉴权响应（文本帧）
#[derive(Debug, Deserialize)]
pub struct ConnectAck {
    #[serde(rename = "errCode")]
    pub err_code: i32,
    #[serde(rename = "errMsg")]
    pub err_msg: String,
    #[serde(rename = "errDlt", default)]
    pub err_dlt: String,
    /// data 字段可能为 null、缺失或包含实际数据
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// 统一的 API 响应包装结构体（包含 errCode、errMsg、data）
/// data 字段可能为 null 或缺失，因此使用 Option<T>
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(rename = "errCode")]
    pub err_code: i32,
    #[serde(rename = "errMsg")]
    pub err_msg: String,
    pub data: Option<T>,
}

/// 通用 HTTP 响应处理函数：直接反序列化为统一的响应结构体
///
/// 返回 `ApiResponse<T>`，调用方按需处理 `data` 字段（可能为 None）。
/// 所有 API 都共用此方法。
pub async fn handle_http_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    operation_name: &str,
) -> anyhow::Result<ApiResponse<T>> {
    use anyhow::Context;
    use tracing::{debug, error};

    let status = response.status();

    // 读取 body bytes（只能读取一次）
    let body_bytes = response.bytes().await.context("读取响应 body 失败")?;
    let body_str = String::from_utf8_lossy(&body_bytes);

    if !status.is_success() {
        error!(
            "[HTTP] {}请求失败，HTTP状态: {}, 响应: {}",
            operation_name, status, body_str
        );
        return Err(anyhow::anyhow!("HTTP 错误 {}: {}", status, body_str));
    }
    debug!("[HTTP] {}请求成功，HTTP状态: {}", operation_name, status);

    let api_resp: ApiResponse<T> = serde_json::from_slice(&body_bytes).map_err(|e| {
        error!(
            "[HTTP] {}反序列化失败: {:?}\n原始响应: {}",
            operation_name, e, body_str
        );
        anyhow::anyhow!("反序列化响应失败: {:?}", e)
    })?;

    // 检查业务错误码
    if api_resp.err_code != 0 {
        error!(
            "[HTTP] {}服务器错误，错误码: {}, 错误信息: {}",
            operation_name, api_resp.err_code, api_resp.err_msg
        );
        return Err(anyhow::anyhow!(
            "服务器错误 {}: {}",
            api_resp.err_code,
            api_resp.err_msg
        ));
    }

    Ok(api_resp)
}
