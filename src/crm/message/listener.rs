//! 消息与连接监听器回调接口

use crate::crm::connection::ConnectionState;
use crate::crm::message::types::ChatMessage;
use async_trait::async_trait;

/// 消息监听器回调接口
#[async_trait]
pub trait MessageListener: Send + Sync {
    /// 收到新消息（实时推送、补拉或本地乐观落地）
    async fn on_recv_new_message(&self, message: ChatMessage);

    /// 消息状态变更（sending/sent/delivered/read/failed）
    async fn on_message_status_changed(&self, message: ChatMessage);

    /// 连接状态变化
    async fn on_connection_status_changed(&self, state: ConnectionState);

    /// 掉线横幅显隐（短暂抖动不触发，见连接模块的宽限期）
    async fn on_connection_banner_changed(&self, visible: bool);

    /// 被踢下线（同一坐席在别处登录）
    async fn on_kicked_offline(&self);
}

/// 空的消息监听器实现（默认实现）
pub struct EmptyMessageListener;

#[async_trait]
impl MessageListener for EmptyMessageListener {
    async fn on_recv_new_message(&self, _message: ChatMessage) {}
    async fn on_message_status_changed(&self, _message: ChatMessage) {}
    async fn on_connection_status_changed(&self, _state: ConnectionState) {}
    async fn on_connection_banner_changed(&self, _visible: bool) {}
    async fn on_kicked_offline(&self) {}
}
