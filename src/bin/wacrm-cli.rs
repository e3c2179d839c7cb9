//! WhatsApp CRM CLI 客户端（测试版）
//!
//! 非交互式 CLI，用于测试和展示会话同步功能
//! 启动时通过命令行参数指定坐席与 token，自动连接，展示接收到的事件

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info};
use wacrm_sync_core_rust::crm::client::{ClientConfig, CrmClient};
use wacrm_sync_core_rust::crm::connection::ConnectionState;
use wacrm_sync_core_rust::crm::conversation::listener::ConversationListener;
use wacrm_sync_core_rust::crm::conversation::types::Conversation;
use wacrm_sync_core_rust::crm::message::listener::MessageListener;
use wacrm_sync_core_rust::crm::message::types::ChatMessage;

/// WhatsApp CRM CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "wacrm-cli")]
#[command(about = "WhatsApp CRM CLI 客户端 - 用于测试和展示会话同步功能", long_about = None)]
struct Args {
    /// 坐席 ID
    #[arg(short, long, default_value = "agent_1")]
    agent: String,

    /// 认证 token（也可通过环境变量 CRM_TOKEN 提供）
    #[arg(short, long, default_value = "")]
    token: String,

    /// API 基础地址
    #[arg(long, default_value = "http://localhost:10002")]
    api_url: String,

    /// WebSocket 推送地址
    #[arg(long, default_value = "ws://localhost:10001")]
    ws_url: String,

    /// 运行时长（秒），0 表示持续运行
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// 日志级别（默认: info,wacrm_sync_core_rust=debug）
    #[arg(long, default_value = "info,wacrm_sync_core_rust=debug")]
    log_level: String,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // 创建日志文件（追加模式）
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")?;

    // 输出到 stdout（控制台），保留 ANSI 颜色代码用于终端显示
    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 输出到文件，禁用 ANSI 颜色代码（文件不需要颜色）
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
    Ok(())
}

/// 设置监听器（输出所有接收到的信息）
fn setup_listeners(client: &mut CrmClient) {
    // 会话监听器
    struct CliConversationListener;
    #[async_trait::async_trait]
    impl ConversationListener for CliConversationListener {
        async fn on_new_conversation(&self, conversation_list: Vec<Conversation>) {
            for conv in conversation_list {
                info!(
                    "[CLI/Conversation] 🆕 新会话: {} | {} | 未读: {}",
                    conv.id, conv.contact_name, conv.unread_count
                );
            }
        }

        async fn on_conversation_changed(&self, conversation_list: Vec<Conversation>) {
            for conv in conversation_list {
                info!(
                    "[CLI/Conversation] 🔄 会话变更: {} | 未读: {} | 最新: {}",
                    conv.id,
                    conv.unread_count,
                    conv.latest_msg.chars().take(30).collect::<String>()
                );
            }
        }

        async fn on_total_unread_message_count_changed(&self, total_unread_count: i32) {
            info!("[CLI/Conversation] 📬 总未读数: {}", total_unread_count);
        }
    }
    client.set_conversation_listener(Arc::new(CliConversationListener));

    // 消息监听器
    struct CliMessageListener;
    #[async_trait::async_trait]
    impl MessageListener for CliMessageListener {
        async fn on_recv_new_message(&self, message: ChatMessage) {
            info!(
                "[CLI/Message] 📨 收到新消息: conversationID={}, id={:?}, 内容: {}",
                message.conversation_id,
                message.id,
                message.content.chars().take(50).collect::<String>()
            );
        }

        async fn on_message_status_changed(&self, message: ChatMessage) {
            info!(
                "[CLI/Message] 📖 状态变更: id={:?}, tempID={:?}, status={:?}",
                message.id, message.temp_id, message.status
            );
        }

        async fn on_connection_status_changed(&self, state: ConnectionState) {
            match state {
                ConnectionState::Connected => info!("[CLI/Message] 🔗 已连接"),
                other => error!("[CLI/Message] 🔗 连接状态: {}", other),
            }
        }

        async fn on_connection_banner_changed(&self, visible: bool) {
            if visible {
                error!("[CLI/Message] 🚧 网络连接已断开（横幅展示）");
            } else {
                info!("[CLI/Message] 🚧 网络恢复（横幅隐藏）");
            }
        }

        async fn on_kicked_offline(&self) {
            error!("[CLI/Message] ⚠️ 被踢下线");
        }
    }
    client.set_message_listener(Arc::new(CliMessageListener));
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    init_logger(&args.log_level)?;

    info!("[CLI] 🚀 WhatsApp CRM CLI 客户端（测试模式）");
    info!("[CLI] 👤 坐席: {}", args.agent);
    info!("[CLI] ⏱️  运行时长: {} 秒（0=持续运行）", args.duration);

    let token = if args.token.is_empty() {
        std::env::var("CRM_TOKEN").unwrap_or_default()
    } else {
        args.token.clone()
    };

    // 创建客户端
    let mut config = ClientConfig::new(args.agent.clone(), token);
    config.api_base_url = args.api_url.clone();
    config.ws_url = args.ws_url.clone();
    let mut client = CrmClient::new(config);

    // 设置监听器
    setup_listeners(&mut client);

    // 连接
    info!("[CLI] 🔗 正在连接服务器...");
    client
        .connect()
        .await
        .map_err(|e| anyhow::anyhow!("连接失败: {e:#}"))?;
    info!("[CLI] ✅ 连接成功！");

    // 等首页会话加载完成后显示初始信息
    sleep(Duration::from_secs(1)).await;
    if let Ok(conversations) = client.conversation_list().await {
        info!("[CLI] 📋 会话列表（共 {} 个）:", conversations.len());
        for conv in conversations.iter().take(5) {
            info!(
                "[CLI]   - {} | 未读: {} | 最新: {}",
                conv.contact_name,
                conv.unread_count,
                conv.latest_msg.chars().take(30).collect::<String>()
            );
        }
    }
    if let Ok(unread) = client.total_unread().await {
        info!("[CLI] 📬 总未读数: {}", unread);
    }

    info!("[CLI] 📥 开始监听事件...");
    info!("[CLI] 💡 提示：程序将持续运行并显示接收到的所有消息和事件");
    if args.duration > 0 {
        info!("[CLI] ⏰ {} 秒后自动退出", args.duration);
        sleep(Duration::from_secs(args.duration)).await;
        client.disconnect().await?;
        info!("[CLI] 👋 程序退出");
    } else {
        info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
        // 持续运行直到被中断
        loop {
            sleep(Duration::from_secs(3600)).await;
        }
    }

    Ok(())
}
