//! 推送通道连接状态机
//!
//! 状态变迁 `connected → disconnecting → disconnected → reconnecting → connected`
//! 实时记录，但掉线横幅延迟一个宽限期才对外展示，避免瞬断导致的闪烁。

use crate::crm::message::listener::MessageListener;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// 掉线横幅的展示宽限期
pub const BANNER_GRACE: Duration = Duration::from_secs(3);

/// 推送通道连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Connected,
    Disconnecting,
    Disconnected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// 连接状态跟踪器
///
/// 状态通过 watch 通道广播；横幅显隐由 [`spawn_banner_task`](Self::spawn_banner_task)
/// 派生的任务按宽限期规则维护。
pub struct ConnectionTracker {
    state_tx: watch::Sender<ConnectionState>,
    banner_tx: watch::Sender<bool>,
    /// 连接世代：每次建立新通道时递增，旧通道的后台任务据此自行退出
    session: AtomicU64,
    grace: Duration,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::with_grace(BANNER_GRACE)
    }

    pub fn with_grace(grace: Duration) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (banner_tx, _) = watch::channel(false);
        Self {
            state_tx,
            banner_tx,
            session: AtomicU64::new(0),
            grace,
        }
    }

    /// 记录一次状态变迁（立即生效，横幅展示另行延迟）
    pub fn transition(&self, to: ConnectionState) {
        let from = *self.state_tx.borrow();
        if from == to {
            return;
        }
        info!("[Connection] 状态变迁: {} -> {}", from, to);
        // 没有订阅者时也要保存最新值
        self.state_tx.send_replace(to);
    }

    /// 开启新的连接世代，返回世代号
    pub fn begin_session(&self) -> u64 {
        self.session.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_session(&self) -> u64 {
        self.session.load(Ordering::SeqCst)
    }

    /// 指定世代的读取循环退出时调用：只有它仍是当前世代、且状态还是
    /// connected 时才判定掉线，避免旧通道的收尾误伤刚建好的新通道。
    pub fn mark_session_lost(&self, session: u64) {
        if self.current_session() == session && self.is_connected() {
            self.transition(ConnectionState::Disconnected);
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn banner_visible(&self) -> bool {
        *self.banner_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_banner(&self) -> watch::Receiver<bool> {
        self.banner_tx.subscribe()
    }

    /// 启动横幅维护任务
    ///
    /// 进入 disconnected/reconnecting 后先等待宽限期，期间恢复 connected 则
    /// 不展示横幅；恢复 connected 时横幅立即隐藏。状态变化与横幅显隐都会
    /// 转发给监听器。
    pub fn spawn_banner_task(&self, listener: Arc<dyn MessageListener>) -> JoinHandle<()> {
        let mut state_rx = self.state_tx.subscribe();
        let banner_tx = self.banner_tx.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            let mut banner_visible = false;
            loop {
                if state_rx.changed().await.is_err() {
                    return;
                }
                let state = *state_rx.borrow_and_update();
                listener.on_connection_status_changed(state).await;
                match state {
                    ConnectionState::Connected => {
                        if banner_visible {
                            banner_visible = false;
                            banner_tx.send_replace(false);
                            listener.on_connection_banner_changed(false).await;
                        }
                    }
                    ConnectionState::Disconnecting => {}
                    ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                        if banner_visible {
                            continue;
                        }
                        debug!("[Connection] 进入宽限期: {:?}", grace);
                        let deadline = tokio::time::sleep(grace);
                        tokio::pin!(deadline);
                        loop {
                            tokio::select! {
                                _ = &mut deadline => {
                                    banner_visible = true;
                                    banner_tx.send_replace(true);
                                    listener.on_connection_banner_changed(true).await;
                                    break;
                                }
                                changed = state_rx.changed() => {
                                    if changed.is_err() {
                                        return;
                                    }
                                    let next = *state_rx.borrow_and_update();
                                    listener.on_connection_status_changed(next).await;
                                    if next == ConnectionState::Connected {
                                        // 宽限期内恢复，横幅不展示
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        })
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::message::listener::EmptyMessageListener;

    #[test]
    fn transitions_are_recorded_without_subscribers() {
        // 横幅任务尚未启动（或已退出）时状态也必须可读
        let tracker = ConnectionTracker::new();
        tracker.transition(ConnectionState::Connected);
        assert!(tracker.is_connected());
        tracker.transition(ConnectionState::Disconnected);
        assert_eq!(tracker.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn stale_session_exit_does_not_clobber_new_channel() {
        let tracker = ConnectionTracker::new();
        let old = tracker.begin_session();
        tracker.transition(ConnectionState::Connected);

        // 重连：新世代接管，随后旧世代的读取循环才退出
        let current = tracker.begin_session();
        tracker.mark_session_lost(old);
        assert!(tracker.is_connected(), "旧通道收尾不得影响新通道");

        // 当前世代的读取循环退出才是真掉线
        tracker.mark_session_lost(current);
        assert_eq!(tracker.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_blip_does_not_show_banner() {
        let tracker = ConnectionTracker::new();
        let _task = tracker.spawn_banner_task(Arc::new(EmptyMessageListener));

        tracker.transition(ConnectionState::Connected);
        tracker.transition(ConnectionState::Disconnected);
        tokio::time::sleep(Duration::from_secs(1)).await;
        tracker.transition(ConnectionState::Connected);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!tracker.banner_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_disconnect_shows_banner_after_grace() {
        let tracker = ConnectionTracker::new();
        let _task = tracker.spawn_banner_task(Arc::new(EmptyMessageListener));

        tracker.transition(ConnectionState::Connected);
        tracker.transition(ConnectionState::Disconnected);
        tokio::time::sleep(BANNER_GRACE + Duration::from_millis(100)).await;
        assert!(tracker.banner_visible());

        // 重连中横幅保持，恢复后立即隐藏
        tracker.transition(ConnectionState::Reconnecting);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(tracker.banner_visible());
        tracker.transition(ConnectionState::Connected);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!tracker.banner_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn state_is_tracked_immediately_regardless_of_banner() {
        let tracker = ConnectionTracker::new();
        let _task = tracker.spawn_banner_task(Arc::new(EmptyMessageListener));

        tracker.transition(ConnectionState::Connected);
        tracker.transition(ConnectionState::Disconnecting);
        assert_eq!(tracker.state(), ConnectionState::Disconnecting);
        tracker.transition(ConnectionState::Disconnected);
        assert_eq!(tracker.state(), ConnectionState::Disconnected);
        assert!(!tracker.banner_visible());
    }
}
