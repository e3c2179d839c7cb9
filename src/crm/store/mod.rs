//! 状态存储模块
//!
//! 纯同步的 [`state::ChatState`] 持有规范数据，[`actor::ChatStore`] 是它唯一的
//! 入口：所有变更经 mpsc 命令串行应用，读取返回不可变快照。

pub mod actor;
pub mod state;

// 重新导出主要类型
pub use actor::{ChatStore, StoreCommand, StoreListeners};
pub use state::{ChatState, StateChange, MAX_TIMELINE_LEN};
