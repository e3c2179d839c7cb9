//! 会话游标分页器
//!
//! 按 `lastMessageAt` 降序分页拉取会话列表。每次多取一条（lookahead）来判定
//! 是否还有下一页，省掉单独的 count 查询；游标用严格小于语义，时间戳相撞时
//! 不会重复拉到边界项（极端情况下同时间戳的项可能被跳过，见 DESIGN.md）。

use crate::crm::conversation::api::ConversationApi;
use crate::crm::conversation::types::{Conversation, ConversationPage};
use crate::crm::store::actor::ChatStore;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// 默认会话页大小
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// 会话页的拉取来源（生产实现为 HTTP API，测试里可替换）
#[async_trait]
pub trait ConversationPageSource: Send + Sync {
    /// 拉取最多 `limit` 条会话，`cursor` 存在时只返回 `lastMessageAt`
    /// 严格小于游标的会话，降序排列
    async fn fetch_page(&self, cursor: Option<i64>, limit: usize) -> Result<Vec<Conversation>>;
}

#[async_trait]
impl ConversationPageSource for ConversationApi {
    async fn fetch_page(&self, cursor: Option<i64>, limit: usize) -> Result<Vec<Conversation>> {
        self.fetch_conversations(cursor, limit).await
    }
}

/// 分页进度（互斥保护；拉取本身不持锁，避免阻塞并发的刷新）
struct PagingState {
    epoch: u64,
    cursor: Option<i64>,
    has_more: bool,
}

/// 会话游标分页器
pub struct ConversationPaginator {
    source: Arc<dyn ConversationPageSource>,
    store: ChatStore,
    page_size: usize,
    paging: Mutex<PagingState>,
}

impl ConversationPaginator {
    pub fn new(source: Arc<dyn ConversationPageSource>, store: ChatStore) -> Self {
        Self::with_page_size(source, store, DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(
        source: Arc<dyn ConversationPageSource>,
        store: ChatStore,
        page_size: usize,
    ) -> Self {
        Self {
            source,
            store,
            page_size,
            paging: Mutex::new(PagingState {
                epoch: 0,
                cursor: None,
                has_more: true,
            }),
        }
    }

    /// 开启新的分页周期（首次加载/下拉刷新/切换过滤范围）
    ///
    /// 纪元递增使仍在途的旧页结果到达时被丢弃，旧页永远不会覆盖新页。
    pub async fn refresh(&self) -> Result<ConversationPage> {
        let epoch = {
            let mut paging = self.paging.lock().await;
            paging.epoch += 1;
            paging.cursor = None;
            paging.has_more = true;
            paging.epoch
        };
        info!("[Paginator] 🔄 开启新分页周期: epoch={}", epoch);
        self.store.reset_pagination(epoch).await?;
        self.load_next_page().await
    }

    /// 拉取下一页并提交到状态 actor
    ///
    /// 拉取失败不改动任何已提交状态，游标原地保留，重试是幂等的。
    pub async fn load_next_page(&self) -> Result<ConversationPage> {
        let (epoch, cursor) = {
            let paging = self.paging.lock().await;
            if !paging.has_more {
                return Ok(ConversationPage {
                    items: Vec::new(),
                    next_cursor: paging.cursor,
                    has_more: false,
                });
            }
            (paging.epoch, paging.cursor)
        };

        // lookahead：多取一条证明还有下一页，返回前剥掉
        let mut items = self.source.fetch_page(cursor, self.page_size + 1).await?;
        let has_more = items.len() > self.page_size;
        if has_more {
            items.truncate(self.page_size);
        }
        let next_cursor = items.last().map(|c| c.last_message_at).or(cursor);

        {
            let mut paging = self.paging.lock().await;
            if paging.epoch != epoch {
                debug!(
                    "[Paginator] 丢弃过期页结果: epoch={}, 当前={}",
                    epoch, paging.epoch
                );
                return Ok(ConversationPage {
                    items: Vec::new(),
                    next_cursor: paging.cursor,
                    has_more: paging.has_more,
                });
            }
            paging.cursor = next_cursor;
            paging.has_more = has_more;
        }

        info!(
            "[Paginator] ✅ 会话页就绪: 条数={}, 游标={:?}, hasMore={}",
            items.len(),
            next_cursor,
            has_more
        );
        // actor 侧按纪元二次拦截，跨页重复 ID 也在那里去重
        self.store
            .apply_conversation_page(epoch, items.clone())
            .await?;
        Ok(ConversationPage {
            items,
            next_cursor,
            has_more,
        })
    }

    /// 连续拉取直到没有下一页，返回展平去重后的完整列表
    pub async fn load_all(&self) -> Result<Vec<Conversation>> {
        let mut pages = vec![self.refresh().await?.items];
        loop {
            let page = self.load_next_page().await?;
            if page.items.is_empty() && !page.has_more {
                break;
            }
            let done = !page.has_more;
            pages.push(page.items);
            if done {
                break;
            }
        }
        Ok(flatten_dedup(pages))
    }
}

/// 展平多页结果并按 `id` 去重，保留首次出现
///
/// 页边界上的会话可能因并发写入跨过游标被返回两次，去重是分页协议的
/// 一部分而不是防御动作。
pub fn flatten_dedup(pages: impl IntoIterator<Item = Vec<Conversation>>) -> Vec<Conversation> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for page in pages {
        for conv in page {
            if seen.insert(conv.id.clone()) {
                out.push(conv);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::conversation::listener::EmptyConversationListener;
    use crate::crm::conversation::types::ConversationStatus;
    use crate::crm::message::listener::EmptyMessageListener;
    use crate::crm::store::actor::{ChatStore, StoreListeners};
    use anyhow::bail;
    use std::sync::Mutex as StdMutex;

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

    /// 预置页序列的假来源，记录每次调用的 (cursor, limit)
    struct ScriptedSource {
        pages: StdMutex<Vec<Result<Vec<Conversation>>>>,
        calls: StdMutex<Vec<(Option<i64>, usize)>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<Vec<Conversation>>>) -> Self {
            Self {
                pages: StdMutex::new(pages),
                calls: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ConversationPageSource for ScriptedSource {
        async fn fetch_page(
            &self,
            cursor: Option<i64>,
            limit: usize,
        ) -> Result<Vec<Conversation>> {
            self.calls.lock().unwrap().push((cursor, limit));
            let mut pages = self.pages.lock().unwrap();
            if pages.is_empty() {
                bail!("没有更多预置页");
            }
            pages.remove(0)
        }
    }

    fn spawn_store() -> ChatStore {
        let (store, _task) = ChatStore::spawn(StoreListeners {
            conversation: Arc::new(EmptyConversationListener),
            message: Arc::new(EmptyMessageListener),
        });
        store
    }

    #[tokio::test]
    async fn lookahead_proves_has_more_and_is_stripped() {
        // pageSize 2，来源返回 3 条：A(10) B(9) C(8)
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![
            conv("A", 10),
            conv("B", 9),
            conv("C", 8),
        ])]));
        let paginator = ConversationPaginator::with_page_size(source.clone(), spawn_store(), 2);

        let page = paginator.refresh().await.unwrap();
        assert_eq!(
            page.items.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
        assert!(page.has_more);
        // 游标是最后一条“返回给调用方”的项，而不是 lookahead 项
        assert_eq!(page.next_cursor, Some(9));
        assert_eq!(source.calls.lock().unwrap()[0], (None, 3));
    }

    #[tokio::test]
    async fn next_page_uses_strictly_older_cursor() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(vec![conv("A", 10), conv("B", 9), conv("C", 8)]),
            // 并发写入把 B 顶过了游标边界，第二页再次返回 B
            Ok(vec![conv("B", 9), conv("D", 7)]),
        ]));
        let store = spawn_store();
        let paginator = ConversationPaginator::with_page_size(source.clone(), store.clone(), 2);

        paginator.refresh().await.unwrap();
        let page2 = paginator.load_next_page().await.unwrap();
        assert!(!page2.has_more);
        assert_eq!(source.calls.lock().unwrap()[1], (Some(9), 3));

        // 状态侧去重：B 只出现一次，保留首次出现
        let list = store.snapshot_conversations().await.unwrap();
        let ids: Vec<_> = list.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "D"]);
    }

    #[tokio::test]
    async fn exhausted_pagination_short_circuits() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(vec![conv("A", 10)])]));
        let paginator = ConversationPaginator::with_page_size(source.clone(), spawn_store(), 2);

        let page = paginator.refresh().await.unwrap();
        assert!(!page.has_more);
        // 没有下一页时不再打到来源
        let empty = paginator.load_next_page().await.unwrap();
        assert!(empty.items.is_empty());
        assert_eq!(source.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_leaves_cursor_untouched() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(vec![conv("A", 10), conv("B", 9), conv("C", 8)]),
            Err(anyhow::anyhow!("网络错误")),
            Ok(vec![conv("C", 8)]),
        ]));
        let store = spawn_store();
        let paginator = ConversationPaginator::with_page_size(source.clone(), store.clone(), 2);

        paginator.refresh().await.unwrap();
        assert!(paginator.load_next_page().await.is_err());
        // 失败后重试用同一个游标，且已提交的页原封不动
        let retried = paginator.load_next_page().await.unwrap();
        assert_eq!(retried.items[0].id, "C");
        let calls = source.calls.lock().unwrap();
        assert_eq!(calls[1].0, Some(9));
        assert_eq!(calls[2].0, Some(9));
    }

    #[tokio::test]
    async fn refresh_supersedes_previous_cycle() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(vec![conv("A", 10), conv("B", 9), conv("C", 8)]),
            Ok(vec![conv("X", 100), conv("Y", 90)]),
        ]));
        let store = spawn_store();
        let paginator = ConversationPaginator::with_page_size(source.clone(), store.clone(), 2);

        paginator.refresh().await.unwrap();
        // 刷新开启新纪元，旧周期的列表被整体取代
        paginator.refresh().await.unwrap();
        let list = store.snapshot_conversations().await.unwrap();
        let ids: Vec<_> = list.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["X", "Y"]);
        // 新周期从空游标开始
        assert_eq!(source.calls.lock().unwrap()[1], (None, 3));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_list() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(vec![conv("A", 10), conv("B", 9)]),
            Err(anyhow::anyhow!("网络错误")),
            Ok(vec![conv("X", 100)]),
        ]));
        let store = spawn_store();
        let paginator = ConversationPaginator::with_page_size(source.clone(), store.clone(), 2);

        paginator.refresh().await.unwrap();
        assert_eq!(store.snapshot_conversations().await.unwrap().len(), 2);

        // 下拉刷新的抓取失败：已展示的列表原封不动
        assert!(paginator.refresh().await.is_err());
        let list = store.snapshot_conversations().await.unwrap();
        let ids: Vec<_> = list.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);

        // 再次刷新成功后才整体取代
        paginator.refresh().await.unwrap();
        let list = store.snapshot_conversations().await.unwrap();
        let ids: Vec<_> = list.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["X"]);
    }

    #[test]
    fn flatten_dedup_keeps_first_occurrence() {
        let mut first_b = conv("B", 9);
        first_b.contact_name = "首次出现".to_string();
        let pages = vec![
            vec![conv("A", 10), first_b],
            vec![conv("B", 9), conv("C", 8)],
        ];
        let flat = flatten_dedup(pages);
        let ids: Vec<_> = flat.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(flat[1].contact_name, "首次出现");
    }
}
