//! # flare-session
//!
//! ## 核心意图（Why）
//! - 提供基于 `DashMap` 的会话目录，多个会话任务可并发地登记、查询、注销会话；
//! - 服务器默认持有自己构造的 [`SessionRegistry`]，生命周期归属于构造者；需要进程级目录的调用方
//!   可使用 [`SessionRegistry::instance`]。
//!
//! ## 行为契约（What）
//! - `add`：`None` 为空操作；同标识覆盖旧条目；
//! - `remove`：不存在时返回 `None`，不视为错误；
//! - `range`：遍历调用时刻的快照，访问者返回 [`ControlFlow::Break`] 即停止；
//!   遍历期间的并发增删可能被观察到，也可能不会。
//!
//! ## 风险提示（Trade-offs）
//! - `range` 先复制 `Arc` 句柄再回调，访问者内部可以安全地调用 `add`/`remove`，代价是一次
//!   与条目数成正比的分配；
//! - 目录不做超时清理，会话的注销依赖其所属任务。

use std::{
    fmt,
    ops::ControlFlow,
    sync::{Arc, OnceLock},
};

use dashmap::DashMap;
use flare_core::{Session, SessionId};

static GLOBAL_REGISTRY: OnceLock<Arc<SessionRegistry>> = OnceLock::new();

/// 活跃会话目录。
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<dyn Session>>,
}

impl SessionRegistry {
    /// 创建空目录。
    pub fn new() -> Self {
        Self::default()
    }

    /// 进程级目录，首次调用时创建，并发调用者得到同一个实例。
    pub fn instance() -> Arc<SessionRegistry> {
        Arc::clone(GLOBAL_REGISTRY.get_or_init(|| Arc::new(SessionRegistry::new())))
    }

    /// 登记会话；`None` 为空操作。
    pub fn add(&self, session: Option<Arc<dyn Session>>) {
        if let Some(session) = session {
            self.insert(session);
        }
    }

    /// 登记会话，覆盖同标识的旧条目。
    pub fn insert(&self, session: Arc<dyn Session>) {
        self.sessions.insert(session.id(), session);
    }

    /// 注销会话并返回被移除的条目。
    pub fn remove(&self, id: &SessionId) -> Option<Arc<dyn Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// 按标识查询。
    pub fn get(&self, id: &SessionId) -> Option<Arc<dyn Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// 遍历当前条目的快照。
    pub fn range<F>(&self, mut visitor: F)
    where
        F: FnMut(&SessionId, &Arc<dyn Session>) -> ControlFlow<()>,
    {
        let snapshot: Vec<(SessionId, Arc<dyn Session>)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        for (id, session) in &snapshot {
            if visitor(id, session).is_break() {
                break;
            }
        }
    }

    /// 当前会话数量。
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// 目录是否为空。
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
