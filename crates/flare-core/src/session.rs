//! 会话契约。

use std::{
    fmt,
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
};

use thiserror::Error;

use crate::{codec::CodecError, message::MessageEntry, packer::PackError};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// 进程内唯一的会话标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// 分配下一个会话标识；单调递增，进程内不会重复。
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// 以给定数值构造标识，主要用于测试与外部会话实现。
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// 原始数值。
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess-{}", self.0)
    }
}

/// 与单个远端的一段逻辑会话。
///
/// # 契约说明（What）
/// - `id`：整个生命周期内保持不变；
/// - `send`：将响应条目分帧后放入出站队列，会话关闭后返回 [`SessionError::Closed`]；
/// - `close`：幂等；关闭后出站队列不再接收新条目，已排队的条目仍可被写出；
/// - 实现必须能同时被“读处理”与“写排空”两个任务安全使用。
pub trait Session: Send + Sync + 'static {
    /// 会话标识。
    fn id(&self) -> SessionId;

    /// 对端地址；无连接语义之外的实现可返回 `None`。
    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// 发送一条响应。
    fn send(&self, entry: MessageEntry) -> Result<(), SessionError>;

    /// 关闭会话。
    fn close(&self);

    /// 会话是否已经关闭。
    fn is_closed(&self) -> bool;
}

/// 会话层错误。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// 会话已关闭。
    #[error("session {0} is closed")]
    Closed(SessionId),
    /// 分帧失败。
    #[error("packer failure: {0}")]
    Pack(#[from] PackError),
    /// 消息体编解码失败。
    #[error("codec failure: {0}")]
    Codec(#[from] CodecError),
}
