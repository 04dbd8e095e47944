use std::{fmt, io, net::SocketAddr, path::PathBuf};

use thiserror::Error;

/// 服务器生命周期状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerState {
    /// 已构造，尚未开始服务。
    Constructed,
    /// 正在接收报文。
    Serving,
    /// 已停止；终态。
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServerState::Constructed => "constructed",
            ServerState::Serving => "serving",
            ServerState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// UDP 服务器错误。
///
/// # 契约说明（What）
/// - 配置类错误（`Resolve`/`Bind`/`Configure`）由 `serve` 直接返回，不做重试；
/// - `Receive` 表示接收循环因传输错误终止；
/// - `DrainTimeout` 仅由 [`crate::UdpServer::shutdown`] 返回，此时服务器已经停止。
#[derive(Debug, Error)]
pub enum ServerError {
    /// 当前状态不允许该操作。
    #[error("服务器处于 {state} 状态，无法执行 {operation}")]
    InvalidState {
        operation: &'static str,
        state: ServerState,
    },
    /// 地址解析失败。
    #[error("无法解析 UDP 地址 {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: io::Error,
    },
    /// 绑定失败。
    #[error("无法绑定 UDP 套接字到 {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// 套接字选项被拒绝。
    #[error("设置套接字选项 {option} 失败: {source}")]
    Configure {
        option: &'static str,
        #[source]
        source: io::Error,
    },
    /// 无法读取本地地址。
    #[error("无法获取 UDP 套接字本地地址: {0}")]
    LocalAddr(#[source] io::Error),
    /// 接收报文失败。
    #[error("接收 UDP 报文失败: {0}")]
    Receive(#[source] io::Error),
    /// 截止时间内仍有任务未完成。
    #[error("排空超时，仍有 {remaining} 个会话任务在途")]
    DrainTimeout { remaining: usize },
}

/// 配置加载错误。
#[derive(Debug, Error)]
pub enum SettingsError {
    /// 读取配置文件失败。
    #[error("无法读取配置文件 {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// TOML 内容不合法。
    #[error("配置解析失败: {0}")]
    Parse(#[from] toml::de::Error),
}
