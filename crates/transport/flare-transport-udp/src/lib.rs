#![doc = r#"
# flare-transport-udp

## 模块使命（Why）
- 在 Tokio `UdpSocket` 之上运行“每个报文一个会话”的服务循环：单一读者顺序收包，每个报文交给
  独立任务完成解帧、路由分发与响应回写；
- 会话在生命周期内登记到 [`flare_session::SessionRegistry`]，关闭后自动注销。

## 核心契约（What）
- [`UdpServer`]：状态机 `Constructed → Serving → Stopped`，`Stopped` 为终态；
  `serve` 只能调用一次，`stop` 幂等且不等待在途任务，`shutdown` 额外提供有界的排空等待；
- [`UdpSession`]：实现 [`flare_core::Session`]，内部持有入站请求队列与出站响应队列；
- [`UdpServerOptions`]/[`UdpServerSettings`]：代码构建与 TOML 加载两条配置路径。

## 实现策略（How）
- 停止信号基于 `tokio::sync::watch`，接收循环与写阶段通过 `select!` 协作式观察；
- 同步 Handler 在 `spawn_blocking` 线程上逐条执行，阻塞不会占用运行时工作线程；
- 读写缓冲区提示通过 `socket2::SockRef` 作用于已绑定的 Tokio 套接字；
- 日志统一走 `tracing`，本库从不安装订阅者。
"#]

mod error;
mod inflight;
mod options;
mod server;
mod session;
mod shutdown;

pub use error::{ServerError, ServerState, SettingsError};
pub use options::{DEFAULT_MAX_BUFFER_SIZE, UdpServerOptions, UdpServerSettings};
pub use server::UdpServer;
pub use session::UdpSession;
pub use shutdown::ShutdownSignal;
