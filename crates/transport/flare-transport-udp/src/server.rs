use std::{fmt, io, net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
use flare_core::{Codec, Context, DefaultPacker, MessageEntry, Packer, Session, StringCodec};
use flare_router::Router;
use flare_session::SessionRegistry;
use parking_lot::Mutex;
use socket2::SockRef;
use tokio::{
    net::{UdpSocket, lookup_host},
    sync::{mpsc, watch},
};
use tracing::{debug, error, info, trace, warn};

use crate::{
    error::{ServerError, ServerState},
    inflight::{InFlight, InFlightGuard},
    options::UdpServerOptions,
    session::UdpSession,
    shutdown::ShutdownSignal,
};

/// 每报文一会话的 UDP 服务器。
///
/// # 教案式说明
/// - **意图 (Why)**：单一读者顺序收包，避免多个读者争抢同一套接字；每个报文的解帧、分发与
///   回写放到独立任务中，慢 Handler 不会阻塞接收。
/// - **契约 (What)**：
///   - `serve`：只允许在 `Constructed` 状态调用；解析、绑定、设置缓冲区任一失败都直接返回；
///     进入接收循环后，传输错误以 [`ServerError::Receive`] 返回，观察到停止信号则返回 `Ok(())`；
///     无论以何种方式返回，服务器都进入 `Stopped`；
///   - `stop`：幂等，只触发一次停止信号，不等待在途任务；接收循环随即退出，套接字在接收循环
///     与在途会话任务都释放句柄后关闭；
///   - `shutdown`：`stop` 之后在截止时间内等待在途任务排空；停止信号触发后才收到的报文直接
///     丢弃，不会再登记为在途任务。
/// - **How**：
///   1. 接收循环对每个报文复制出私有字节，派生会话任务后立即读取下一个报文；
///   2. 会话任务：创建 [`UdpSession`] 并登记 → 派生分发任务 → 解帧入队 → 写阶段 → 关闭并注销；
///   3. 分发任务运行在 `spawn_blocking` 线程上，逐条调用 [`Router::dispatch`]，把响应交给会话
///      发送，Handler 失败只记录日志；同步 Handler 即使长时间阻塞也不会占住运行时工作线程。
/// - **Trade-offs**：派生不设上限，突发流量下任务数量与报文数量同阶；需要背压的部署应在
///   前置网络层限速。
pub struct UdpServer {
    options: UdpServerOptions,
    max_buffer_size: usize,
    rw_buffer_size: usize,
    packer: Arc<dyn Packer>,
    codec: Arc<dyn Codec>,
    registry: Arc<SessionRegistry>,
    router: Arc<Router>,
    state: Mutex<ServerState>,
    local_addr: watch::Sender<Option<SocketAddr>>,
    shutdown: ShutdownSignal,
    in_flight: Arc<InFlight>,
}

impl UdpServer {
    /// 以归一化后的 `options` 构造服务器。
    pub fn new(options: UdpServerOptions, router: Arc<Router>) -> Self {
        let options = options.normalized();
        let packer = options
            .packer()
            .cloned()
            .unwrap_or_else(|| Arc::new(DefaultPacker::new()));
        let codec = options
            .codec()
            .cloned()
            .unwrap_or_else(|| Arc::new(StringCodec));
        let registry = options
            .registry()
            .cloned()
            .unwrap_or_else(|| Arc::new(SessionRegistry::new()));
        let (local_addr, _) = watch::channel(None);
        Self {
            max_buffer_size: options.max_buffer_size(),
            rw_buffer_size: options.rw_buffer_size(),
            options,
            packer,
            codec,
            registry,
            router,
            state: Mutex::new(ServerState::Constructed),
            local_addr,
            shutdown: ShutdownSignal::new(),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// 绑定 `addr` 并运行接收循环，直到停止或传输失败。
    pub async fn serve(&self, addr: &str) -> Result<(), ServerError> {
        {
            let mut state = self.state.lock();
            if *state != ServerState::Constructed {
                return Err(ServerError::InvalidState {
                    operation: "serve",
                    state: *state,
                });
            }
            *state = ServerState::Serving;
        }

        let outcome = self.run(addr).await;
        if let Err(err) = &outcome {
            error!(%addr, error = %err, "udp server terminated");
        }
        self.release();
        outcome
    }

    async fn run(&self, addr: &str) -> Result<(), ServerError> {
        let socket = Arc::new(self.bind(addr).await?);
        let local = socket.local_addr().map_err(ServerError::LocalAddr)?;
        self.local_addr.send_replace(Some(local));
        info!(
            local_addr = %local,
            max_buffer_size = self.max_buffer_size,
            "udp server accepting datagrams"
        );
        self.accept_loop(socket).await
    }

    async fn bind(&self, addr: &str) -> Result<UdpSocket, ServerError> {
        let resolve_error = |source: io::Error| ServerError::Resolve {
            addr: addr.to_owned(),
            source,
        };
        let target = lookup_host(addr)
            .await
            .map_err(resolve_error)?
            .next()
            .ok_or_else(|| {
                resolve_error(io::Error::new(
                    io::ErrorKind::NotFound,
                    "address resolved to nothing",
                ))
            })?;

        let socket = UdpSocket::bind(target)
            .await
            .map_err(|source| ServerError::Bind {
                addr: target,
                source,
            })?;

        apply_buffer_hints(&socket, self.rw_buffer_size)?;
        Ok(socket)
    }

    async fn accept_loop(&self, socket: Arc<UdpSocket>) -> Result<(), ServerError> {
        let mut buffer = vec![0u8; self.max_buffer_size];
        loop {
            let received = tokio::select! {
                biased;
                _ = self.shutdown.fired() => {
                    debug!("shutdown observed, leaving accept loop");
                    return Ok(());
                }
                received = socket.recv_from(&mut buffer) => received,
            };
            let (len, peer) = received.map_err(ServerError::Receive)?;
            trace!(%peer, len, "datagram received");

            // 先登记再检查信号：`shutdown` 要么看到这次登记，要么这里看到已触发的信号。
            let guard = self.in_flight.enter();
            if self.shutdown.is_fired() {
                debug!(%peer, len, "shutdown observed, dropping datagram");
                return Ok(());
            }
            let task = SessionTask {
                socket: Arc::clone(&socket),
                packer: Arc::clone(&self.packer),
                codec: Arc::clone(&self.codec),
                registry: Arc::clone(&self.registry),
                router: Arc::clone(&self.router),
                shutdown: self.shutdown.clone(),
                _guard: guard,
            };
            tokio::spawn(task.run(Bytes::copy_from_slice(&buffer[..len]), peer));
        }
    }

    /// 停止服务；重复调用无副作用。
    pub fn stop(&self) -> Result<(), ServerError> {
        {
            let mut state = self.state.lock();
            if *state == ServerState::Stopped {
                return Ok(());
            }
            *state = ServerState::Stopped;
        }
        info!(in_flight = self.in_flight.current(), "udp server stopping");
        self.release();
        Ok(())
    }

    /// 停止服务并在 `deadline` 内等待在途会话任务结束。
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ServerError> {
        self.stop()?;
        match tokio::time::timeout(deadline, self.in_flight.wait_idle()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                let remaining = self.in_flight.current();
                warn!(remaining, ?deadline, "drain deadline expired");
                Err(ServerError::DrainTimeout { remaining })
            }
        }
    }

    fn release(&self) {
        *self.state.lock() = ServerState::Stopped;
        self.shutdown.fire();
    }

    /// 等待服务器开始接收报文，返回实际监听地址。
    ///
    /// 服务器在开始接收之前就已停止（例如绑定失败）时返回 `None`。
    pub async fn accepting(&self) -> Option<SocketAddr> {
        let mut observer = self.local_addr.subscribe();
        tokio::select! {
            addr = observer.wait_for(Option::is_some) => addr.ok().and_then(|addr| *addr),
            _ = self.shutdown.fired() => *self.local_addr.borrow(),
        }
    }

    /// 实际监听地址；尚未开始服务时为 `None`。
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.borrow()
    }

    /// 当前生命周期状态。
    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    /// 在途会话任务数量。
    pub fn in_flight(&self) -> usize {
        self.in_flight.current()
    }

    /// 会话目录。
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// 路由器。
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// 归一化后的构造参数。
    pub fn options(&self) -> &UdpServerOptions {
        &self.options
    }
}

impl fmt::Debug for UdpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpServer")
            .field("state", &self.state())
            .field("local_addr", &self.local_addr())
            .field("in_flight", &self.in_flight())
            .field("options", &self.options)
            .finish()
    }
}

/// 单个报文的处理任务。
struct SessionTask {
    socket: Arc<UdpSocket>,
    packer: Arc<dyn Packer>,
    codec: Arc<dyn Codec>,
    registry: Arc<SessionRegistry>,
    router: Arc<Router>,
    shutdown: ShutdownSignal,
    _guard: InFlightGuard,
}

impl SessionTask {
    async fn run(self, datagram: Bytes, peer: SocketAddr) {
        let session = Arc::new(UdpSession::new(
            self.socket,
            peer,
            self.packer,
            Arc::clone(&self.codec),
        ));
        let id = session.id();
        self.registry.insert(Arc::clone(&session) as Arc<dyn Session>);
        debug!(session = %id, %peer, "session opened");

        let dispatcher = session.take_requests().map(|requests| {
            let router = self.router;
            let codec = self.codec;
            let session = Arc::clone(&session);
            tokio::task::spawn_blocking(move || dispatch_requests(router, session, codec, requests))
        });

        if let Err(err) = session.read_incoming(datagram) {
            warn!(session = %id, %peer, error = %err, "failed to decode datagram");
        }

        // 分发结束（包括 Handler panic）后关闭会话，写阶段才能观察到出站队列耗尽。
        let close_after_dispatch = async {
            if let Some(dispatcher) = dispatcher
                && let Err(err) = dispatcher.await
            {
                error!(session = %id, error = %err, "dispatch task aborted");
            }
            session.close();
        };
        let (_, written) = tokio::join!(close_after_dispatch, session.flush(&self.shutdown));
        match written {
            Ok(frames) => trace!(session = %id, frames, "write phase finished"),
            Err(err) => warn!(session = %id, %peer, error = %err, "failed to write response"),
        }

        session.close();
        self.registry.remove(&id);
        debug!(session = %id, "session released");
    }
}

/// 把 `size` 同时作用于收发缓冲区；`size == 0` 时保留系统默认值。
fn apply_buffer_hints(socket: &UdpSocket, size: usize) -> Result<(), ServerError> {
    if size == 0 {
        return Ok(());
    }
    let sock = SockRef::from(socket);
    sock.set_recv_buffer_size(size)
        .map_err(configure_error("SO_RCVBUF"))?;
    sock.set_send_buffer_size(size)
        .map_err(configure_error("SO_SNDBUF"))
}

fn configure_error(option: &'static str) -> impl FnOnce(io::Error) -> ServerError {
    move |source| ServerError::Configure { option, source }
}

/// 在阻塞线程上顺序分发一个会话的全部请求；入站队列关闭后返回。
fn dispatch_requests(
    router: Arc<Router>,
    session: Arc<UdpSession>,
    codec: Arc<dyn Codec>,
    mut requests: mpsc::UnboundedReceiver<MessageEntry>,
) {
    let id = session.id();
    while let Some(request) = requests.blocking_recv() {
        let message_id = request.id.clone();
        let mut ctx = Context::new(
            Arc::clone(&session) as Arc<dyn Session>,
            Arc::clone(&codec),
            Some(request),
        );
        if let Err(err) = router.dispatch(&mut ctx) {
            warn!(
                session = %id,
                %message_id,
                code = err.code(),
                error = %err,
                "handler failed"
            );
        }
        if let Some(response) = ctx.take_response()
            && let Err(err) = session.send(response)
        {
            warn!(session = %id, %message_id, error = %err, "failed to queue response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn server() -> UdpServer {
        UdpServer::new(UdpServerOptions::new(), Arc::new(Router::builder().build()))
    }

    #[test]
    fn construction_normalizes_options() {
        let server = server();
        assert_eq!(server.state(), ServerState::Constructed);
        assert_eq!(
            server.options().max_buffer_size(),
            crate::DEFAULT_MAX_BUFFER_SIZE
        );
        assert!(server.local_addr().is_none());
        assert_eq!(server.in_flight(), 0);
    }

    #[test]
    fn stop_is_idempotent_before_serve() {
        let server = server();
        server.stop().expect("first stop");
        server.stop().expect("second stop");
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn serve_after_stop_is_rejected() {
        let server = server();
        server.stop().expect("stop");
        let err = server.serve("127.0.0.1:0").await.expect_err("stopped");
        assert!(matches!(
            err,
            ServerError::InvalidState {
                operation: "serve",
                state: ServerState::Stopped
            }
        ));
        assert_eq!(server.accepting().await, None);
    }

    #[tokio::test]
    async fn unresolvable_address_fails_fast() {
        let server = server();
        let err = server.serve("not an address").await.expect_err("resolve");
        assert!(matches!(err, ServerError::Resolve { .. }));
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    #[traced_test]
    async fn lifecycle_is_logged() {
        let server = server();
        let control = async {
            server.accepting().await.expect("accepting");
            server.stop().expect("stop");
        };
        let (outcome, ()) = tokio::join!(server.serve("127.0.0.1:0"), control);
        outcome.expect("serve");
        assert_eq!(server.state(), ServerState::Stopped);

        assert!(logs_contain("udp server accepting datagrams"));
        assert!(logs_contain("udp server stopping"));
    }

    #[tokio::test]
    async fn zero_buffer_hint_keeps_system_defaults() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.expect("bind");
        let sock = SockRef::from(&socket);
        let before = sock.recv_buffer_size().expect("SO_RCVBUF");
        apply_buffer_hints(&socket, 0).expect("no-op");
        let after = sock.recv_buffer_size().expect("SO_RCVBUF");
        assert_eq!(before, after);

        apply_buffer_hints(&socket, 64 * 1024).expect("hints accepted");
    }

    #[test]
    fn rejected_socket_option_keeps_name_and_cause() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = configure_error("SO_SNDBUF")(denied);
        assert!(matches!(
            err,
            ServerError::Configure {
                option: "SO_SNDBUF",
                ..
            }
        ));
        assert!(err.to_string().contains("SO_SNDBUF"));
        let cause = std::error::Error::source(&err)
            .and_then(|cause| cause.downcast_ref::<io::Error>())
            .expect("io cause");
        assert_eq!(cause.kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn datagram_after_stop_is_not_tracked() {
        let server = Arc::new(server());
        let serving = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve("127.0.0.1:0").await })
        };
        let addr = server.accepting().await.expect("accepting");

        server.shutdown(Duration::from_secs(1)).await.expect("idle");
        let client = UdpSocket::bind("127.0.0.1:0").await.expect("bind client");
        client.send_to(b"late", addr).await.expect("send");

        serving.await.expect("serve task").expect("serve");
        assert_eq!(server.in_flight(), 0);
        assert!(server.registry().is_empty());
    }
}
