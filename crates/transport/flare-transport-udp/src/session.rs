use std::{
    fmt, io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use flare_core::{Codec, MessageEntry, Packer, Session, SessionError, SessionId};
use parking_lot::Mutex;
use tokio::{net::UdpSocket, sync::mpsc};
use tracing::{debug, trace};

use crate::shutdown::ShutdownSignal;

/// 单个报文对应的会话。
///
/// # 教案式说明
/// - **意图 (Why)**：UDP 无连接，服务器为每个入站报文创建一个短生命周期会话，
///   使分发逻辑与面向连接的传输共享同一套 [`Session`] 契约。
/// - **契约 (What)**：
///   - [`UdpSession::read_incoming`] 只能成功调用一次：解出报文中的全部帧后关闭入站队列；
///   - [`Session::send`] 将响应分帧后压入出站队列，关闭后返回 [`SessionError::Closed`]；
///   - [`UdpSession::flush`] 将出站队列写回对端，直到队列耗尽或停止信号触发；
///   - 两个队列的消费端各自只能被取走一次。
/// - **How**：队列使用无界 `mpsc`，生产端放在 `Mutex<Option<_>>` 中，`close` 通过取走
///   生产端让消费端在排空存量后观察到结束。
pub struct UdpSession {
    id: SessionId,
    peer: SocketAddr,
    socket: Arc<UdpSocket>,
    packer: Arc<dyn Packer>,
    codec: Arc<dyn Codec>,
    closed: AtomicBool,
    inbound: Mutex<Option<mpsc::UnboundedSender<MessageEntry>>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    requests: Mutex<Option<mpsc::UnboundedReceiver<MessageEntry>>>,
    responses: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
}

impl UdpSession {
    /// 为来自 `peer` 的报文创建会话，分配新的 [`SessionId`]。
    pub fn new(
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        packer: Arc<dyn Packer>,
        codec: Arc<dyn Codec>,
    ) -> Self {
        let (inbound, requests) = mpsc::unbounded_channel();
        let (outbound, responses) = mpsc::unbounded_channel();
        Self {
            id: SessionId::next(),
            peer,
            socket,
            packer,
            codec,
            closed: AtomicBool::new(false),
            inbound: Mutex::new(Some(inbound)),
            outbound: Mutex::new(Some(outbound)),
            requests: Mutex::new(Some(requests)),
            responses: Mutex::new(Some(responses)),
        }
    }

    /// 对端地址。
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// 会话使用的编解码器，分发时交给 [`flare_core::Context`]。
    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    /// 解出 `datagram` 中的全部帧并送入入站队列，返回入队的帧数。
    ///
    /// # 契约说明（What）
    /// - 无论成功与否，返回后入站队列都已关闭，请求消费者在取完存量后结束；
    /// - 解帧失败时，失败点之前的帧已经入队，失败本身以 [`SessionError::Pack`] 返回；
    /// - 入站侧已关闭（重复调用或会话已关闭）时返回 [`SessionError::Closed`]。
    pub fn read_incoming(&self, datagram: Bytes) -> Result<usize, SessionError> {
        let inbound = self
            .inbound
            .lock()
            .take()
            .ok_or(SessionError::Closed(self.id))?;

        let mut remaining = datagram;
        let mut enqueued = 0;
        while let Some(entry) = self.packer.unpack(&mut remaining)? {
            trace!(session = %self.id, message_id = %entry.id, "request frame decoded");
            if inbound.send(entry).is_err() {
                // 请求消费者已退出，剩余帧无人处理。
                break;
            }
            enqueued += 1;
        }
        Ok(enqueued)
    }

    /// 取走请求队列的消费端；只有首次调用返回 `Some`。
    pub fn take_requests(&self) -> Option<mpsc::UnboundedReceiver<MessageEntry>> {
        self.requests.lock().take()
    }

    /// 取走响应队列的消费端；只有首次调用返回 `Some`。
    pub fn take_responses(&self) -> Option<mpsc::UnboundedReceiver<Bytes>> {
        self.responses.lock().take()
    }

    /// 写阶段：把出站队列中的帧逐个发往对端，返回写出的帧数。
    ///
    /// 队列耗尽（会话关闭且存量写完）或 `shutdown` 触发时结束；消费端已被取走时立即返回 `0`。
    pub async fn flush(&self, shutdown: &ShutdownSignal) -> io::Result<usize> {
        let Some(mut responses) = self.take_responses() else {
            return Ok(0);
        };

        let mut written = 0;
        loop {
            let frame = tokio::select! {
                biased;
                _ = shutdown.fired() => {
                    debug!(session = %self.id, "shutdown observed during write phase");
                    break;
                }
                frame = responses.recv() => frame,
            };
            let Some(frame) = frame else {
                break;
            };
            self.socket.send_to(&frame, self.peer).await?;
            written += 1;
        }
        Ok(written)
    }
}

impl Session for UdpSession {
    fn id(&self) -> SessionId {
        self.id
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }

    fn send(&self, entry: MessageEntry) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed(self.id));
        }
        let frame = self.packer.pack(&entry)?;
        let outbound = self.outbound.lock();
        match outbound.as_ref() {
            Some(sender) if sender.send(frame).is_ok() => Ok(()),
            _ => Err(SessionError::Closed(self.id)),
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inbound.lock().take();
        self.outbound.lock().take();
        trace!(session = %self.id, peer = %self.peer, "session closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for UdpSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpSession")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}
