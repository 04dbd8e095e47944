//! UDP 回显示例的装配逻辑：日志安装、启动参数解析与示例路由。
//!
//! # 设计要点（Why）
//! - 库本身从不安装 `tracing` 订阅者，示例进程在入口处一次性安装；
//! - 参数解析保持手写，仅支持 `[ADDR] [--config PATH]` 两项，便于脚本化调用。

use std::{path::PathBuf, sync::OnceLock, time::Instant};

use flare_core::{Context, HandlerError, Payload};
use flare_router::{BoxHandler, BoxMiddleware, Router, middleware_fn};
use flare_transport_udp::{ServerError, SettingsError};
use thiserror::Error;
use tracing::{debug, subscriber::SetGlobalDefaultError};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

/// 未指定地址时的监听地址。
pub const DEFAULT_ADDR: &str = "127.0.0.1:5896";

/// 回显请求的消息标识。
pub const ECHO_ID: u32 = 1;
/// `ping` 请求的消息标识。
pub const PING_ID: u32 = 42;
/// 未知请求统一使用的响应标识。
pub const UNKNOWN_ID: u32 = 99;

static TRACING_INSTALLED: OnceLock<()> = OnceLock::new();

/// 示例进程错误。
#[derive(Debug, Error)]
pub enum ExampleError {
    /// 命令行参数不合法。
    #[error("{0}\n用法: udp_echo [ADDR] [--config PATH]")]
    Usage(String),
    /// 全局订阅者已被其他组件安装。
    #[error("无法安装 tracing 订阅者: {0}")]
    SetGlobalSubscriber(#[from] SetGlobalDefaultError),
    /// 配置加载失败。
    #[error(transparent)]
    Settings(#[from] SettingsError),
    /// 服务器失败。
    #[error(transparent)]
    Server(#[from] ServerError),
    /// 服务任务异常终止。
    #[error("服务任务异常终止: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// 标准输出写入失败。
    #[error("无法输出路由表: {0}")]
    Io(#[from] std::io::Error),
}

/// 安装 `fmt + EnvFilter` 订阅者；过滤规则取自 `RUST_LOG`，缺省为 `info`。重复调用直接返回。
pub fn install_tracing() -> Result<(), ExampleError> {
    if TRACING_INSTALLED.get().is_some() {
        return Ok(());
    }
    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;
    let _ = TRACING_INSTALLED.set(());
    Ok(())
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 启动参数。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchArgs {
    /// 监听地址。
    pub addr: String,
    /// 可选的 TOML 配置文件。
    pub settings: Option<PathBuf>,
}

impl LaunchArgs {
    /// 解析不含程序名的参数序列。
    pub fn parse<I>(args: I) -> Result<Self, ExampleError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut addr = None;
        let mut settings = None;
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            if arg == "--config" {
                let path = args
                    .next()
                    .ok_or_else(|| ExampleError::Usage("--config 之后必须提供文件路径".into()))?;
                settings = Some(PathBuf::from(path));
            } else if arg.starts_with("--") {
                return Err(ExampleError::Usage(format!("未知参数: {arg}")));
            } else if addr.is_none() {
                addr = Some(arg);
            } else {
                return Err(ExampleError::Usage(format!("多余的地址参数: {arg}")));
            }
        }
        Ok(Self {
            addr: addr.unwrap_or_else(|| DEFAULT_ADDR.to_owned()),
            settings,
        })
    }
}

/// 记录每次分发耗时的全局中间件。
pub fn timing_middleware() -> BoxMiddleware {
    middleware_fn(|next: BoxHandler| -> BoxHandler {
        std::sync::Arc::new(move |ctx: &mut Context| -> Result<(), HandlerError> {
            let started = Instant::now();
            let outcome = next.call(ctx);
            debug!(
                session = %ctx.session().id(),
                message_id = ?ctx.request_id().map(ToString::to_string),
                elapsed_us = started.elapsed().as_micros() as u64,
                ok = outcome.is_ok(),
                "request dispatched"
            );
            outcome
        })
    })
}

/// 示例路由：`1` 原样回显，`42` 以 `pong` 应答 `ping`，其余标识返回 `unknown`。
pub fn echo_router() -> Router {
    Router::builder()
        .middleware(timing_middleware())
        .route(ECHO_ID, "echo", |ctx: &mut Context| {
            let body = ctx.decode_request()?;
            ctx.respond(ECHO_ID, body)
        })
        .route(PING_ID, "ping", |ctx: &mut Context| {
            match ctx.decode_request()? {
                Payload::Text(text) if text == "ping" => ctx.respond(PING_ID, "pong"),
                other => Err(HandlerError::rejected(format!(
                    "expected ping, got {} bytes",
                    other.as_bytes().len()
                ))),
            }
        })
        .not_found("unknown", |ctx: &mut Context| {
            ctx.respond(UNKNOWN_ID, "unknown")
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flare_core::{MessageEntry, Session, SessionError, SessionId, StringCodec};
    use std::sync::Arc;

    struct NullSession;

    impl Session for NullSession {
        fn id(&self) -> SessionId {
            SessionId::from_raw(0)
        }

        fn send(&self, _entry: MessageEntry) -> Result<(), SessionError> {
            Ok(())
        }

        fn close(&self) {}

        fn is_closed(&self) -> bool {
            false
        }
    }

    fn dispatch(
        router: &Router,
        request: MessageEntry,
    ) -> Result<Option<MessageEntry>, HandlerError> {
        let mut ctx = Context::new(Arc::new(NullSession), Arc::new(StringCodec), Some(request));
        router.dispatch(&mut ctx)?;
        Ok(ctx.take_response())
    }

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|arg| (*arg).to_owned()).collect()
    }

    #[test]
    fn defaults_to_local_address() {
        let parsed = LaunchArgs::parse(Vec::new()).expect("no args");
        assert_eq!(parsed.addr, DEFAULT_ADDR);
        assert!(parsed.settings.is_none());
    }

    #[test]
    fn parses_address_and_config() {
        let parsed = LaunchArgs::parse(args(&["0.0.0.0:9000", "--config", "flare.toml"]))
            .expect("valid args");
        assert_eq!(parsed.addr, "0.0.0.0:9000");
        assert_eq!(parsed.settings, Some(PathBuf::from("flare.toml")));
    }

    #[test]
    fn rejects_unknown_flags_and_missing_values() {
        assert!(matches!(
            LaunchArgs::parse(args(&["--verbose"])),
            Err(ExampleError::Usage(_))
        ));
        assert!(matches!(
            LaunchArgs::parse(args(&["--config"])),
            Err(ExampleError::Usage(_))
        ));
        assert!(matches!(
            LaunchArgs::parse(args(&["a:1", "b:2"])),
            Err(ExampleError::Usage(_))
        ));
    }

    #[test]
    fn echo_router_answers_known_and_unknown_ids() {
        let router = echo_router();
        assert_eq!(
            dispatch(&router, MessageEntry::new(PING_ID, "ping")).unwrap(),
            Some(MessageEntry::new(PING_ID, "pong"))
        );
        assert_eq!(
            dispatch(&router, MessageEntry::new(ECHO_ID, "hello")).unwrap(),
            Some(MessageEntry::new(ECHO_ID, "hello"))
        );
        assert_eq!(
            dispatch(&router, MessageEntry::new(7u32, "?")).unwrap(),
            Some(MessageEntry::new(UNKNOWN_ID, "unknown"))
        );
        assert!(dispatch(&router, MessageEntry::new(PING_ID, "pang")).is_err());
    }

    #[test]
    fn route_table_lists_registered_handlers() {
        let mut out = Vec::new();
        echo_router()
            .write_route_table(&mut out, DEFAULT_ADDR)
            .expect("write");
        let table = String::from_utf8(out).expect("utf8");
        assert!(table.contains("| 1 "));
        assert!(table.contains("echo"));
        assert!(table.contains("ping"));
        assert!(table.contains(DEFAULT_ADDR));
    }

    #[test]
    fn tracing_install_is_idempotent() {
        install_tracing().expect("first install");
        install_tracing().expect("second install");
    }
}
