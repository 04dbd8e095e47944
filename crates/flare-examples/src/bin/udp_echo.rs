//! UDP 回显服务。
//!
//! # 使用方法
//! ```bash
//! RUST_LOG=debug cargo run --bin udp_echo -- 127.0.0.1:5896 --config flare.toml
//! ```
//! - `ADDR`：可选，缺省为 `127.0.0.1:5896`；
//! - `--config`：可选，TOML 文件，键为 `max_buffer_size` 与 `rw_buffer_size`。
//!
//! 收到 Ctrl-C 后停止接收，并在 5 秒内等待在途会话任务结束；
//! 停止信号触发时尚未写出的响应会被丢弃。

use std::{env, sync::Arc, time::Duration};

use flare_examples::{ExampleError, LaunchArgs, echo_router, install_tracing};
use flare_transport_udp::{ServerError, UdpServer, UdpServerOptions, UdpServerSettings};
use tokio::task::JoinError;
use tracing::{info, warn};

const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("udp_echo 运行失败: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ExampleError> {
    install_tracing()?;
    let args = LaunchArgs::parse(env::args().skip(1))?;

    let options = match &args.settings {
        Some(path) => UdpServerSettings::from_path(path)?.into_options(),
        None => UdpServerOptions::new(),
    };
    let router = Arc::new(echo_router());
    router.print_route_table(&args.addr)?;

    let server = Arc::new(UdpServer::new(options, router));
    let mut serving = {
        let server = Arc::clone(&server);
        let addr = args.addr.clone();
        tokio::spawn(async move { server.serve(&addr).await })
    };

    tokio::select! {
        outcome = &mut serving => {
            return flatten(outcome);
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(error) = signal {
                warn!(%error, "failed to listen for ctrl-c, stopping");
            }
        }
    }

    info!("stopping udp_echo");
    let drained = server.shutdown(DRAIN_DEADLINE).await;
    flatten(serving.await)?;
    drained.map_err(ExampleError::from)
}

fn flatten(outcome: Result<Result<(), ServerError>, JoinError>) -> Result<(), ExampleError> {
    Ok(outcome??)
}
