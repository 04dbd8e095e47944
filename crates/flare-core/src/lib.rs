#![warn(missing_docs)]

//! # flare-core
//!
//! ## 定位与职责（Why）
//! - 为 `flare-router`、`flare-session` 与各传输实现提供共享的最小契约：消息标识、消息条目、
//!   分帧器（[`Packer`]）、消息体编解码器（[`Codec`]）、会话（[`Session`]）以及请求上下文（[`Context`]）。
//! - 核心 crate 不依赖任何异步运行时，传输层可自由选择 Tokio 或其他实现。
//!
//! ## 模块划分（What）
//! - `message`：`MessageId` 与 `MessageEntry`；
//! - `packer`：长度/标识分帧契约及默认实现 [`DefaultPacker`]；
//! - `codec`：消息体契约及默认实现 [`StringCodec`]；
//! - `session`：会话标识与会话能力；
//! - `context`：单次分发的请求上下文；
//! - `error`：Handler 与中间件共享的 [`HandlerError`]。

pub mod codec;
pub mod context;
pub mod error;
pub mod message;
pub mod packer;
pub mod session;

pub use codec::{Codec, CodecError, Payload, StringCodec};
pub use context::Context;
pub use error::HandlerError;
pub use message::{MessageEntry, MessageId};
pub use packer::{DefaultPacker, PackError, Packer};
pub use session::{Session, SessionError, SessionId};
