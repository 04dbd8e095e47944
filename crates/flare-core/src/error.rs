//! Handler 与中间件共享的错误类型。

use std::{borrow::Cow, error::Error as StdError, fmt};

use crate::{codec::CodecError, session::SessionError};

/// 稳定错误码。
pub mod codes {
    /// 请求消息体解码失败。
    pub const DECODE_FAILED: &str = "flare.handler.decode_failed";
    /// 响应编码或投递失败。
    pub const RESPOND_FAILED: &str = "flare.handler.respond_failed";
    /// 业务 Handler 拒绝请求。
    pub const REJECTED: &str = "flare.handler.rejected";
    /// 上下文中缺少请求条目。
    pub const MISSING_REQUEST: &str = "flare.handler.missing_request";
}

/// Handler 或中间件返回的失败。
///
/// # 设计背景（Why）
/// - 一次分发的失败只沿组合链向上冒泡，到服务器任务处被记录；错误码用于日志聚合，
///   消息面向排障人员。
///
/// # 契约说明（What）
/// - `code`：`<域>.<语义>` 形式的稳定字符串，内置值见 [`codes`]；
/// - `message`：人类可读描述；
/// - `source`：可选底层原因，通过 [`std::error::Error::source`] 暴露。
#[derive(Debug)]
pub struct HandlerError {
    code: &'static str,
    message: Cow<'static, str>,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl HandlerError {
    /// 构造错误。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// 附带底层原因。
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// 以 [`codes::REJECTED`] 构造业务拒绝。
    pub fn rejected(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(codes::REJECTED, message)
    }

    /// 错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 错误描述。
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl StdError for HandlerError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

impl From<CodecError> for HandlerError {
    fn from(err: CodecError) -> Self {
        HandlerError::new(codes::DECODE_FAILED, err.to_string()).with_source(err)
    }
}

impl From<SessionError> for HandlerError {
    fn from(err: SessionError) -> Self {
        HandlerError::new(codes::RESPOND_FAILED, err.to_string()).with_source(err)
    }
}
