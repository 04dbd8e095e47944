//! 单次分发的请求上下文。

use std::{borrow::Cow, collections::HashMap, fmt, sync::Arc};

use crate::{
    codec::{Codec, Payload},
    error::{HandlerError, codes},
    message::{MessageEntry, MessageId},
    session::Session,
};

/// `Context` 贯穿一次分发的整条中间件链。
///
/// # 契约说明（What）
/// - `request`：待处理的请求条目；为空时路由器直接返回，不调用任何 Handler；
/// - `response`：Handler 通过 [`Context::respond`] 或 [`Context::set_response`] 写入，
///   分发结束后由服务器交给会话发送；
/// - `values`：中间件之间传递的字符串键值，仅在本次分发内有效。
pub struct Context {
    session: Arc<dyn Session>,
    codec: Arc<dyn Codec>,
    request: Option<MessageEntry>,
    response: Option<MessageEntry>,
    values: HashMap<Cow<'static, str>, String>,
}

impl Context {
    /// 构造上下文。
    pub fn new(
        session: Arc<dyn Session>,
        codec: Arc<dyn Codec>,
        request: Option<MessageEntry>,
    ) -> Self {
        Self {
            session,
            codec,
            request,
            response: None,
            values: HashMap::new(),
        }
    }

    /// 发起请求的会话。
    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    /// 本次请求。
    pub fn request(&self) -> Option<&MessageEntry> {
        self.request.as_ref()
    }

    /// 请求标识。
    pub fn request_id(&self) -> Option<&MessageId> {
        self.request.as_ref().map(|entry| &entry.id)
    }

    /// 用会话编解码器解码请求消息体。
    pub fn decode_request(&self) -> Result<Payload, HandlerError> {
        let request = self
            .request
            .as_ref()
            .ok_or_else(|| HandlerError::new(codes::MISSING_REQUEST, "context has no request"))?;
        Ok(self.codec.decode(&request.data)?)
    }

    /// 编码消息体并设置为本次响应，覆盖已有响应。
    pub fn respond(
        &mut self,
        id: impl Into<MessageId>,
        payload: impl Into<Payload>,
    ) -> Result<(), HandlerError> {
        let data = self
            .codec
            .encode(&payload.into())
            .map_err(|err| {
                HandlerError::new(codes::RESPOND_FAILED, err.to_string()).with_source(err)
            })?;
        self.response = Some(MessageEntry {
            id: id.into(),
            data,
        });
        Ok(())
    }

    /// 直接设置已编码的响应条目。
    pub fn set_response(&mut self, entry: MessageEntry) {
        self.response = Some(entry);
    }

    /// 当前响应。
    pub fn response(&self) -> Option<&MessageEntry> {
        self.response.as_ref()
    }

    /// 取出响应，上下文中不再保留。
    pub fn take_response(&mut self) -> Option<MessageEntry> {
        self.response.take()
    }

    /// 写入键值。
    pub fn set(&mut self, key: impl Into<Cow<'static, str>>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// 读取键值。
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("session", &self.session.id())
            .field("request", &self.request)
            .field("response", &self.response)
            .field("values", &self.values)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SessionError, SessionId, StringCodec};

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

    fn context(request: Option<MessageEntry>) -> Context {
        Context::new(Arc::new(NullSession), Arc::new(StringCodec), request)
    }

    #[test]
    fn respond_encodes_with_codec() {
        let mut ctx = context(Some(MessageEntry::new(42u32, "ping")));
        assert_eq!(
            ctx.decode_request().unwrap(),
            Payload::Text("ping".to_owned())
        );
        ctx.respond(43u32, "pong").unwrap();
        assert_eq!(ctx.take_response(), Some(MessageEntry::new(43u32, "pong")));
        assert!(ctx.response().is_none());
    }

    #[test]
    fn decode_without_request_fails() {
        let err = context(None).decode_request().expect_err("no request");
        assert_eq!(err.code(), codes::MISSING_REQUEST);
    }

    #[test]
    fn values_are_scoped_to_context() {
        let mut ctx = context(None);
        ctx.set("user", "alice");
        assert_eq!(ctx.get("user"), Some("alice"));
        assert_eq!(ctx.get("missing"), None);
    }
}
