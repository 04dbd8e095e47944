//! 消息体编解码契约。

use bytes::Bytes;
use thiserror::Error;

/// 编解码器处理的消息体。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 文本。
    Text(String),
    /// 不透明字节。
    Binary(Bytes),
}

impl Payload {
    /// 若为文本则返回其引用。
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }

    /// 以字节视图访问消息体。
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Binary(bytes) => bytes,
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_owned())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Binary(bytes)
    }
}

/// 消息体编解码器。
///
/// - `encode`：将 [`Payload`] 编码为消息条目中的原始字节；
/// - `decode`：从原始字节还原 [`Payload`]。
///
/// 路由层与会话层均以不透明方式持有 `Arc<dyn Codec>`，因此契约保持对象安全。
pub trait Codec: Send + Sync + 'static {
    /// 编码消息体。
    fn encode(&self, payload: &Payload) -> Result<Bytes, CodecError>;

    /// 解码消息体。
    fn decode(&self, data: &[u8]) -> Result<Payload, CodecError>;
}

/// 编解码错误。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// 消息体不是合法的 UTF-8。
    #[error("payload is not valid utf-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 {
        /// 合法 UTF-8 前缀的字节数。
        valid_up_to: usize,
    },
    /// 编解码器不支持该消息体形态。
    #[error("codec does not support {0} payloads")]
    Unsupported(&'static str),
}

/// 原样字符串编解码器，服务器未配置编解码器时的默认值。
///
/// - 编码：文本按 UTF-8 输出，二进制原样透传；
/// - 解码：总是得到 [`Payload::Text`]，非法 UTF-8 返回 [`CodecError::InvalidUtf8`]。
#[derive(Clone, Copy, Debug, Default)]
pub struct StringCodec;

impl Codec for StringCodec {
    fn encode(&self, payload: &Payload) -> Result<Bytes, CodecError> {
        Ok(match payload {
            Payload::Text(text) => Bytes::copy_from_slice(text.as_bytes()),
            Payload::Binary(bytes) => bytes.clone(),
        })
    }

    fn decode(&self, data: &[u8]) -> Result<Payload, CodecError> {
        std::str::from_utf8(data)
            .map(|text| Payload::Text(text.to_owned()))
            .map_err(|err| CodecError::InvalidUtf8 {
                valid_up_to: err.valid_up_to(),
            })
    }
}
