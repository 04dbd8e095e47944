//! 消息标识与消息条目。

use std::{borrow::Cow, fmt};

use bytes::Bytes;

/// 路由查找使用的消息标识。
///
/// # 契约说明（What）
/// - 可哈希、可比较，作为 Handler 与中间件映射的键；重复注册同一标识会覆盖旧值；
/// - `Num` 对应二进制协议中的整型标识，默认分帧器 [`DefaultPacker`](crate::DefaultPacker)
///   只接受该变体；`Text` 供文本协议或自定义分帧器使用。
///
/// # 排序
/// - 派生的 `Ord` 令所有 `Num` 排在 `Text` 之前，路由表输出据此保持稳定顺序。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageId {
    /// 整型标识。
    Num(u32),
    /// 字符串标识。
    Text(Cow<'static, str>),
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Num(id) => write!(f, "{id}"),
            MessageId::Text(id) => f.write_str(id),
        }
    }
}

impl From<u32> for MessageId {
    fn from(id: u32) -> Self {
        MessageId::Num(id)
    }
}

impl From<&'static str> for MessageId {
    fn from(id: &'static str) -> Self {
        MessageId::Text(Cow::Borrowed(id))
    }
}

impl From<String> for MessageId {
    fn from(id: String) -> Self {
        MessageId::Text(Cow::Owned(id))
    }
}

/// 分帧后的一条消息：标识 + 未解码的消息体。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEntry {
    /// 消息标识。
    pub id: MessageId,
    /// 原始消息体，由 [`Codec`](crate::Codec) 负责解释。
    pub data: Bytes,
}

impl MessageEntry {
    /// 构造消息条目。
    pub fn new(id: impl Into<MessageId>, data: impl Into<Bytes>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
        }
    }
}
