//! 分帧契约：在原始字节与 [`MessageEntry`] 之间转换长度与标识头部。

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::message::{MessageEntry, MessageId};

/// 分帧器契约。
///
/// # 契约说明（What）
/// - `pack`：将消息条目编码为可直接写出的字节；
/// - `unpack`：从 `input` 头部消费一帧；输入为空时返回 `Ok(None)`，表示已经耗尽；
/// - 实现必须 `Send + Sync`，服务器会在多个会话任务间共享同一个实例。
///
/// # 风险提示（Trade-offs）
/// - 一个数据报可能携带多帧，调用方需循环调用 `unpack` 直至返回 `None`；
/// - `unpack` 失败后 `input` 的剩余内容处于未定义位置，调用方应放弃该输入。
pub trait Packer: Send + Sync + 'static {
    /// 编码一帧。
    fn pack(&self, entry: &MessageEntry) -> Result<Bytes, PackError>;

    /// 从输入头部解出一帧。
    fn unpack(&self, input: &mut Bytes) -> Result<Option<MessageEntry>, PackError>;
}

/// 分帧错误。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PackError {
    /// 头部或消息体长度不足。
    #[error("frame truncated: need {needed} bytes, {available} available")]
    Truncated {
        /// 解出当前部分所需的字节数。
        needed: usize,
        /// 实际可用的字节数。
        available: usize,
    },
    /// 分帧器无法编码该类型的标识。
    #[error("message id `{0}` is not supported by this packer")]
    UnsupportedId(MessageId),
    /// 消息体超出头部可表达的长度。
    #[error("message body of {0} bytes exceeds frame limit")]
    Oversized(usize),
}

/// 默认的字节分帧器。
///
/// 帧格式（小端）：
///
/// ```text
/// +-------------+-----------+-----------------+
/// | data_len u32 | id u32   | data (data_len) |
/// +-------------+-----------+-----------------+
/// ```
///
/// 仅支持 [`MessageId::Num`]。
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultPacker;

impl DefaultPacker {
    /// 帧头长度。
    pub const HEADER_LEN: usize = 8;

    /// 构造默认分帧器。
    pub const fn new() -> Self {
        Self
    }
}

impl Packer for DefaultPacker {
    fn pack(&self, entry: &MessageEntry) -> Result<Bytes, PackError> {
        let id = match &entry.id {
            MessageId::Num(id) => *id,
            other => return Err(PackError::UnsupportedId(other.clone())),
        };
        let len =
            u32::try_from(entry.data.len()).map_err(|_| PackError::Oversized(entry.data.len()))?;

        let mut buf = BytesMut::with_capacity(Self::HEADER_LEN + entry.data.len());
        buf.put_u32_le(len);
        buf.put_u32_le(id);
        buf.put_slice(&entry.data);
        Ok(buf.freeze())
    }

    fn unpack(&self, input: &mut Bytes) -> Result<Option<MessageEntry>, PackError> {
        if input.is_empty() {
            return Ok(None);
        }
        if input.len() < Self::HEADER_LEN {
            return Err(PackError::Truncated {
                needed: Self::HEADER_LEN,
                available: input.len(),
            });
        }

        let len = u32::from_le_bytes([input[0], input[1], input[2], input[3]]) as usize;
        let available = input.len() - Self::HEADER_LEN;
        if available < len {
            return Err(PackError::Truncated {
                needed: len,
                available,
            });
        }

        input.advance(4);
        let id = input.get_u32_le();
        let data = input.split_to(len);
        Ok(Some(MessageEntry {
            id: MessageId::Num(id),
            data,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_writes_little_endian_header() {
        let packed = DefaultPacker
            .pack(&MessageEntry::new(42u32, Bytes::from_static(b"ping")))
            .expect("pack");
        assert_eq!(&packed[..4], &4u32.to_le_bytes());
        assert_eq!(&packed[4..8], &42u32.to_le_bytes());
        assert_eq!(&packed[8..], b"ping");
    }

    #[test]
    fn unpack_consumes_every_frame_in_a_datagram() {
        let mut datagram = BytesMut::new();
        datagram.extend_from_slice(&DefaultPacker.pack(&MessageEntry::new(1u32, "a")).unwrap());
        datagram.extend_from_slice(&DefaultPacker.pack(&MessageEntry::new(2u32, "")).unwrap());
        let mut input = datagram.freeze();

        let first = DefaultPacker.unpack(&mut input).unwrap().expect("first");
        let second = DefaultPacker.unpack(&mut input).unwrap().expect("second");
        assert_eq!(first, MessageEntry::new(1u32, "a"));
        assert_eq!(second, MessageEntry::new(2u32, ""));
        assert_eq!(DefaultPacker.unpack(&mut input).unwrap(), None);
    }

    #[test]
    fn unpack_reports_truncated_body() {
        let packed = DefaultPacker
            .pack(&MessageEntry::new(9u32, "hello"))
            .unwrap();
        let mut input = packed.slice(..packed.len() - 2);
        assert_eq!(
            DefaultPacker.unpack(&mut input),
            Err(PackError::Truncated {
                needed: 5,
                available: 3
            })
        );
    }

    #[test]
    fn unpack_reports_short_header() {
        let mut input = Bytes::from_static(&[1, 0, 0]);
        assert!(matches!(
            DefaultPacker.unpack(&mut input),
            Err(PackError::Truncated { needed: 8, .. })
        ));
    }

    #[test]
    fn text_ids_are_rejected() {
        let err = DefaultPacker
            .pack(&MessageEntry::new("chat", "x"))
            .expect_err("text ids cannot be framed");
        assert_eq!(err, PackError::UnsupportedId(MessageId::from("chat")));
    }
}
