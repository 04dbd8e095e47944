use std::{fmt, fs, path::Path, sync::Arc};

use flare_core::{Codec, DefaultPacker, Packer, StringCodec};
use flare_session::SessionRegistry;
use serde::Deserialize;

use crate::error::SettingsError;

/// 未指定或指定为 0 时使用的单报文缓冲上限（字节）。
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024;

/// 服务器构造参数。
///
/// # 教案式说明
/// - **意图 (Why)**：所有可选项在构造时一次性确定，服务期间不可变。
/// - **契约 (What)**：
///   - `max_buffer_size`：单个报文的读缓冲大小，超出部分由操作系统截断；`0` 归一为
///     [`DEFAULT_MAX_BUFFER_SIZE`]；
///   - `rw_buffer_size`：套接字收发缓冲区提示，`0` 表示保持系统默认；
///   - `packer`/`codec`/`registry`：缺省时分别使用 [`DefaultPacker`]、[`StringCodec`]
///     与一个新建的 [`SessionRegistry`]。
/// - **How**：[`UdpServerOptions::normalized`] 填补缺省值，服务器只保存归一化后的副本。
#[derive(Clone, Default)]
pub struct UdpServerOptions {
    max_buffer_size: usize,
    rw_buffer_size: usize,
    packer: Option<Arc<dyn Packer>>,
    codec: Option<Arc<dyn Codec>>,
    registry: Option<Arc<SessionRegistry>>,
}

impl UdpServerOptions {
    /// 全部取缺省值。
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置单报文读缓冲大小。
    pub fn with_max_buffer_size(mut self, bytes: usize) -> Self {
        self.max_buffer_size = bytes;
        self
    }

    /// 设置套接字收发缓冲区提示。
    pub fn with_rw_buffer_size(mut self, bytes: usize) -> Self {
        self.rw_buffer_size = bytes;
        self
    }

    /// 指定分帧器。
    pub fn with_packer(mut self, packer: Arc<dyn Packer>) -> Self {
        self.packer = Some(packer);
        self
    }

    /// 指定消息体编解码器。
    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// 指定会话目录，例如 [`SessionRegistry::instance`]。
    pub fn with_registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 单报文读缓冲大小。
    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }

    /// 收发缓冲区提示。
    pub fn rw_buffer_size(&self) -> usize {
        self.rw_buffer_size
    }

    /// 分帧器。
    pub fn packer(&self) -> Option<&Arc<dyn Packer>> {
        self.packer.as_ref()
    }

    /// 编解码器。
    pub fn codec(&self) -> Option<&Arc<dyn Codec>> {
        self.codec.as_ref()
    }

    /// 会话目录。
    pub fn registry(&self) -> Option<&Arc<SessionRegistry>> {
        self.registry.as_ref()
    }

    /// 填补所有缺省值；结果中的可选项全部为 `Some`。
    pub fn normalized(mut self) -> Self {
        if self.max_buffer_size == 0 {
            self.max_buffer_size = DEFAULT_MAX_BUFFER_SIZE;
        }
        self.packer
            .get_or_insert_with(|| Arc::new(DefaultPacker::new()));
        self.codec.get_or_insert_with(|| Arc::new(StringCodec));
        self.registry
            .get_or_insert_with(|| Arc::new(SessionRegistry::new()));
        self
    }
}

impl fmt::Debug for UdpServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UdpServerOptions")
            .field("max_buffer_size", &self.max_buffer_size)
            .field("rw_buffer_size", &self.rw_buffer_size)
            .field("custom_packer", &self.packer.is_some())
            .field("custom_codec", &self.codec.is_some())
            .field("registry", &self.registry)
            .finish()
    }
}

/// 可从 TOML 加载的纯数据配置。
///
/// ```toml
/// max_buffer_size = 2048
/// rw_buffer_size = 65536
/// ```
///
/// 未出现的键取 `0`，随后按 [`UdpServerOptions`] 的规则归一化；未知键视为错误。
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct UdpServerSettings {
    /// 单报文读缓冲大小。
    pub max_buffer_size: usize,
    /// 收发缓冲区提示。
    pub rw_buffer_size: usize,
}

impl UdpServerSettings {
    /// 解析 TOML 文本。
    pub fn from_toml_str(input: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(input)?)
    }

    /// 读取并解析 TOML 文件。
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let input = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    /// 转换为构造参数。
    pub fn into_options(self) -> UdpServerOptions {
        self.into()
    }
}

impl From<UdpServerSettings> for UdpServerOptions {
    fn from(settings: UdpServerSettings) -> Self {
        UdpServerOptions::new()
            .with_max_buffer_size(settings.max_buffer_size)
            .with_rw_buffer_size(settings.rw_buffer_size)
    }
}
