//! 错误处理模块
//!
//! 定义了绑定层中使用的统一错误类型。
//!
//! 所有失败都以 `Err` / `false` 的形式返回给直接调用者，绑定层内部从不 panic 或中止进程，
//! 也不做任何重试（设备丢失后的恢复属于外部设备层的职责）。
//!
//! # 错误分类
//!
//! - `Construction`：原生设备或资源创建失败
//! - `InvalidState`：在已销毁、已消费或顺序错误的对象上执行操作
//! - `InvalidDescriptor`：传入了格式错误的 `TextureInfo` / `BackendTexture` / `ImageInfo`
//! - 其余为环境性错误（配置、IO、日志、不支持的后端、设备执行错误）

use std::fmt;

use crate::gpu::BackendApi;

/// 绑定层统一的 Result 类型
pub type Result<T> = std::result::Result<T, BridgeError>;

/// 绑定层的错误类型
#[derive(Debug)]
pub enum BridgeError {
    /// 原生设备 / 资源创建失败
    Construction(ConstructionError),

    /// 对象状态不允许该操作
    InvalidState(StateError),

    /// 描述符无效
    InvalidDescriptor(DescriptorError),

    /// 当前平台未编译或不支持该后端
    Unsupported(String),

    /// 设备执行错误（由外部设备层报告）
    Device(String),

    /// 配置错误
    Config(ConfigError),

    /// IO 错误
    Io(std::io::Error),

    /// 日志系统错误
    Log(String),
}

/// 错误类别
///
/// C ABI 层通过 `db_last_error_kind` 把它暴露给调用者。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorKind {
    None = 0,
    ConstructionFailure = 1,
    InvalidState = 2,
    InvalidDescriptor = 3,
    Unsupported = 4,
    Device = 5,
    Config = 6,
    Io = 7,
}

/// 构造失败
#[derive(Debug)]
pub enum ConstructionError {
    /// 原生设备初始化失败
    DeviceInit(String),

    /// GPU 资源分配失败
    ResourceAllocation(String),

    /// 超出 Recorder 的 GPU 预算
    BudgetExceeded { requested: u64, available: u64 },
}

/// 状态错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Context 已被销毁、放弃或设备已丢失
    ContextInvalid,

    /// Recording 来自另一个 Context
    ForeignRecording { expected: u64, found: u64 },

    /// Recording 已被插入或提交过
    RecordingConsumed,

    /// Surface 来自另一个 Context
    ForeignSurface { expected: u64, found: u64 },

    /// 有序模式下 Recording 未按 snap 顺序插入
    OutOfOrder { expected: u64, found: u64 },

    /// 待提交队列已满
    QueueFull(usize),

    /// C ABI 句柄为空、已销毁或已被消费
    InvalidHandle(u64),
}

/// 描述符错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// TextureInfo 无效
    InvalidTextureInfo(String),

    /// BackendTexture 无效
    InvalidBackendTexture(String),

    /// ImageInfo 无效
    InvalidImageInfo(String),

    /// 描述符属于另一个后端
    BackendMismatch { expected: BackendApi, found: BackendApi },

    /// 纹理格式与颜色类型不匹配
    ColorTypeMismatch(String),
}

/// 配置相关的错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件未找到
    FileNotFound(String),

    /// 配置文件解析失败
    ParseError(String),

    /// 配置值无效
    InvalidValue { field: String, reason: String },
}

impl BridgeError {
    /// 返回错误类别
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::Construction(_) => ErrorKind::ConstructionFailure,
            BridgeError::InvalidState(_) => ErrorKind::InvalidState,
            BridgeError::InvalidDescriptor(_) => ErrorKind::InvalidDescriptor,
            BridgeError::Unsupported(_) => ErrorKind::Unsupported,
            BridgeError::Device(_) => ErrorKind::Device,
            BridgeError::Config(_) => ErrorKind::Config,
            BridgeError::Io(_) | BridgeError::Log(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn device_init(msg: impl Into<String>) -> Self {
        BridgeError::Construction(ConstructionError::DeviceInit(msg.into()))
    }

    pub(crate) fn allocation(msg: impl Into<String>) -> Self {
        BridgeError::Construction(ConstructionError::ResourceAllocation(msg.into()))
    }

    pub(crate) fn device(msg: impl Into<String>) -> Self {
        BridgeError::Device(msg.into())
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Construction(e) => write!(f, "Construction failure: {}", e),
            BridgeError::InvalidState(e) => write!(f, "Invalid state: {}", e),
            BridgeError::InvalidDescriptor(e) => write!(f, "Invalid descriptor: {}", e),
            BridgeError::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            BridgeError::Device(msg) => write!(f, "Device error: {}", msg),
            BridgeError::Config(e) => write!(f, "Configuration error: {}", e),
            BridgeError::Io(e) => write!(f, "IO error: {}", e),
            BridgeError::Log(msg) => write!(f, "Log error: {}", msg),
        }
    }
}

impl fmt::Display for ConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstructionError::DeviceInit(msg) => write!(f, "Device initialization failed: {}", msg),
            ConstructionError::ResourceAllocation(msg) => write!(f, "Resource allocation failed: {}", msg),
            ConstructionError::BudgetExceeded { requested, available } => write!(
                f,
                "GPU budget exceeded: requested {} bytes, {} bytes available",
                requested, available
            ),
        }
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::ContextInvalid => write!(f, "context is destroyed, abandoned or lost"),
            StateError::ForeignRecording { expected, found } => write!(
                f,
                "recording belongs to context {} but was inserted into context {}",
                found, expected
            ),
            StateError::RecordingConsumed => write!(f, "recording was already inserted"),
            StateError::ForeignSurface { expected, found } => write!(
                f,
                "surface belongs to context {} but was used with context {}",
                found, expected
            ),
            StateError::OutOfOrder { expected, found } => write!(
                f,
                "recording inserted out of order: expected sequence {}, found {}",
                expected, found
            ),
            StateError::QueueFull(cap) => write!(f, "pending recording queue is full ({} entries)", cap),
            StateError::InvalidHandle(raw) => write!(f, "handle {:#x} is null, destroyed or consumed", raw),
        }
    }
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DescriptorError::InvalidTextureInfo(msg) => write!(f, "invalid texture info: {}", msg),
            DescriptorError::InvalidBackendTexture(msg) => write!(f, "invalid backend texture: {}", msg),
            DescriptorError::InvalidImageInfo(msg) => write!(f, "invalid image info: {}", msg),
            DescriptorError::BackendMismatch { expected, found } => write!(
                f,
                "descriptor is for the {} backend, expected {}",
                found.name(),
                expected.name()
            ),
            DescriptorError::ColorTypeMismatch(msg) => write!(f, "color type mismatch: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {}", path),
            ConfigError::ParseError(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Io(e) => Some(e),
            BridgeError::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConstructionError {}
impl std::error::Error for StateError {}
impl std::error::Error for DescriptorError {}
impl std::error::Error for ConfigError {}

// 实现 From trait 以便于错误转换
impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err)
    }
}

impl From<ConfigError> for BridgeError {
    fn from(err: ConfigError) -> Self {
        BridgeError::Config(err)
    }
}

impl From<ConstructionError> for BridgeError {
    fn from(err: ConstructionError) -> Self {
        BridgeError::Construction(err)
    }
}

impl From<StateError> for BridgeError {
    fn from(err: StateError) -> Self {
        BridgeError::InvalidState(err)
    }
}

impl From<DescriptorError> for BridgeError {
    fn from(err: DescriptorError) -> Self {
        BridgeError::InvalidDescriptor(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            BridgeError::device_init("no adapter").kind(),
            ErrorKind::ConstructionFailure
        );
        assert_eq!(
            BridgeError::from(StateError::ContextInvalid).kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            BridgeError::from(DescriptorError::InvalidBackendTexture("empty".into())).kind(),
            ErrorKind::InvalidDescriptor
        );
    }

    #[test]
    fn test_error_display() {
        let err = BridgeError::from(StateError::OutOfOrder { expected: 2, found: 3 });
        assert_eq!(
            err.to_string(),
            "Invalid state: recording inserted out of order: expected sequence 2, found 3"
        );
    }
}
