//! 错误类型定义
//!
//! 提供缓冲块 I/O 操作的错误类型。

use std::borrow::Cow;
use std::fmt;
use std::io;

/// 块 I/O 操作错误
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Cow<'static, str>,
    source: Option<io::Error>,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// I/O 错误
    Io,
    /// 无效参数
    InvalidInput,
    /// 数据损坏
    Corrupted,
    /// 无写权限
    NoWriteAccess,
    /// 空间不足（缓存中所有块都被锁定）
    NoSpace,
    /// 无效状态
    InvalidState,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self {
            kind,
            message: Cow::Borrowed(message),
            source: None,
        }
    }

    /// 创建带动态消息的错误
    pub fn with_message(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Cow::Owned(message.into()),
            source: None,
        }
    }

    /// 包装底层 I/O 错误，附带上下文（块号、资源名等）
    pub fn io(context: impl Into<String>, cause: io::Error) -> Self {
        Self {
            kind: ErrorKind::Io,
            message: Cow::Owned(context.into()),
            source: Some(cause),
        }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(cause) => write!(f, "{:?}: {}: {}", self.kind, self.message, cause),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_display_without_source() {
        let err = Error::new(ErrorKind::InvalidState, "resource still in use");
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(err.to_string(), "InvalidState: resource still in use");
        assert!(err.source().is_none());
    }

    #[test]
    fn test_io_error_keeps_cause() {
        let cause = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        let err = Error::io("block 7 of mem", cause);
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.message(), "block 7 of mem");
        assert!(err.to_string().contains("short read"));
        assert!(err.source().is_some());
    }
}
