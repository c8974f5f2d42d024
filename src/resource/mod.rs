//! 物理资源抽象
//!
//! 缓冲层只通过 [`IoResource`] 访问底层存储：按绝对偏移定位的可读写通道、
//! 大小查询、准备和删除。
//!
//! - [`FileResource`] - 本地文件
//! - [`MemoryResource`] - 内存中的字节向量（测试和临时数据）

mod file;
mod memory;

pub use file::FileResource;
pub use memory::{MemoryChannel, MemoryResource};

use std::io::{self, Read, Seek, Write};

/// 物理资源接口
///
/// 实现此 trait 以提供底层存储访问。错误以 `io::Error` 返回，
/// 由缓冲层附加块号和资源名后包装。
///
/// # 示例
///
/// ```rust,ignore
/// struct MyResource { /* ... */ }
///
/// impl IoResource for MyResource {
///     type Channel = std::fs::File;
///
///     fn read_channel(&self) -> io::Result<Self::Channel> { /* ... */ }
///     fn write_channel(&self) -> io::Result<Self::Channel> { /* ... */ }
///     fn size(&self) -> io::Result<u64> { /* ... */ }
///     fn delete(&self) -> io::Result<()> { /* ... */ }
///     fn name(&self) -> String { "my-resource".into() }
/// }
/// ```
pub trait IoResource: Send + Sync {
    /// 可定位的字节通道
    type Channel: Read + Write + Seek + Send + Sync;

    /// 打开只读通道
    fn read_channel(&self) -> io::Result<Self::Channel>;

    /// 打开读写通道
    fn write_channel(&self) -> io::Result<Self::Channel>;

    /// 当前字节数，资源不存在时为 0
    fn size(&self) -> io::Result<u64>;

    /// 在首次写入前准备资源（创建目录、文件等）
    ///
    /// 默认实现什么都不做。
    fn prepare(&self) -> io::Result<()> {
        Ok(())
    }

    /// 删除资源
    fn delete(&self) -> io::Result<()>;

    /// 是否只读
    fn is_read_only(&self) -> bool {
        false
    }

    /// 用于日志和错误信息的名称
    fn name(&self) -> String;
}
