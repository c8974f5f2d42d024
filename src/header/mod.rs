//! 资源头部元数据
//!
//! Header 存放在物理资源偏移 0 处，占用固定大小的区域，
//! 块数据紧随其后：`[header][block 0][block 1]...`
//!
//! - [`Header`] - 头部的加载/保存接口
//! - [`SimpleHeader`] - 版本号 + 条目计数 + 两个索引区间
//! - [`NoHeader`] - 未配置头部时使用的零长度实现

mod simple;

pub use simple::SimpleHeader;

use crate::error::Result;

/// 头部接口
///
/// 实现者决定自己的字节布局。`load` 收到的切片长度恒为 `size_in_bytes()`，
/// 资源中不足的部分以 0 填充；`save` 收到的切片同样长度，且已清零。
pub trait Header: Send + Sync {
    /// 在资源中预留的字节数
    fn size_in_bytes(&self) -> usize;

    /// 从字节反序列化
    fn load(&mut self, bytes: &[u8]) -> Result<()>;

    /// 序列化到字节
    fn save(&self, bytes: &mut [u8]) -> Result<()>;
}

/// 零长度头部
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoHeader;

impl Header for NoHeader {
    fn size_in_bytes(&self) -> usize {
        0
    }

    fn load(&mut self, _bytes: &[u8]) -> Result<()> {
        Ok(())
    }

    fn save(&self, _bytes: &mut [u8]) -> Result<()> {
        Ok(())
    }
}
