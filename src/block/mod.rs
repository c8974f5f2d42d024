//! 块抽象
//!
//! - [`Block`] - 缓存中的一个逻辑块：块号、逻辑大小、状态标志和 payload
//! - [`PayloadConverter`] - payload 与字节之间的转换接口
//! - [`BlockPool`] - 被驱逐块的 payload 回收池

mod converter;
mod pool;

pub use converter::{BytesConverter, IntArrayConverter, PayloadConverter};
pub use pool::BlockPool;

use bitflags::bitflags;

/// 块号
pub type BlockId = u32;

bitflags! {
    /// 块状态标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockFlags: u8 {
        /// 已修改，等待 flush（不可被驱逐）
        const LOCKED = 0x01;
        /// 位于资源末尾之后，尚未持久化过
        const NEW    = 0x02;
    }
}

/// 缓存块
///
/// 块在缓存中时由缓存独占持有，对外只在 begin/end 区间内以引用形式暴露。
///
/// # 字段说明
///
/// - `id`: 块号，未绑定时为 `None`
/// - `size`: 已填充的逻辑单元数
/// - `flags`: 块状态标志
/// - `payload`: 由 [`PayloadConverter`] 分配和解释的数据
pub struct Block<P> {
    id: Option<BlockId>,
    size: usize,
    flags: BlockFlags,
    payload: P,
}

impl<P> core::fmt::Debug for Block<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl<P> Block<P> {
    /// 用 payload 创建未绑定的块
    pub fn new(payload: P) -> Self {
        Self {
            id: None,
            size: 0,
            flags: BlockFlags::empty(),
            payload,
        }
    }

    /// 块号
    pub fn id(&self) -> Option<BlockId> {
        self.id
    }

    /// 绑定块号
    pub(crate) fn bind(&mut self, id: BlockId) {
        self.id = Some(id);
    }

    /// 逻辑大小
    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size;
    }

    /// 把逻辑大小扩展到 `max(当前, size)`
    pub(crate) fn grow_size(&mut self, size: usize) {
        self.size = self.size.max(size);
    }

    /// 状态标志
    pub fn flags(&self) -> BlockFlags {
        self.flags
    }

    /// 是否等待 flush
    pub fn is_locked(&self) -> bool {
        self.flags.contains(BlockFlags::LOCKED)
    }

    pub(crate) fn lock(&mut self) {
        self.flags.insert(BlockFlags::LOCKED);
    }

    /// 写回后清除锁定，块同时不再是新块
    pub(crate) fn unlock(&mut self) {
        self.flags.remove(BlockFlags::LOCKED | BlockFlags::NEW);
    }

    /// 是否尚未持久化过
    pub fn is_new(&self) -> bool {
        self.flags.contains(BlockFlags::NEW)
    }

    pub(crate) fn mark_new(&mut self) {
        self.flags.insert(BlockFlags::NEW);
    }

    /// payload 的只读引用
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// payload 的可变引用
    ///
    /// 修改后需要调用 `lock_block` 才会被写回。
    pub fn payload_mut(&mut self) -> &mut P {
        &mut self.payload
    }

    /// 取出 payload（用于回收）
    pub fn into_payload(self) -> P {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_creation() {
        let block = Block::new(vec![0u8; 16]);
        assert_eq!(block.id(), None);
        assert_eq!(block.size(), 0);
        assert_eq!(block.flags(), BlockFlags::empty());
        assert!(!block.is_locked());
    }

    #[test]
    fn test_lock_unlock() {
        let mut block = Block::new(());
        block.bind(4);
        block.mark_new();
        block.lock();
        assert!(block.is_locked());
        assert!(block.is_new());

        block.unlock();
        assert!(!block.is_locked());
        assert!(!block.is_new());
        assert_eq!(block.id(), Some(4));
    }

    #[test]
    fn test_grow_size_keeps_max() {
        let mut block = Block::new(());
        block.grow_size(3);
        block.grow_size(1);
        assert_eq!(block.size(), 3);
        block.set_size(0);
        assert_eq!(block.size(), 0);
    }
}
