//! 块缓存模块
//!
//! # 主要组件
//!
//! - [`BlockCache`] - 缓存接口：块号到 [`Block`] 的单射映射
//! - [`RuBlockCache`] - 有界缓存，LRU 或 MRU 驱逐
//! - [`UnlimitedBlockCache`] - 无界缓存，从不驱逐
//! - [`CacheKind`] - 构建资源时选择的缓存策略
//!
//! # 设计原理
//!
//! `RuBlockCache` 由两部分组成：
//!
//! 1. **链式哈希桶**：桶数组长度为 2 的幂，桶和链中存放的是槽位下标；
//! 2. **最近使用链表**：双向链表，前后指针同样是槽位下标。
//!
//! 槽位下标在块驻留期间保持不变，所以查找、插入、删除、提升都是 O(1)，
//! 且没有任何自引用。
//!
//! 最近使用链表放在独立的 `Mutex` 中：持有共享读锁的访问者命中时也能提升块，
//! 而块本身只在独占写锁下被修改。
//!
//! # 驱逐
//!
//! 只驱逐未锁定（非脏）的块。LRU 从链表尾部向前找，MRU 从头部向后找；
//! 如果所有块都被锁定，插入失败，调用者必须先 flush。

mod ru;
mod unlimited;

pub use ru::{EvictionPolicy, RuBlockCache};
pub use unlimited::UnlimitedBlockCache;

use crate::block::{Block, BlockId};
use crate::consts::MIN_CAPACITY;
use crate::error::Result;

/// 块缓存接口
pub trait BlockCache<P>: Send + Sync {
    /// 打开缓存并分配内部结构
    fn open(&mut self, capacity: usize) -> Result<()>;

    /// 释放所有状态
    fn close(&mut self);

    /// 是否已打开
    fn is_open(&self) -> bool;

    /// 容量（块数量）
    fn capacity(&self) -> usize;

    /// 当前缓存块数量
    fn len(&self) -> usize;

    /// 是否为空
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 是否缓存了 `id`（不影响最近使用顺序）
    fn contains(&self, id: BlockId) -> bool;

    /// 查找块，命中时提升为最近使用
    fn get_block(&self, id: BlockId) -> Option<&Block<P>>;

    /// 查找块，不影响最近使用顺序
    fn peek(&self, id: BlockId) -> Option<&Block<P>>;

    /// 查找块的可变引用，不影响最近使用顺序
    fn peek_mut(&mut self, id: BlockId) -> Option<&mut Block<P>>;

    /// 插入块（使用块自己的 id）
    ///
    /// # 返回
    ///
    /// 被驱逐的块（调用者可以回收其 payload），未驱逐时为 `None`
    ///
    /// # 错误
    ///
    /// - `InvalidState`: id 已存在，或缓存未打开
    /// - `InvalidInput`: 块未绑定 id
    /// - `NoSpace`: 缓存已满且所有块都被锁定
    fn add_block(&mut self, block: Block<P>) -> Result<Option<Block<P>>>;

    /// 移除块
    fn remove_block(&mut self, id: BlockId) -> Option<Block<P>>;

    /// 被锁定的块数量
    fn locked_count(&self) -> usize;
}

/// 缓存策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheKind {
    /// 无界，从不驱逐
    Unlimited,
    /// 驱逐最久未使用的块
    #[default]
    Lru,
    /// 驱逐最近使用的块
    Mru,
}

impl CacheKind {
    /// 创建对应的（未打开的）缓存
    pub fn create<P>(self) -> Box<dyn BlockCache<P>>
    where
        P: Send + Sync + 'static,
    {
        match self {
            CacheKind::Unlimited => Box::new(UnlimitedBlockCache::new()),
            CacheKind::Lru => Box::new(RuBlockCache::new(EvictionPolicy::Lru)),
            CacheKind::Mru => Box::new(RuBlockCache::new(EvictionPolicy::Mru)),
        }
    }

    /// 该策略接受的最小容量
    pub fn min_capacity(self) -> usize {
        match self {
            CacheKind::Unlimited => 1,
            CacheKind::Lru | CacheKind::Mru => MIN_CAPACITY,
        }
    }
}
