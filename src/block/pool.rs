//! payload 回收池
//!
//! 缓存未命中时优先复用被驱逐块的 payload，避免反复分配。
//! 只有未锁定的块才会被驱逐，所以池中的 payload 总是可以安全覆盖。

use super::converter::PayloadConverter;
use super::Block;

/// 有界的 payload 空闲链表
pub struct BlockPool<P> {
    free: Vec<P>,
    limit: usize,
}

impl<P> BlockPool<P> {
    /// 创建最多保留 `limit` 个空闲 payload 的池
    pub fn new(limit: usize) -> Self {
        Self {
            free: Vec::with_capacity(limit),
            limit,
        }
    }

    /// 取出一个未绑定的空块
    ///
    /// 池空时由转换器新分配，否则复用并清空。
    pub fn checkout<C>(&mut self, converter: &C, bytes_per_block: usize) -> Block<P>
    where
        C: PayloadConverter<Payload = P>,
    {
        let payload = match self.free.pop() {
            Some(mut payload) => {
                converter.reset(&mut payload);
                payload
            }
            None => converter.new_block_data(bytes_per_block),
        };
        Block::new(payload)
    }

    /// 归还块的 payload，池满时直接丢弃
    pub fn recycle(&mut self, block: Block<P>) {
        if self.free.len() < self.limit {
            self.free.push(block.into_payload());
        }
    }

    /// 空闲 payload 数量
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// 释放所有空闲 payload
    pub fn clear(&mut self) {
        self.free.clear();
    }
}
