//! 无界块缓存
//!
//! 用内存换取保证：块一旦进入缓存，在资源关闭前不会被驱逐。

use super::BlockCache;
use crate::block::{Block, BlockId};
use crate::error::{Error, ErrorKind, Result};
use std::collections::HashMap;

/// 无界块缓存
pub struct UnlimitedBlockCache<P> {
    blocks: HashMap<BlockId, Block<P>>,
    capacity_hint: usize,
    open: bool,
}

impl<P> UnlimitedBlockCache<P> {
    /// 创建未打开的缓存
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            capacity_hint: 0,
            open: false,
        }
    }
}

impl<P> Default for UnlimitedBlockCache<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Send + Sync> BlockCache<P> for UnlimitedBlockCache<P> {
    /// `capacity` 只作为预分配大小的提示
    fn open(&mut self, capacity: usize) -> Result<()> {
        self.blocks = HashMap::with_capacity(capacity);
        self.capacity_hint = capacity;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.blocks = HashMap::new();
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn capacity(&self) -> usize {
        self.capacity_hint
    }

    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn contains(&self, id: BlockId) -> bool {
        self.blocks.contains_key(&id)
    }

    fn get_block(&self, id: BlockId) -> Option<&Block<P>> {
        self.blocks.get(&id)
    }

    fn peek(&self, id: BlockId) -> Option<&Block<P>> {
        self.blocks.get(&id)
    }

    fn peek_mut(&mut self, id: BlockId) -> Option<&mut Block<P>> {
        self.blocks.get_mut(&id)
    }

    fn add_block(&mut self, block: Block<P>) -> Result<Option<Block<P>>> {
        if !self.open {
            return Err(Error::new(ErrorKind::InvalidState, "cache is closed"));
        }
        let id = block
            .id()
            .ok_or(Error::new(ErrorKind::InvalidInput, "cannot cache an unbound block"))?;
        if self.blocks.contains_key(&id) {
            return Err(Error::with_message(
                ErrorKind::InvalidState,
                format!("block {} is already cached", id),
            ));
        }
        self.blocks.insert(id, block);
        Ok(None)
    }

    fn remove_block(&mut self, id: BlockId) -> Option<Block<P>> {
        self.blocks.remove(&id)
    }

    fn locked_count(&self) -> usize {
        self.blocks.values().filter(|b| b.is_locked()).count()
    }
}
