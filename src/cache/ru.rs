//! 有界块缓存：LRU / MRU 驱逐
//!
//! 槽位数组存放块，哈希桶和最近使用链表都只保存槽位下标。

use super::BlockCache;
use crate::block::{Block, BlockId};
use crate::consts::{INITIAL_BUCKETS, LOAD_FACTOR, MIN_CAPACITY};
use crate::error::{Error, ErrorKind, Result};
use parking_lot::Mutex;

/// 驱逐策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// 最久未使用（链表尾部）
    Lru,
    /// 最近使用（链表头部）
    Mru,
}

/// 容纳 `entries` 个条目所需的桶数量
fn table_size(entries: usize) -> usize {
    ((entries as f64 / LOAD_FACTOR).ceil() as usize)
        .max(1)
        .next_power_of_two()
}

#[inline]
fn bucket_of(id: BlockId, mask: usize) -> usize {
    ((id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as usize & mask
}

struct Slot<P> {
    block: Option<Block<P>>,
    /// 同一个桶中的下一个槽位
    chain: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Link {
    prev: Option<usize>,
    next: Option<usize>,
}

/// 最近使用链表，head 为最近使用
#[derive(Debug, Default)]
struct Recency {
    links: Vec<Link>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl Recency {
    fn push_front(&mut self, slot: usize) {
        self.links[slot] = Link {
            prev: None,
            next: self.head,
        };
        match self.head {
            Some(old) => self.links[old].prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let Link { prev, next } = self.links[slot];
        match prev {
            Some(p) => self.links[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.links[n].prev = prev,
            None => self.tail = prev,
        }
        self.links[slot] = Link::default();
    }

    fn promote(&mut self, slot: usize) {
        if self.head != Some(slot) {
            self.unlink(slot);
            self.push_front(slot);
        }
    }

    fn clear(&mut self) {
        self.links.clear();
        self.head = None;
        self.tail = None;
    }
}

/// 有界块缓存
pub struct RuBlockCache<P> {
    policy: EvictionPolicy,
    capacity: usize,
    open: bool,
    buckets: Vec<Option<usize>>,
    /// 桶数组不再增长的上限
    max_buckets: usize,
    slots: Vec<Slot<P>>,
    free_slots: Vec<usize>,
    len: usize,
    recency: Mutex<Recency>,
}

impl<P> RuBlockCache<P> {
    /// 创建未打开的缓存
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            capacity: 0,
            open: false,
            buckets: Vec::new(),
            max_buckets: 0,
            slots: Vec::new(),
            free_slots: Vec::new(),
            len: 0,
            recency: Mutex::new(Recency::default()),
        }
    }

    /// 驱逐策略
    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// 当前桶数量
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// 按最近使用顺序（从最近到最久）列出块号
    pub fn recency_order(&self) -> Vec<BlockId> {
        let recency = self.recency.lock();
        let mut ids = Vec::with_capacity(self.len);
        let mut cur = recency.head;
        while let Some(slot) = cur {
            if let Some(id) = self.slots[slot].block.as_ref().and_then(Block::id) {
                ids.push(id);
            }
            cur = recency.links[slot].next;
        }
        ids
    }

    fn find_slot(&self, id: BlockId) -> Option<usize> {
        if self.buckets.is_empty() {
            return None;
        }
        let mut cur = self.buckets[bucket_of(id, self.buckets.len() - 1)];
        while let Some(slot) = cur {
            let entry = &self.slots[slot];
            if entry.block.as_ref().and_then(Block::id) == Some(id) {
                return Some(slot);
            }
            cur = entry.chain;
        }
        None
    }

    /// 负载超过阈值且未达到上限时，桶数组翻倍并重新散列
    fn maybe_grow(&mut self) {
        let threshold = (self.buckets.len() as f64 * LOAD_FACTOR) as usize;
        if self.len < threshold || self.buckets.len() >= self.max_buckets {
            return;
        }

        let new_len = self.buckets.len() * 2;
        let mask = new_len - 1;
        let mut buckets = vec![None; new_len];
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(id) = slot.block.as_ref().and_then(Block::id) {
                let bucket = bucket_of(id, mask);
                slot.chain = buckets[bucket];
                buckets[bucket] = Some(index);
            }
        }
        log::trace!("[RUCACHE] rehash {} -> {} buckets", self.buckets.len(), new_len);
        self.buckets = buckets;
    }

    fn alloc_slot(&mut self, block: Block<P>) -> usize {
        match self.free_slots.pop() {
            Some(index) => {
                self.slots[index].block = Some(block);
                index
            }
            None => {
                self.slots.push(Slot {
                    block: Some(block),
                    chain: None,
                });
                self.recency.get_mut().links.push(Link::default());
                self.slots.len() - 1
            }
        }
    }

    fn remove_slot(&mut self, index: usize) -> Option<Block<P>> {
        let id = self.slots[index].block.as_ref().and_then(Block::id)?;
        let bucket = bucket_of(id, self.buckets.len() - 1);
        let next = self.slots[index].chain.take();

        if self.buckets[bucket] == Some(index) {
            self.buckets[bucket] = next;
        } else {
            let mut cur = self.buckets[bucket];
            while let Some(slot) = cur {
                if self.slots[slot].chain == Some(index) {
                    self.slots[slot].chain = next;
                    break;
                }
                cur = self.slots[slot].chain;
            }
        }

        self.recency.get_mut().unlink(index);
        self.free_slots.push(index);
        self.len -= 1;
        self.slots[index].block.take()
    }

    /// 按策略找到第一个未锁定的块并移除
    fn evict(&mut self) -> Result<Block<P>> {
        let recency = self.recency.get_mut();
        let mut cur = match self.policy {
            EvictionPolicy::Lru => recency.tail,
            EvictionPolicy::Mru => recency.head,
        };

        let mut victim = None;
        while let Some(slot) = cur {
            let locked = self.slots[slot]
                .block
                .as_ref()
                .map_or(true, Block::is_locked);
            if !locked {
                victim = Some(slot);
                break;
            }
            cur = match self.policy {
                EvictionPolicy::Lru => recency.links[slot].prev,
                EvictionPolicy::Mru => recency.links[slot].next,
            };
        }

        match victim.and_then(|slot| self.remove_slot(slot)) {
            Some(block) => {
                log::trace!("[RUCACHE] evicted block {:?} ({:?})", block.id(), self.policy);
                Ok(block)
            }
            None => {
                log::error!(
                    "[RUCACHE] cannot evict: all {} blocks are locked, flush required",
                    self.len
                );
                Err(Error::new(
                    ErrorKind::NoSpace,
                    "all cache blocks are locked, cannot evict",
                ))
            }
        }
    }
}

impl<P: Send + Sync> BlockCache<P> for RuBlockCache<P> {
    fn open(&mut self, capacity: usize) -> Result<()> {
        if capacity < MIN_CAPACITY {
            return Err(Error::with_message(
                ErrorKind::InvalidInput,
                format!("cache capacity {} below minimum {}", capacity, MIN_CAPACITY),
            ));
        }
        self.close();
        self.capacity = capacity;
        self.max_buckets = table_size(capacity);
        self.buckets = vec![None; INITIAL_BUCKETS.min(self.max_buckets)];
        self.open = true;
        log::debug!(
            "[RUCACHE] open capacity={} buckets={} max_buckets={} policy={:?}",
            capacity,
            self.buckets.len(),
            self.max_buckets,
            self.policy
        );
        Ok(())
    }

    fn close(&mut self) {
        self.buckets = Vec::new();
        self.slots = Vec::new();
        self.free_slots = Vec::new();
        self.recency.get_mut().clear();
        self.len = 0;
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn len(&self) -> usize {
        self.len
    }

    fn contains(&self, id: BlockId) -> bool {
        self.find_slot(id).is_some()
    }

    fn get_block(&self, id: BlockId) -> Option<&Block<P>> {
        let slot = self.find_slot(id)?;
        self.recency.lock().promote(slot);
        self.slots[slot].block.as_ref()
    }

    fn peek(&self, id: BlockId) -> Option<&Block<P>> {
        let slot = self.find_slot(id)?;
        self.slots[slot].block.as_ref()
    }

    fn peek_mut(&mut self, id: BlockId) -> Option<&mut Block<P>> {
        let slot = self.find_slot(id)?;
        self.slots[slot].block.as_mut()
    }

    fn add_block(&mut self, block: Block<P>) -> Result<Option<Block<P>>> {
        if !self.open {
            return Err(Error::new(ErrorKind::InvalidState, "cache is closed"));
        }
        let id = block
            .id()
            .ok_or(Error::new(ErrorKind::InvalidInput, "cannot cache an unbound block"))?;
        if self.find_slot(id).is_some() {
            return Err(Error::with_message(
                ErrorKind::InvalidState,
                format!("block {} is already cached", id),
            ));
        }

        let evicted = if self.len >= self.capacity {
            Some(self.evict()?)
        } else {
            None
        };

        self.maybe_grow();
        let index = self.alloc_slot(block);
        let bucket = bucket_of(id, self.buckets.len() - 1);
        self.slots[index].chain = self.buckets[bucket];
        self.buckets[bucket] = Some(index);
        self.recency.get_mut().push_front(index);
        self.len += 1;

        Ok(evicted)
    }

    fn remove_block(&mut self, id: BlockId) -> Option<Block<P>> {
        let slot = self.find_slot(id)?;
        self.remove_slot(slot)
    }

    fn locked_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.block.as_ref().is_some_and(Block::is_locked))
            .count()
    }
}
