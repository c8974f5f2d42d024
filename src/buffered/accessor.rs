//! 访问者与访问区间
//!
//! 访问者本身不持有锁，只在 [`ReadWriteAccessor::begin`] 返回的
//! [`AccessScope`] 存活期间持有资源锁。区间结束（`end` 或 drop）即释放。

use super::stats::Counter;
use super::{BufferedIoResource, StateOf};
use crate::block::{Block, BlockId, PayloadConverter};
use crate::error::{Error, ErrorKind, Result};
use crate::header::Header;
use crate::resource::IoResource;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::mem;

const READ_ONLY: Error = Error::new(ErrorKind::NoWriteAccess, "accessor is read-only");

enum Guard<'a, S> {
    Shared(RwLockReadGuard<'a, S>),
    Exclusive(RwLockWriteGuard<'a, S>),
    /// 只在锁转换期间短暂出现
    Released,
}

fn shared<'g, S>(guard: &'g Guard<'_, S>) -> &'g S {
    match guard {
        Guard::Shared(g) => &**g,
        Guard::Exclusive(g) => &**g,
        Guard::Released => unreachable!("resource lock released inside a scope"),
    }
}

fn exclusive<'g, S>(guard: &'g mut Guard<'_, S>) -> Result<&'g mut S> {
    match guard {
        Guard::Exclusive(g) => Ok(&mut **g),
        _ => Err(READ_ONLY),
    }
}

/// 资源访问者
///
/// 存活期间资源保持打开。用 [`close`](Self::close) 关闭可以拿到最后一次
/// flush 的结果，直接 drop 时错误只会被记录到日志。
pub struct ReadWriteAccessor<'r, R, C, H>
where
    R: IoResource,
    C: PayloadConverter,
    H: Header + Clone,
{
    owner: &'r BufferedIoResource<R, C, H>,
    read_only: bool,
    /// 最近一次访问的块号，使用前需要重新校验
    last_block: Option<BlockId>,
    closed: bool,
}

impl<'r, R, C, H> ReadWriteAccessor<'r, R, C, H>
where
    R: IoResource,
    C: PayloadConverter,
    H: Header + Clone,
{
    pub(super) fn new(owner: &'r BufferedIoResource<R, C, H>, read_only: bool) -> Self {
        Self {
            owner,
            read_only,
            last_block: None,
            closed: false,
        }
    }

    /// 是否只读
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// 所属资源
    pub fn resource(&self) -> &'r BufferedIoResource<R, C, H> {
        self.owner
    }

    /// 开始访问区间
    ///
    /// 只读访问者获取共享锁，读写访问者获取独占锁。
    pub fn begin(&mut self) -> AccessScope<'_, R, C, H> {
        let owner = self.owner;
        let guard = if self.read_only {
            let guard = owner.state.read();
            owner.count(Counter::SharedLock);
            Guard::Shared(guard)
        } else {
            let guard = owner.state.write();
            owner.count(Counter::ExclusiveLock);
            Guard::Exclusive(guard)
        };
        AccessScope {
            owner,
            read_only: self.read_only,
            last_block: &mut self.last_block,
            guard,
        }
    }

    /// 关闭访问者
    ///
    /// 最后一个访问者关闭时会 flush 并关闭资源。flush 失败时资源仍会关闭，
    /// 尚未写回的脏块全部丢弃（数据丢失，不能重试），错误在这里返回。
    /// 需要可重试的写回时，先在区间之外调用
    /// [`BufferedIoResource::flush`]：它失败时未写回的块保持脏状态。
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.owner.release()
    }
}

impl<R, C, H> Drop for ReadWriteAccessor<'_, R, C, H>
where
    R: IoResource,
    C: PayloadConverter,
    H: Header + Clone,
{
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.owner.release() {
            log::error!(
                "[BUFIO] releasing accessor on {} failed: {}",
                self.owner.resource().name(),
                e
            );
        }
    }
}

impl<R, C, H> core::fmt::Debug for ReadWriteAccessor<'_, R, C, H>
where
    R: IoResource,
    C: PayloadConverter,
    H: Header + Clone,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReadWriteAccessor")
            .field("resource", &self.owner.resource().name())
            .field("read_only", &self.read_only)
            .field("last_block", &self.last_block)
            .field("closed", &self.closed)
            .finish()
    }
}

/// 访问区间
///
/// 持有资源锁。区间内返回的块引用在区间结束后失效。
pub struct AccessScope<'a, R, C, H>
where
    R: IoResource,
    C: PayloadConverter,
    H: Header + Clone,
{
    owner: &'a BufferedIoResource<R, C, H>,
    read_only: bool,
    last_block: &'a mut Option<BlockId>,
    guard: Guard<'a, StateOf<R, C, H>>,
}

impl<'a, R, C, H> AccessScope<'a, R, C, H>
where
    R: IoResource,
    C: PayloadConverter,
    H: Header + Clone,
{
    /// 获取块
    ///
    /// 未命中时从资源加载。块位于资源末尾之后时，只读区间返回 `None`，
    /// 读写区间创建一个新的空块。
    pub fn get_block(&mut self, id: BlockId) -> Result<Option<&Block<C::Payload>>> {
        let owner = self.owner;
        owner.count(Counter::Lookup);

        if *self.last_block == Some(id) && shared(&self.guard).cache.contains(id) {
            owner.count(Counter::LastBlockHit);
            log::trace!("[BUFIO] last-block hit for {}", id);
            return Ok(shared(&self.guard).cache.peek(id));
        }

        if !shared(&self.guard).cache.contains(id) {
            owner.count(Counter::Miss);
            if !self.fetch(id)? {
                return Ok(None);
            }
        }

        *self.last_block = Some(id);
        Ok(shared(&self.guard).cache.get_block(id))
    }

    /// 获取块的可变引用，块不存在时创建
    ///
    /// 修改后需要调用 [`lock_block`](Self::lock_block) 才会被写回。
    ///
    /// # 错误
    ///
    /// 只读区间返回 `NoWriteAccess`
    pub fn get_block_mut(&mut self, id: BlockId) -> Result<&mut Block<C::Payload>> {
        let owner = self.owner;
        let state = exclusive(&mut self.guard)?;
        owner.count(Counter::Lookup);

        if state.cache.get_block(id).is_some() {
            if *self.last_block == Some(id) {
                owner.count(Counter::LastBlockHit);
            }
        } else {
            owner.count(Counter::Miss);
            owner.load_block(state, id, true)?;
        }

        *self.last_block = Some(id);
        state.cache.peek_mut(id).ok_or_else(|| {
            Error::with_message(ErrorKind::InvalidState, format!("block {} vanished from the cache", id))
        })
    }

    /// 标记块为脏，并把它的逻辑大小至少扩展到 `size`
    ///
    /// 脏块在 flush 之前不会被驱逐。
    ///
    /// # 错误
    ///
    /// 只读区间返回 `NoWriteAccess`
    pub fn lock_block(&mut self, id: BlockId, size: usize) -> Result<()> {
        let owner = self.owner;
        let state = exclusive(&mut self.guard)?;
        owner.lock_block_locked(state, id, size)?;
        *self.last_block = Some(id);
        Ok(())
    }

    /// 是否存在未写回的块
    pub fn has_locked_blocks(&self) -> bool {
        !shared(&self.guard).dirty.is_empty()
    }

    /// 未写回的块数量
    pub fn locked_block_count(&self) -> usize {
        shared(&self.guard).dirty.len()
    }

    /// 当前缓存的块数量
    pub fn cached_block_count(&self) -> usize {
        shared(&self.guard).cache.len()
    }

    /// 资源 header
    pub fn header(&self) -> Option<&H> {
        shared(&self.guard).header.as_ref()
    }

    /// 资源 header 的可变引用，修改在下一次 flush 时写回
    ///
    /// # 错误
    ///
    /// 只读区间返回 `NoWriteAccess`
    pub fn header_mut(&mut self) -> Result<Option<&mut H>> {
        Ok(exclusive(&mut self.guard)?.header.as_mut())
    }

    /// 结束区间并释放锁
    pub fn end(self) {}

    /// 未命中时加载块
    ///
    /// 读写区间已经持有独占锁，直接加载。只读区间先释放共享锁，获取独占锁，
    /// 重新检查（其他线程可能已经加载了该块），加载后原子降级回共享锁。
    fn fetch(&mut self, id: BlockId) -> Result<bool> {
        let owner = self.owner;
        if !self.read_only {
            let state = exclusive(&mut self.guard)?;
            return owner.load_block(state, id, true);
        }

        match mem::replace(&mut self.guard, Guard::Released) {
            Guard::Shared(read) => drop(read),
            other => {
                self.guard = other;
                return Err(Error::new(ErrorKind::InvalidState, "read-only scope without a shared lock"));
            }
        }

        let mut write = owner.state.write();
        owner.count(Counter::ExclusiveLock);
        let result = if write.cache.contains(id) {
            Ok(true)
        } else {
            owner.load_block(&mut write, id, false)
        };
        self.guard = Guard::Shared(RwLockWriteGuard::downgrade(write));
        result
    }
}
