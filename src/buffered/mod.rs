//! 缓冲块 I/O 资源
//!
//! [`BufferedIoResource`] 把一个物理资源划分为固定大小的逻辑块，
//! 部分块驻留在 [`BlockCache`] 中，通过 [`ReadWriteAccessor`] 同步访问。
//!
//! # 持久化布局
//!
//! ```text
//! [header: header_bytes][block 0: bytes_per_block][block 1]...
//! offset(id) = id * bytes_per_block + header_bytes
//! ```
//!
//! # 生命周期
//!
//! - **Closed**：使用计数为 0，无 I/O 缓冲区，缓存关闭，无 header
//! - **Open**：使用计数 > 0，缓冲区已分配，缓存已打开，header 已加载
//!
//! 第一个访问者创建时打开（独占锁下），最后一个访问者关闭时先 flush 再释放。
//!
//! # 锁
//!
//! 整个资源只有一把读写锁，保护缓存、脏块集合、I/O 缓冲区、payload 回收池、
//! 通道和 header。只读区间持有共享锁，读写区间和内部维护（flush、打开、
//! 关闭、删除）持有独占锁。只读区间未命中时释放共享锁、获取独占锁、
//! 重新检查缓存后加载，再原子降级回共享锁。
//!
//! # 示例
//!
//! ```rust,ignore
//! let resource = BufferedIoResource::builder(MemoryResource::new("mem"), IntArrayConverter)
//!     .cache_kind(CacheKind::Lru)
//!     .cache_size(32)
//!     .bytes_per_block(64)
//!     .header(SimpleHeader::new())
//!     .build()?;
//!
//! let mut writer = resource.new_accessor(false)?;
//! {
//!     let mut scope = writer.begin();
//!     scope.get_block_mut(0)?.payload_mut()[0] = 42;
//!     scope.lock_block(0, 1)?;
//! }
//! writer.close()?; // 最后一个访问者：flush 并关闭
//! ```

mod accessor;
mod builder;
mod stats;

pub use accessor::{AccessScope, ReadWriteAccessor};
pub use builder::Builder;
pub use stats::StatsSnapshot;

use self::stats::{Counter, Statistics};
use crate::block::{Block, BlockId, BlockPool, PayloadConverter};
use crate::cache::{BlockCache, CacheKind};
use crate::consts::{MAX_ADDRESSABLE_INDEX, MAX_CHANNEL_SIZE};
use crate::error::{Error, ErrorKind, Result};
use crate::header::{Header, NoHeader};
use crate::resource::IoResource;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

/// 锁保护的共享状态
pub(crate) struct State<Ch, P, H> {
    channel: Option<Ch>,
    /// 可复用的 I/O 缓冲区，仅在打开时存在
    buffer: Option<Vec<u8>>,
    cache: Box<dyn BlockCache<P>>,
    /// 脏块集合（有序，flush 时按偏移顺序写回）
    dirty: BTreeSet<BlockId>,
    pool: BlockPool<P>,
    header: Option<H>,
}

pub(crate) type StateOf<R, C, H> =
    State<<R as IoResource>::Channel, <C as PayloadConverter>::Payload, H>;

/// 读满缓冲区或读到末尾
fn read_fully<Ch: Read>(channel: &mut Ch, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match channel.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn read_at<Ch: Read + Seek>(channel: &mut Ch, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    channel.seek(SeekFrom::Start(offset))?;
    read_fully(channel, buf)
}

fn write_at<Ch: Write + Seek>(channel: &mut Ch, offset: u64, buf: &[u8]) -> io::Result<()> {
    channel.seek(SeekFrom::Start(offset))?;
    channel.write_all(buf)
}

const NOT_OPEN: Error = Error::new(ErrorKind::InvalidState, "resource is not open");

/// 缓冲块 I/O 资源
pub struct BufferedIoResource<R, C, H = NoHeader>
where
    R: IoResource,
    C: PayloadConverter,
    H: Header + Clone,
{
    resource: R,
    converter: C,
    cache_kind: CacheKind,
    cache_size: usize,
    bytes_per_block: usize,
    flush_threshold: usize,
    /// 打开时克隆并加载
    header_template: Option<H>,
    header_bytes: u64,
    stats: Option<Statistics>,
    use_count: AtomicUsize,
    state: RwLock<StateOf<R, C, H>>,
}

impl<R, C> BufferedIoResource<R, C, NoHeader>
where
    R: IoResource,
    C: PayloadConverter,
{
    /// 创建构建器
    pub fn builder(resource: R, converter: C) -> Builder<R, C, NoHeader> {
        Builder::new(resource, converter)
    }
}

impl<R, C, H> BufferedIoResource<R, C, H>
where
    R: IoResource,
    C: PayloadConverter,
    H: Header + Clone,
{
    // ===== 访问者与维护接口 =====

    /// 创建访问者
    ///
    /// 使用计数从 0 变为 1 时打开资源。
    ///
    /// # 错误
    ///
    /// `read_only == false` 而物理资源只读时返回 `NoWriteAccess`
    pub fn new_accessor(&self, read_only: bool) -> Result<ReadWriteAccessor<'_, R, C, H>> {
        if !read_only && self.resource.is_read_only() {
            return Err(Error::with_message(
                ErrorKind::NoWriteAccess,
                format!("{} is read-only", self.resource.name()),
            ));
        }
        self.acquire()?;
        self.count(if read_only {
            Counter::ReadAccessor
        } else {
            Counter::WriteAccessor
        });
        Ok(ReadWriteAccessor::new(self, read_only))
    }

    /// 把所有脏块和 header 写回物理资源
    ///
    /// 必须在 begin/end 区间之外调用（同一线程持有区间时调用会死锁）。
    /// 资源未打开时什么都不做。
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.write();
        self.count(Counter::ExclusiveLock);
        if !state.cache.is_open() {
            return Ok(());
        }
        self.flush_locked(&mut state)
    }

    /// 删除物理资源
    ///
    /// # 错误
    ///
    /// 仍有访问者存在时返回 `InvalidState`
    pub fn delete(&self) -> Result<()> {
        let _state = self.state.write();
        self.count(Counter::ExclusiveLock);
        let outstanding = self.use_count.load(Ordering::Acquire);
        if outstanding != 0 {
            return Err(Error::with_message(
                ErrorKind::InvalidState,
                format!("cannot delete {}: {} accessors outstanding", self.resource.name(), outstanding),
            ));
        }
        let name = self.resource.name();
        self.resource
            .delete()
            .map_err(|e| Error::io(format!("delete {}", name), e))?;
        log::debug!("[BUFIO] deleted {}", name);
        Ok(())
    }

    // ===== 查询接口 =====

    /// 底层物理资源
    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// payload 转换器
    pub fn converter(&self) -> &C {
        &self.converter
    }

    /// 缓存策略
    pub fn cache_kind(&self) -> CacheKind {
        self.cache_kind
    }

    /// 缓存容量（块数量）
    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    /// 每块字节数
    pub fn bytes_per_block(&self) -> usize {
        self.bytes_per_block
    }

    /// 触发自动 flush 的脏块数量
    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    /// header 占用的字节数
    pub fn header_bytes(&self) -> u64 {
        self.header_bytes
    }

    /// 当前访问者数量
    pub fn use_count(&self) -> usize {
        self.use_count.load(Ordering::Acquire)
    }

    /// 是否处于打开状态（需要在区间之外调用）
    pub fn is_open(&self) -> bool {
        self.state.read().cache.is_open()
    }

    /// 是否存在未写回的块（需要在区间之外调用）
    pub fn has_locked_blocks(&self) -> bool {
        !self.state.read().dirty.is_empty()
    }

    /// 未写回的块数量（需要在区间之外调用）
    pub fn locked_block_count(&self) -> usize {
        self.state.read().dirty.len()
    }

    /// 块 `id` 在物理资源中的字节偏移
    ///
    /// # 错误
    ///
    /// 块号超过 `MAX_ADDRESSABLE_INDEX`，或块末尾（含 header）超出 `MAX_CHANNEL_SIZE`
    /// 时返回 `InvalidInput`
    pub fn offset(&self, id: BlockId) -> Result<u64> {
        if id as u64 > MAX_ADDRESSABLE_INDEX {
            return Err(Error::with_message(
                ErrorKind::InvalidInput,
                format!("block id {} out of range", id),
            ));
        }
        let bytes_per_block = self.bytes_per_block as u64;
        let end = (id as u64)
            .checked_mul(bytes_per_block)
            .and_then(|start| start.checked_add(bytes_per_block))
            .and_then(|end| end.checked_add(self.header_bytes));
        match end {
            Some(end) if end <= MAX_CHANNEL_SIZE => Ok(end - bytes_per_block),
            _ => Err(Error::with_message(
                ErrorKind::InvalidInput,
                format!("block {} lies beyond the maximum resource size", id),
            )),
        }
    }

    /// 统计信息快照，未启用统计时为 `None`
    pub fn stats(&self) -> Option<StatsSnapshot> {
        self.stats.as_ref().map(Statistics::snapshot)
    }

    /// 清零统计信息
    pub fn reset_stats(&self) {
        if let Some(stats) = &self.stats {
            stats.reset();
        }
    }

    // 内部辅助方法

    pub(crate) fn count(&self, counter: Counter) {
        if let Some(stats) = &self.stats {
            stats.incr(counter);
        }
    }

    /// 增加使用计数，必要时打开资源
    fn acquire(&self) -> Result<()> {
        // 已打开时无需加锁
        if self
            .use_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| (c > 0).then(|| c + 1))
            .is_ok()
        {
            return Ok(());
        }

        let mut state = self.state.write();
        self.count(Counter::ExclusiveLock);
        if self.use_count.load(Ordering::Acquire) == 0 {
            self.open_locked(&mut state)?;
        }
        self.use_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// 减少使用计数，降为 0 时 flush 并关闭
    pub(crate) fn release(&self) -> Result<()> {
        let mut state = self.state.write();
        self.count(Counter::ExclusiveLock);
        let previous = self
            .use_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
            .map_err(|_| Error::new(ErrorKind::InvalidState, "release without a matching accessor"))?;
        if previous == 1 {
            self.close_locked(&mut state)
        } else {
            Ok(())
        }
    }

    fn open_locked(&self, state: &mut StateOf<R, C, H>) -> Result<()> {
        let name = self.resource.name();
        let writable = !self.resource.is_read_only();

        if writable {
            self.resource
                .prepare()
                .map_err(|e| Error::io(format!("prepare {}", name), e))?;
        }
        let opened = if writable {
            self.resource.write_channel()
        } else {
            self.resource.read_channel()
        };
        let channel = opened.map_err(|e| Error::io(format!("open channel on {}", name), e))?;

        state.cache.open(self.cache_size)?;
        state.channel = Some(channel);
        state.buffer = Some(Vec::with_capacity(self.bytes_per_block));
        state.header = self.header_template.clone();

        if let Err(e) = self.read_header(state) {
            self.release_state(state);
            return Err(e);
        }
        log::debug!(
            "[BUFIO] opened {} (cache={:?}/{}, bytes_per_block={}, header_bytes={})",
            name,
            self.cache_kind,
            self.cache_size,
            self.bytes_per_block,
            self.header_bytes
        );
        Ok(())
    }

    fn close_locked(&self, state: &mut StateOf<R, C, H>) -> Result<()> {
        let result = self.flush_locked(state);
        if let Err(e) = &result {
            log::error!(
                "[BUFIO] flush while closing {} failed, dropping {} dirty blocks: {}",
                self.resource.name(),
                state.dirty.len(),
                e
            );
        }
        self.release_state(state);
        log::debug!("[BUFIO] closed {}", self.resource.name());
        result
    }

    fn release_state(&self, state: &mut StateOf<R, C, H>) {
        state.channel = None;
        state.buffer = None;
        state.cache.close();
        state.dirty.clear();
        state.pool.clear();
        state.header = None;
    }

    fn read_header(&self, state: &mut StateOf<R, C, H>) -> Result<()> {
        let Some(header) = state.header.as_mut() else {
            return Ok(());
        };
        let len = self.header_bytes as usize;
        if len == 0 {
            return Ok(());
        }
        let channel = state.channel.as_mut().ok_or(NOT_OPEN)?;
        let name = self.resource.name();

        let mut bytes = vec![0u8; len];
        read_at(channel, 0, &mut bytes)
            .map_err(|e| Error::io(format!("read header of {}", name), e))?;
        header.load(&bytes)
    }

    fn write_header(&self, state: &mut StateOf<R, C, H>) -> Result<()> {
        let Some(header) = state.header.as_ref() else {
            return Ok(());
        };
        let len = self.header_bytes as usize;
        if len == 0 || self.resource.is_read_only() {
            return Ok(());
        }
        let channel = state.channel.as_mut().ok_or(NOT_OPEN)?;
        let name = self.resource.name();

        let mut bytes = vec![0u8; len];
        header.save(&mut bytes)?;
        write_at(channel, 0, &bytes)
            .map_err(|e| Error::io(format!("write header of {}", name), e))
    }

    /// 写回所有脏块，然后写 header
    ///
    /// 每个块写成功后立即从脏集合中移除，中途失败时剩余的块保持脏状态。
    fn flush_locked(&self, state: &mut StateOf<R, C, H>) -> Result<()> {
        let ids: Vec<BlockId> = state.dirty.iter().copied().collect();
        let name = self.resource.name();

        for &id in &ids {
            let offset = self.offset(id)?;
            let block = state.cache.peek_mut(id).ok_or_else(|| {
                Error::with_message(
                    ErrorKind::InvalidState,
                    format!("dirty block {} of {} is missing from the cache", id, name),
                )
            })?;
            let buffer = state.buffer.as_mut().ok_or(NOT_OPEN)?;
            let channel = state.channel.as_mut().ok_or(NOT_OPEN)?;

            buffer.clear();
            self.converter.write(block.payload(), buffer, block.size())?;
            if buffer.len() > self.bytes_per_block {
                return Err(Error::with_message(
                    ErrorKind::InvalidInput,
                    format!(
                        "block {} serialized to {} bytes, more than {} bytes per block",
                        id,
                        buffer.len(),
                        self.bytes_per_block
                    ),
                ));
            }
            write_at(channel, offset, buffer)
                .map_err(|e| Error::io(format!("write block {} of {}", id, name), e))?;

            block.unlock();
            state.dirty.remove(&id);
        }

        self.write_header(state)?;
        if let Some(channel) = state.channel.as_mut() {
            channel
                .flush()
                .map_err(|e| Error::io(format!("flush {}", name), e))?;
        }

        self.count(Counter::Flush);
        log::debug!("[BUFIO] flushed {} blocks to {}", ids.len(), name);
        Ok(())
    }

    /// 脏块数量达到阈值时先 flush
    fn ensure_room(&self, state: &mut StateOf<R, C, H>) -> Result<()> {
        if state.dirty.len() >= self.flush_threshold {
            log::warn!(
                "[BUFIO] {} dirty blocks reached threshold {}, flushing {}",
                state.dirty.len(),
                self.flush_threshold,
                self.resource.name()
            );
            self.flush_locked(state)?;
        }
        Ok(())
    }

    /// 把块 `id` 载入缓存（调用者持有独占锁）
    ///
    /// # 返回
    ///
    /// 块是否已在缓存中。块位于资源末尾之后且 `create == false` 时返回 false，
    /// `create == true` 时插入一个空的新块。
    pub(crate) fn load_block(
        &self,
        state: &mut StateOf<R, C, H>,
        id: BlockId,
        create: bool,
    ) -> Result<bool> {
        let offset = self.offset(id)?;
        let name = self.resource.name();
        let size = self
            .resource
            .size()
            .map_err(|e| Error::io(format!("query size of {}", name), e))?;
        let exists = offset < size;
        if !exists && !create {
            log::trace!("[BUFIO] block {} of {} not written yet", id, name);
            return Ok(false);
        }

        self.ensure_room(state)?;

        let mut block = state.pool.checkout(&self.converter, self.bytes_per_block);
        if exists {
            let buffer = state.buffer.as_mut().ok_or(NOT_OPEN)?;
            let channel = state.channel.as_mut().ok_or(NOT_OPEN)?;
            buffer.clear();
            buffer.resize(self.bytes_per_block, 0);
            let read = read_at(channel, offset, buffer)
                .map_err(|e| Error::io(format!("read block {} of {}", id, name), e))?;
            let units = self.converter.read(block.payload_mut(), &buffer[..read])?;
            block.set_size(units);
        } else {
            block.mark_new();
        }
        block.bind(id);

        log::debug!(
            "[BUFIO] loaded block {} of {} (size={}, new={})",
            id,
            name,
            block.size(),
            block.is_new()
        );
        if let Some(evicted) = state.cache.add_block(block)? {
            state.pool.recycle(evicted);
        }
        Ok(true)
    }

    /// 标记块为脏并扩展其逻辑大小（调用者持有独占锁）
    ///
    /// 块不在缓存中时先载入。新标记之前，如果脏块数量达到阈值则先 flush。
    pub(crate) fn lock_block_locked(
        &self,
        state: &mut StateOf<R, C, H>,
        id: BlockId,
        size: usize,
    ) -> Result<()> {
        if !state.cache.contains(id) {
            self.count(Counter::Miss);
            self.load_block(state, id, true)?;
        }

        let already_locked = state.cache.peek(id).is_some_and(Block::is_locked);
        if !already_locked {
            self.ensure_room(state)?;
        }

        let block = state.cache.peek_mut(id).ok_or_else(|| {
            Error::with_message(ErrorKind::InvalidState, format!("block {} vanished from the cache", id))
        })?;
        block.grow_size(size);
        block.lock();
        state.dirty.insert(id);
        self.count(Counter::DirtyMark);
        log::trace!("[BUFIO] locked block {} (size={}, dirty={})", id, block.size(), state.dirty.len());
        Ok(())
    }
}

impl<R, C, H> core::fmt::Debug for BufferedIoResource<R, C, H>
where
    R: IoResource,
    C: PayloadConverter,
    H: Header + Clone,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferedIoResource")
            .field("resource", &self.resource.name())
            .field("cache_kind", &self.cache_kind)
            .field("cache_size", &self.cache_size)
            .field("bytes_per_block", &self.bytes_per_block)
            .field("header_bytes", &self.header_bytes)
            .field("use_count", &self.use_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::IntArrayConverter;
    use crate::header::SimpleHeader;
    use crate::resource::{FileResource, MemoryResource};
    use byteorder::{ByteOrder, LittleEndian};

    const BPB: usize = 64;

    fn int_resource(
        mem: &MemoryResource,
        kind: CacheKind,
        cache_size: usize,
    ) -> BufferedIoResource<MemoryResource, IntArrayConverter> {
        BufferedIoResource::builder(mem.clone(), IntArrayConverter)
            .cache_kind(kind)
            .cache_size(cache_size)
            .bytes_per_block(BPB)
            .collect_stats(true)
            .build()
            .unwrap()
    }

    /// 写入 `count` 个块，块 i 的第一个值为 i
    fn fill<R: IoResource, H: Header + Clone>(
        resource: &BufferedIoResource<R, IntArrayConverter, H>,
        count: u32,
    ) {
        let mut writer = resource.new_accessor(false).unwrap();
        let mut scope = writer.begin();
        for id in 0..count {
            scope.get_block_mut(id).unwrap().payload_mut()[0] = id as i32;
            scope.lock_block(id, 1).unwrap();
        }
        scope.end();
        writer.close().unwrap();
    }

    fn first_value<R: IoResource, H: Header + Clone>(
        resource: &BufferedIoResource<R, IntArrayConverter, H>,
        id: BlockId,
    ) -> Option<i32> {
        let mut reader = resource.new_accessor(true).unwrap();
        let mut scope = reader.begin();
        let value = scope
            .get_block(id)
            .unwrap()
            .filter(|b| b.size() > 0)
            .map(|b| b.payload()[0]);
        scope.end();
        reader.close().unwrap();
        value
    }

    #[test]
    fn test_write_close_reopen() {
        let mem = MemoryResource::new("mem");
        let resource = int_resource(&mem, CacheKind::Lru, 8);
        {
            let mut writer = resource.new_accessor(false).unwrap();
            let mut scope = writer.begin();
            let block = scope.get_block_mut(3).unwrap();
            assert!(block.is_new());
            block.payload_mut()[..3].copy_from_slice(&[1, 2, 3]);
            scope.lock_block(3, 3).unwrap();
            scope.end();
            writer.close().unwrap();
        }
        assert!(!resource.is_open());

        let bytes = mem.bytes();
        assert_eq!(LittleEndian::read_u32(&bytes[3 * BPB..]), 3);
        assert_eq!(LittleEndian::read_i32(&bytes[3 * BPB + 8..]), 2);

        let reopened = int_resource(&mem, CacheKind::Lru, 8);
        let mut reader = reopened.new_accessor(true).unwrap();
        let mut scope = reader.begin();
        let block = scope.get_block(3).unwrap().unwrap();
        assert_eq!(block.size(), 3);
        assert!(!block.is_new());
        assert_eq!(&block.payload()[..3], &[1, 2, 3]);

        // 中间未写过的块存在但为空
        assert_eq!(scope.get_block(1).unwrap().unwrap().size(), 0);
        // 末尾之后的块不存在
        assert!(scope.get_block(4).unwrap().is_none());
        assert_eq!(scope.cached_block_count(), 2);
    }

    #[test]
    fn test_repeated_lookup_yields_same_block() {
        let mem = MemoryResource::new("mem");
        let resource = int_resource(&mem, CacheKind::Mru, 4);
        fill(&resource, 2);

        let mut reader = resource.new_accessor(true).unwrap();
        let mut scope = reader.begin();
        let first: *const Block<Vec<i32>> = scope.get_block(1).unwrap().unwrap();
        scope.get_block(0).unwrap();
        let second: *const Block<Vec<i32>> = scope.get_block(1).unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_read_only_resource_rejects_writer() {
        let mem = MemoryResource::from_bytes("mem", vec![0; BPB]);
        let resource = BufferedIoResource::builder(mem.to_read_only(), IntArrayConverter)
            .bytes_per_block(BPB)
            .cache_size(4)
            .build()
            .unwrap();

        let err = resource.new_accessor(false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoWriteAccess);
        assert_eq!(resource.use_count(), 0);

        let reader = resource.new_accessor(true).unwrap();
        assert!(reader.is_read_only());
        assert!(resource.is_open());
        reader.close().unwrap();
    }

    #[test]
    fn test_read_scope_cannot_modify() {
        let mem = MemoryResource::new("mem");
        let resource = int_resource(&mem, CacheKind::Lru, 4);
        fill(&resource, 1);

        let mut reader = resource.new_accessor(true).unwrap();
        let mut scope = reader.begin();
        assert_eq!(scope.get_block_mut(0).unwrap_err().kind(), ErrorKind::NoWriteAccess);
        assert_eq!(scope.lock_block(0, 1).unwrap_err().kind(), ErrorKind::NoWriteAccess);
        assert_eq!(scope.header_mut().unwrap_err().kind(), ErrorKind::NoWriteAccess);
        assert!(!scope.has_locked_blocks());
    }

    #[test]
    fn test_lock_only_grows_size() {
        let mem = MemoryResource::new("mem");
        let resource = int_resource(&mem, CacheKind::Lru, 4);
        let mut writer = resource.new_accessor(false).unwrap();
        let mut scope = writer.begin();

        scope.lock_block(0, 5).unwrap();
        scope.lock_block(0, 2).unwrap();
        let block = scope.get_block(0).unwrap().unwrap();
        assert_eq!(block.size(), 5);
        assert!(block.is_locked());
        assert_eq!(scope.locked_block_count(), 1);
    }

    #[test]
    fn test_auto_flush_when_dirty_blocks_fill_cache() {
        let mem = MemoryResource::new("mem");
        let resource = int_resource(&mem, CacheKind::Lru, 32);
        let mut writer = resource.new_accessor(false).unwrap();
        {
            let mut scope = writer.begin();
            for id in 0..32 {
                scope.get_block_mut(id).unwrap().payload_mut()[0] = id as i32;
                scope.lock_block(id, 1).unwrap();
            }
            assert_eq!(scope.locked_block_count(), 32);
            assert!(mem.bytes().is_empty());

            scope.get_block_mut(32).unwrap().payload_mut()[0] = 32;
            scope.lock_block(32, 1).unwrap();
            assert_eq!(scope.locked_block_count(), 1);
            assert_eq!(scope.cached_block_count(), 32);
            assert!(scope.get_block(32).unwrap().unwrap().is_locked());
        }
        assert_eq!(resource.stats().unwrap().flushes, 1);

        let bytes = mem.bytes();
        for id in 0..32usize {
            assert_eq!(LittleEndian::read_u32(&bytes[id * BPB..]), 1);
            assert_eq!(LittleEndian::read_i32(&bytes[id * BPB + 4..]), id as i32);
        }
        writer.close().unwrap();

        let reopened = int_resource(&mem, CacheKind::Lru, 32);
        for id in 0..=32 {
            assert_eq!(first_value(&reopened, id), Some(id as i32));
        }
    }

    #[test]
    fn test_lower_flush_threshold() {
        let mem = MemoryResource::new("mem");
        let resource = BufferedIoResource::builder(mem.clone(), IntArrayConverter)
            .cache_size(8)
            .bytes_per_block(BPB)
            .flush_threshold(4)
            .collect_stats(true)
            .build()
            .unwrap();
        let mut writer = resource.new_accessor(false).unwrap();
        let mut scope = writer.begin();
        for id in 0..5 {
            scope.lock_block(id, 1).unwrap();
        }
        assert_eq!(scope.locked_block_count(), 1);
        scope.end();
        assert_eq!(resource.stats().unwrap().flushes, 1);
    }

    #[test]
    fn test_explicit_flush_unlocks() {
        let mem = MemoryResource::new("mem");
        let resource = int_resource(&mem, CacheKind::Lru, 4);
        let mut writer = resource.new_accessor(false).unwrap();
        {
            let mut scope = writer.begin();
            for id in [1, 2, 0] {
                scope.get_block_mut(id).unwrap().payload_mut()[0] = 10 + id as i32;
                scope.lock_block(id, 1).unwrap();
            }
            assert_eq!(scope.locked_block_count(), 3);
        }
        assert!(resource.has_locked_blocks());
        resource.flush().unwrap();
        assert!(!resource.has_locked_blocks());
        assert_eq!(resource.locked_block_count(), 0);

        let bytes = mem.bytes();
        let mut scope = writer.begin();
        for id in 0..3usize {
            assert_eq!(LittleEndian::read_i32(&bytes[id * BPB + 4..]), 10 + id as i32);
            let block = scope.get_block(id as BlockId).unwrap().unwrap();
            assert!(!block.is_locked(), "block {} still locked", id);
        }
    }

    #[test]
    fn test_flush_when_closed_is_noop() {
        let mem = MemoryResource::new("mem");
        let resource = int_resource(&mem, CacheKind::Lru, 4);
        resource.flush().unwrap();
        assert!(mem.bytes().is_empty());
    }

    #[test]
    fn test_missing_dirty_block_fails_flush_and_close() {
        let mem = MemoryResource::new("mem");
        let resource = int_resource(&mem, CacheKind::Lru, 4);
        let mut writer = resource.new_accessor(false).unwrap();
        {
            let mut scope = writer.begin();
            scope.get_block_mut(2).unwrap().payload_mut()[0] = 22;
            scope.lock_block(2, 1).unwrap();
        }
        resource.state.write().dirty.insert(7);

        // 写回失败时已写出的块移出脏集合，剩余的保持脏状态
        assert_eq!(resource.flush().unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(resource.locked_block_count(), 1);
        assert!(resource.state.read().dirty.contains(&7));
        assert_eq!(LittleEndian::read_i32(&mem.bytes()[2 * BPB + 4..]), 22);

        // 关闭时仍然释放状态，剩余脏块被丢弃
        assert_eq!(writer.close().unwrap_err().kind(), ErrorKind::InvalidState);
        assert!(!resource.is_open());
        assert_eq!(resource.locked_block_count(), 0);
        assert_eq!(resource.use_count(), 0);
    }

    #[test]
    fn test_header_persists_across_reopen() {
        let mem = MemoryResource::new("mem");
        let resource = BufferedIoResource::builder(mem.clone(), IntArrayConverter)
            .cache_size(4)
            .bytes_per_block(BPB)
            .header(SimpleHeader::new())
            .build()
            .unwrap();
        assert_eq!(resource.offset(0).unwrap(), 64);
        assert_eq!(resource.offset(2).unwrap(), 64 + 2 * BPB as u64);

        {
            let mut writer = resource.new_accessor(false).unwrap();
            let mut scope = writer.begin();
            let header = scope.header_mut().unwrap().unwrap();
            header.grow_size(5);
            header.update_used_index(3);
            header.update_target_index(9);
            scope.get_block_mut(0).unwrap().payload_mut()[0] = 77;
            scope.lock_block(0, 1).unwrap();
        }
        assert!(!resource.is_open());
        assert_eq!(LittleEndian::read_i32(&mem.bytes()[64 + 4..]), 77);

        let reopened = BufferedIoResource::builder(mem.clone(), IntArrayConverter)
            .cache_size(4)
            .bytes_per_block(BPB)
            .header(SimpleHeader::new())
            .build()
            .unwrap();
        let mut reader = reopened.new_accessor(true).unwrap();
        let mut scope = reader.begin();
        let header = scope.header().unwrap();
        assert_eq!(header.size(), 5);
        assert_eq!(header.used_index().max(), Some(3));
        assert_eq!(header.target_index().min(), Some(9));
        assert_eq!(scope.get_block(0).unwrap().unwrap().payload()[0], 77);
    }

    #[test]
    fn test_corrupted_header_fails_open() {
        let mut bytes = vec![0xFF; 64];
        bytes[0] = crate::consts::SIMPLE_HEADER_VERSION;
        let mem = MemoryResource::from_bytes("mem", bytes);
        let resource = BufferedIoResource::builder(mem, IntArrayConverter)
            .cache_size(4)
            .bytes_per_block(BPB)
            .header(SimpleHeader::new())
            .build()
            .unwrap();
        let err = resource.new_accessor(true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupted);
        assert!(!resource.is_open());
        assert_eq!(resource.use_count(), 0);
    }

    #[test]
    fn test_use_count_lifecycle() {
        let mem = MemoryResource::new("mem");
        let resource = int_resource(&mem, CacheKind::Lru, 4);

        let first = resource.new_accessor(false).unwrap();
        let second = resource.new_accessor(true).unwrap();
        assert!(std::ptr::eq(first.resource(), second.resource()));
        assert!(std::ptr::eq(first.resource(), &resource));
        assert_eq!(resource.use_count(), 2);
        assert!(resource.is_open());

        drop(second);
        assert_eq!(resource.use_count(), 1);
        assert!(resource.is_open());

        first.close().unwrap();
        assert_eq!(resource.use_count(), 0);
        assert!(!resource.is_open());

        let stats = resource.stats().unwrap();
        assert_eq!(stats.read_accessors, 1);
        assert_eq!(stats.write_accessors, 1);
    }

    #[test]
    fn test_delete_requires_no_accessors() {
        let mem = MemoryResource::new("mem");
        let resource = int_resource(&mem, CacheKind::Lru, 4);
        fill(&resource, 2);

        let reader = resource.new_accessor(true).unwrap();
        assert_eq!(resource.delete().unwrap_err().kind(), ErrorKind::InvalidState);
        reader.close().unwrap();

        resource.delete().unwrap();
        assert!(mem.bytes().is_empty());
        assert_eq!(first_value(&resource, 0), None);
    }

    #[test]
    fn test_block_id_bounds() {
        let mem = MemoryResource::new("mem");
        let resource = BufferedIoResource::builder(mem, IntArrayConverter)
            .cache_size(4)
            .build()
            .unwrap();
        let last = (MAX_CHANNEL_SIZE / resource.bytes_per_block() as u64) as BlockId - 1;
        assert!(resource.offset(last).is_ok());
        assert_eq!(resource.offset(last + 1).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(resource.offset(u32::MAX).unwrap_err().kind(), ErrorKind::InvalidInput);

        let mut writer = resource.new_accessor(false).unwrap();
        let mut scope = writer.begin();
        assert_eq!(scope.get_block_mut(u32::MAX).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(scope.lock_block(last + 1, 1).unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_huge_blocks_do_not_overflow_offset() {
        let mem = MemoryResource::new("mem");
        let resource = BufferedIoResource::builder(mem, IntArrayConverter)
            .cache_size(4)
            .bytes_per_block(1 << 33)
            .build()
            .unwrap();
        assert_eq!(resource.offset(3).unwrap(), 3 << 33);
        assert_eq!(resource.offset(4).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(
            resource.offset(MAX_ADDRESSABLE_INDEX as BlockId).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_header_counts_toward_size_limit() {
        let mem = MemoryResource::new("mem");
        let resource = BufferedIoResource::builder(mem, IntArrayConverter)
            .cache_size(4)
            .header(SimpleHeader::new())
            .build()
            .unwrap();
        let per_block = resource.bytes_per_block() as u64;
        let last = (MAX_CHANNEL_SIZE / per_block) as BlockId - 1;

        // 最后一个整块加上 header 会超出上限
        assert_eq!(resource.offset(last).unwrap_err().kind(), ErrorKind::InvalidInput);
        let offset = resource.offset(last - 1).unwrap();
        assert!(offset + per_block <= MAX_CHANNEL_SIZE);
        assert_eq!(offset, (last as u64 - 1) * per_block + resource.header_bytes());
    }

    #[test]
    fn test_every_cache_kind_roundtrips() {
        for kind in [CacheKind::Unlimited, CacheKind::Lru, CacheKind::Mru] {
            let mem = MemoryResource::new("mem");
            let resource = int_resource(&mem, kind, 4);
            fill(&resource, 10);

            let mut reader = resource.new_accessor(true).unwrap();
            let mut scope = reader.begin();
            for id in (0..10).rev().chain(0..10) {
                let block = scope.get_block(id).unwrap().unwrap();
                assert_eq!(block.payload()[0], id as i32, "{:?} block {}", kind, id);
            }
            if kind == CacheKind::Unlimited {
                assert_eq!(scope.cached_block_count(), 10);
            } else {
                assert_eq!(scope.cached_block_count(), 4);
            }
        }
    }

    #[test]
    fn test_lookup_statistics() {
        let mem = MemoryResource::new("mem");
        let resource = int_resource(&mem, CacheKind::Lru, 4);
        fill(&resource, 1);
        resource.reset_stats();

        let mut reader = resource.new_accessor(true).unwrap();
        {
            let mut scope = reader.begin();
            scope.get_block(0).unwrap();
            scope.get_block(0).unwrap();
        }
        reader.close().unwrap();

        let stats = resource.stats().unwrap();
        assert_eq!(stats.lookups, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.last_block_hits, 1);
        assert_eq!(stats.shared_locks, 1);
        assert_eq!(stats.read_accessors, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_concurrent_readers() {
        let mem = MemoryResource::new("mem");
        fill(&int_resource(&mem, CacheKind::Lru, 4), 16);

        let resource = int_resource(&mem, CacheKind::Lru, 4);
        std::thread::scope(|s| {
            for t in 0..4u32 {
                let resource = &resource;
                s.spawn(move || {
                    let mut reader = resource.new_accessor(true).unwrap();
                    for round in 0..20u32 {
                        let mut scope = reader.begin();
                        let id = (round * 7 + t) % 16;
                        let block = scope.get_block(id).unwrap().unwrap();
                        assert_eq!(block.payload()[0], id as i32);
                    }
                    reader.close().unwrap();
                });
            }
        });
        assert_eq!(resource.use_count(), 0);
        assert!(!resource.is_open());
    }

    #[test]
    fn test_file_resource() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("blocks.bin");

        let resource = BufferedIoResource::builder(FileResource::new(&path), IntArrayConverter)
            .cache_size(4)
            .bytes_per_block(BPB)
            .header(SimpleHeader::new())
            .build()
            .unwrap();
        fill(&resource, 6);
        assert!(path.exists());

        let reopened = BufferedIoResource::builder(FileResource::read_only(&path), IntArrayConverter)
            .cache_size(4)
            .bytes_per_block(BPB)
            .header(SimpleHeader::new())
            .build()
            .unwrap();
        for id in 0..6 {
            assert_eq!(first_value(&reopened, id), Some(id as i32));
        }
        assert_eq!(first_value(&reopened, 6), None);
    }
}
