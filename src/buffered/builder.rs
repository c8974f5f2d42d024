//! 资源构建器

use super::stats::Statistics;
use super::{BufferedIoResource, State};
use crate::block::{BlockPool, PayloadConverter};
use crate::cache::CacheKind;
use crate::consts::{DEFAULT_BYTES_PER_BLOCK, DEFAULT_CACHE_SIZE, MAX_CHANNEL_SIZE, MIN_BLOCK_SIZE, SPARE_PAYLOADS};
use crate::error::{Error, ErrorKind, Result};
use crate::header::{Header, NoHeader};
use crate::resource::IoResource;
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::atomic::AtomicUsize;

/// [`BufferedIoResource`] 构建器
///
/// 缓存策略和容量、块大小、header 在构建后都不可修改。
pub struct Builder<R, C, H = NoHeader> {
    resource: R,
    converter: C,
    cache_kind: CacheKind,
    cache_size: usize,
    bytes_per_block: usize,
    header: Option<H>,
    collect_stats: bool,
    flush_threshold: Option<usize>,
}

impl<R, C> Builder<R, C, NoHeader>
where
    R: IoResource,
    C: PayloadConverter,
{
    pub(crate) fn new(resource: R, converter: C) -> Self {
        Self {
            resource,
            converter,
            cache_kind: CacheKind::default(),
            cache_size: DEFAULT_CACHE_SIZE,
            bytes_per_block: DEFAULT_BYTES_PER_BLOCK,
            header: None,
            collect_stats: false,
            flush_threshold: None,
        }
    }
}

impl<R, C, H> Builder<R, C, H>
where
    R: IoResource,
    C: PayloadConverter,
    H: Header + Clone,
{
    /// 缓存策略，默认 LRU
    pub fn cache_kind(mut self, kind: CacheKind) -> Self {
        self.cache_kind = kind;
        self
    }

    /// 缓存容量（块数量）
    pub fn cache_size(mut self, size: usize) -> Self {
        self.cache_size = size;
        self
    }

    /// 每块字节数
    pub fn bytes_per_block(mut self, bytes: usize) -> Self {
        self.bytes_per_block = bytes;
        self
    }

    /// 启用统计
    pub fn collect_stats(mut self, enabled: bool) -> Self {
        self.collect_stats = enabled;
        self
    }

    /// 脏块数量达到该值时自动 flush，默认等于缓存容量
    pub fn flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = Some(threshold);
        self
    }

    /// 在块区域之前放置 header
    pub fn header<H2: Header + Clone>(self, header: H2) -> Builder<R, C, H2> {
        Builder {
            resource: self.resource,
            converter: self.converter,
            cache_kind: self.cache_kind,
            cache_size: self.cache_size,
            bytes_per_block: self.bytes_per_block,
            header: Some(header),
            collect_stats: self.collect_stats,
            flush_threshold: self.flush_threshold,
        }
    }

    /// 校验配置并创建（未打开的）资源
    ///
    /// # 错误
    ///
    /// 任一参数越界时返回 `InvalidInput`
    pub fn build(self) -> Result<BufferedIoResource<R, C, H>> {
        let min_capacity = self.cache_kind.min_capacity();
        if self.cache_size < min_capacity {
            return Err(Error::with_message(
                ErrorKind::InvalidInput,
                format!(
                    "cache size {} is below the minimum {} for {:?}",
                    self.cache_size, min_capacity, self.cache_kind
                ),
            ));
        }
        if self.bytes_per_block < MIN_BLOCK_SIZE || self.bytes_per_block as u64 > MAX_CHANNEL_SIZE {
            return Err(Error::with_message(
                ErrorKind::InvalidInput,
                format!("invalid bytes per block: {}", self.bytes_per_block),
            ));
        }
        let flush_threshold = self.flush_threshold.unwrap_or(self.cache_size);
        if flush_threshold == 0 || flush_threshold > self.cache_size {
            return Err(Error::with_message(
                ErrorKind::InvalidInput,
                format!(
                    "flush threshold {} must lie in 1..={}",
                    flush_threshold, self.cache_size
                ),
            ));
        }

        let header_bytes = self
            .header
            .as_ref()
            .map_or(0, |h| h.size_in_bytes() as u64);

        log::debug!(
            "[BUFIO] built resource over {} (cache={:?}/{}, bytes_per_block={}, flush_threshold={})",
            self.resource.name(),
            self.cache_kind,
            self.cache_size,
            self.bytes_per_block,
            flush_threshold
        );

        Ok(BufferedIoResource {
            state: RwLock::new(State {
                channel: None,
                buffer: None,
                cache: self.cache_kind.create(),
                dirty: BTreeSet::new(),
                pool: BlockPool::new(SPARE_PAYLOADS),
                header: None,
            }),
            resource: self.resource,
            converter: self.converter,
            cache_kind: self.cache_kind,
            cache_size: self.cache_size,
            bytes_per_block: self.bytes_per_block,
            flush_threshold,
            header_template: self.header,
            header_bytes,
            stats: self.collect_stats.then(Statistics::default),
            use_count: AtomicUsize::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::block::IntArrayConverter;
    use crate::buffered::BufferedIoResource;
    use crate::cache::CacheKind;
    use crate::consts::{DEFAULT_BYTES_PER_BLOCK, DEFAULT_CACHE_SIZE, SIMPLE_HEADER_SIZE};
    use crate::error::ErrorKind;
    use crate::header::SimpleHeader;
    use crate::resource::MemoryResource;

    fn builder() -> super::Builder<MemoryResource, IntArrayConverter> {
        BufferedIoResource::builder(MemoryResource::new("mem"), IntArrayConverter)
    }

    #[test]
    fn test_defaults() {
        let resource = builder().build().unwrap();
        assert_eq!(resource.cache_kind(), CacheKind::Lru);
        assert_eq!(resource.cache_size(), DEFAULT_CACHE_SIZE);
        assert_eq!(resource.bytes_per_block(), DEFAULT_BYTES_PER_BLOCK);
        assert_eq!(resource.flush_threshold(), DEFAULT_CACHE_SIZE);
        assert_eq!(resource.header_bytes(), 0);
        assert!(resource.stats().is_none());
        assert!(!resource.is_open());
    }

    #[test]
    fn test_header_reserves_space() {
        let resource = builder().header(SimpleHeader::new()).build().unwrap();
        assert_eq!(resource.header_bytes(), SIMPLE_HEADER_SIZE as u64);
    }

    #[test]
    fn test_rejects_bad_config() {
        let cases = [
            builder().cache_size(0).build().unwrap_err(),
            builder().cache_size(1).build().unwrap_err(),
            builder().bytes_per_block(0).build().unwrap_err(),
            builder().cache_size(8).flush_threshold(9).build().unwrap_err(),
            builder().cache_size(8).flush_threshold(0).build().unwrap_err(),
        ];
        for err in cases {
            assert_eq!(err.kind(), ErrorKind::InvalidInput);
        }
    }

    #[test]
    fn test_unlimited_accepts_single_block_capacity() {
        let resource = builder()
            .cache_kind(CacheKind::Unlimited)
            .cache_size(1)
            .build()
            .unwrap();
        assert_eq!(resource.cache_size(), 1);
    }
}
