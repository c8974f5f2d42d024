//! 常量定义
//!
//! 这个模块包含了缓冲块 I/O 的所有常量定义，包括：
//! - 物理资源布局相关常量
//! - 缓存相关常量
//! - Header 相关常量

//=============================================================================
// 物理布局
//=============================================================================

/// 物理资源的最大字节数（32 GiB）
///
/// 保证 `id * bytes_per_block` 不会溢出 64 位偏移。
pub const MAX_CHANNEL_SIZE: u64 = 32 * 1024 * 1024 * 1024;

/// 最大可寻址块号
pub const MAX_ADDRESSABLE_INDEX: u64 = i32::MAX as u64;

/// 最小块大小（字节）
pub const MIN_BLOCK_SIZE: usize = (MAX_CHANNEL_SIZE / MAX_ADDRESSABLE_INDEX) as usize;

/// 默认块大小（字节）
pub const DEFAULT_BYTES_PER_BLOCK: usize = 4096;

//=============================================================================
// 缓存
//=============================================================================

/// 默认缓存块数量
pub const DEFAULT_CACHE_SIZE: usize = 256;

/// 有界缓存的最小容量
pub const MIN_CAPACITY: usize = 2;

/// 哈希桶负载因子
pub const LOAD_FACTOR: f64 = 0.75;

/// 初始哈希桶数量（必须是 2 的幂）
pub const INITIAL_BUCKETS: usize = 16;

/// 回收池中保留的空闲 payload 数量上限
pub const SPARE_PAYLOADS: usize = 4;

//=============================================================================
// Header
//=============================================================================

/// SimpleHeader 支持的最高版本
pub const SIMPLE_HEADER_VERSION: u8 = 1;

/// SimpleHeader 预留的字节数（大于实际需要，留作向前兼容）
pub const SIMPLE_HEADER_SIZE: usize = 64;

/// Range 未设置时的序列化哨兵值
pub const RANGE_UNSET: i64 = i64::MIN;
