//! blockio_core: 块缓存支撑的缓冲 I/O 资源
//!
//! 把一个物理资源（文件、内存）切分为固定大小的逻辑块，由内存中的块缓存
//! 支撑随机访问，提供：
//! - **多读单写**的访问区间（读写锁，未命中时升级并降级）
//! - **LRU / MRU / 无界**三种块缓存
//! - **脏块锁定**：修改过的块在写回前不会被驱逐
//! - **自动 flush**：脏块达到阈值时写回
//! - 可选的**资源头部**（版本、条目计数、索引区间、CRC32 校验）
//!
//! # 示例
//!
//! ```rust,ignore
//! use blockio_core::{BufferedIoResource, CacheKind, IntArrayConverter, MemoryResource, Result};
//!
//! fn main() -> Result<()> {
//!     let resource = BufferedIoResource::builder(MemoryResource::new("mem"), IntArrayConverter)
//!         .cache_kind(CacheKind::Lru)
//!         .cache_size(32)
//!         .bytes_per_block(64)
//!         .build()?;
//!
//!     let mut reader = resource.new_accessor(true)?;
//!     let mut scope = reader.begin();
//!     if let Some(block) = scope.get_block(0)? {
//!         println!("block 0 holds {} values", block.size());
//!     }
//!     scope.end();
//!     reader.close()
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`consts`] - 常量定义
//! - [`range`] - 索引区间
//! - [`block`] - 块、payload 转换器、payload 回收池
//! - [`cache`] - 块缓存
//! - [`header`] - 资源头部
//! - [`resource`] - 物理资源抽象
//! - [`buffered`] - 缓冲 I/O 资源与访问者

#![deny(unsafe_code)]
#![warn(missing_docs)]

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// 索引区间
pub mod range;

/// 块与 payload
pub mod block;

/// 块缓存
pub mod cache;

/// 资源头部
pub mod header;

/// 物理资源
pub mod resource;

/// 缓冲 I/O 资源
pub mod buffered;

/// CRC32 校验和计算
pub(crate) mod crc;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 块
pub use block::{Block, BlockFlags, BlockId, BytesConverter, IntArrayConverter, PayloadConverter};

// 缓存
pub use cache::{BlockCache, CacheKind, EvictionPolicy, RuBlockCache, UnlimitedBlockCache};

// 头部
pub use header::{Header, NoHeader, SimpleHeader};

// 区间
pub use range::Range;

// 物理资源
pub use resource::{FileResource, IoResource, MemoryResource};

// 缓冲资源
pub use buffered::{AccessScope, BufferedIoResource, Builder, ReadWriteAccessor, StatsSnapshot};
