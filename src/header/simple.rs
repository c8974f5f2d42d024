//! 简单头部：版本号 + 条目计数 + 两个索引区间
//!
//! # 字节布局（小端）
//!
//! | 偏移      | 长度 | 内容                               |
//! |-----------|------|------------------------------------|
//! | 0         | 1    | 版本号                             |
//! | 1         | 8    | 条目总数                           |
//! | 9         | 32   | used.min, used.max, target.min, target.max |
//! | 41        | 4    | 字节 0..41 的 CRC32                |
//! | 45        | 19   | 预留（全 0）                       |

use super::Header;
use crate::consts::{SIMPLE_HEADER_SIZE, SIMPLE_HEADER_VERSION};
use crate::crc;
use crate::error::{Error, ErrorKind, Result};
use crate::range::Range;
use byteorder::{ByteOrder, LittleEndian};

const VERSION_OFFSET: usize = 0;
const ENTRIES_OFFSET: usize = 1;
const RANGES_OFFSET: usize = 9;
const CRC_OFFSET: usize = 41;
const USED_END: usize = CRC_OFFSET + 4;

/// 简单头部
///
/// 修改方法只改变内存中的状态，持久化需要显式 flush。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleHeader {
    version: u8,
    entries: u64,
    used: Range,
    target: Range,
}

impl Default for SimpleHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl SimpleHeader {
    /// 创建空头部
    pub const fn new() -> Self {
        Self {
            version: SIMPLE_HEADER_VERSION,
            entries: 0,
            used: Range::new(),
            target: Range::new(),
        }
    }

    /// 最近一次加载到的版本号
    pub fn version(&self) -> u8 {
        self.version
    }

    /// 条目总数
    pub fn size(&self) -> u64 {
        self.entries
    }

    /// 增加条目总数
    pub fn grow_size(&mut self, delta: u64) {
        self.entries = self.entries.saturating_add(delta);
    }

    /// 已使用的源索引区间
    pub fn used_index(&self) -> &Range {
        &self.used
    }

    /// 目标索引区间
    pub fn target_index(&self) -> &Range {
        &self.target
    }

    /// 扩展源索引区间
    pub fn update_used_index(&mut self, index: i64) {
        self.used.update(index);
    }

    /// 扩展目标索引区间
    pub fn update_target_index(&mut self, index: i64) {
        self.target.update(index);
    }
}

impl Header for SimpleHeader {
    fn size_in_bytes(&self) -> usize {
        SIMPLE_HEADER_SIZE
    }

    fn load(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() < USED_END {
            return Err(Error::new(ErrorKind::InvalidInput, "header slice too small"));
        }

        // 新建的资源：头部区域全 0
        if bytes[..USED_END].iter().all(|b| *b == 0) {
            log::debug!("[HEADER] empty header region, using defaults");
            *self = Self::new();
            return Ok(());
        }

        let version = bytes[VERSION_OFFSET];
        let newer = version > SIMPLE_HEADER_VERSION;
        if newer {
            log::warn!(
                "[HEADER] stored version {} is newer than supported version {}, loading anyway",
                version,
                SIMPLE_HEADER_VERSION
            );
        }

        let stored_crc = LittleEndian::read_u32(&bytes[CRC_OFFSET..USED_END]);
        if !crc::verify(&bytes[..CRC_OFFSET], stored_crc) {
            if !newer {
                return Err(Error::new(ErrorKind::Corrupted, "header checksum mismatch"));
            }
            log::warn!("[HEADER] checksum mismatch on newer header version {}", version);
        }

        let mut raw = [0i64; 4];
        LittleEndian::read_i64_into(&bytes[RANGES_OFFSET..CRC_OFFSET], &mut raw);

        self.version = version;
        self.entries = LittleEndian::read_u64(&bytes[ENTRIES_OFFSET..RANGES_OFFSET]);
        self.used = Range::from_raw(raw[0], raw[1]);
        self.target = Range::from_raw(raw[2], raw[3]);
        log::debug!(
            "[HEADER] loaded version={} entries={} used={:?} target={:?}",
            self.version,
            self.entries,
            self.used,
            self.target
        );
        Ok(())
    }

    fn save(&self, bytes: &mut [u8]) -> Result<()> {
        if bytes.len() < USED_END {
            return Err(Error::new(ErrorKind::InvalidInput, "header slice too small"));
        }

        let (used_min, used_max) = self.used.to_raw();
        let (target_min, target_max) = self.target.to_raw();

        bytes[VERSION_OFFSET] = SIMPLE_HEADER_VERSION;
        LittleEndian::write_u64(&mut bytes[ENTRIES_OFFSET..RANGES_OFFSET], self.entries);
        LittleEndian::write_i64_into(
            &[used_min, used_max, target_min, target_max],
            &mut bytes[RANGES_OFFSET..CRC_OFFSET],
        );
        let checksum = crc::crc32(&bytes[..CRC_OFFSET]);
        LittleEndian::write_u32(&mut bytes[CRC_OFFSET..USED_END], checksum);
        Ok(())
    }
}
