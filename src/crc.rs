//! CRC32 校验和计算
//!
//! 为 header 元数据提供校验和计算功能

/// 计算 CRC32 校验和（一次性计算）
///
/// # 参数
/// * `data` - 要计算校验和的数据
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// 校验数据与存储的 CRC 是否一致
#[inline]
pub fn verify(data: &[u8], stored: u32) -> bool {
    crc32(data) == stored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_basic() {
        assert_ne!(crc32(b"header"), 0);
        assert_ne!(crc32(b"header"), crc32(b"headex"));
    }

    #[test]
    fn test_verify() {
        let crc = crc32(b"hello world");
        assert!(verify(b"hello world", crc));
        assert!(!verify(b"hello worle", crc));
    }
}
