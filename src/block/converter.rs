//! Payload 转换接口
//!
//! 转换器决定 payload 的内存表示和它在块中的字节布局。
//! 资源只负责把 `bytes_per_block` 大小的字节区域搬进搬出。

use crate::error::{Error, ErrorKind, Result};
use byteorder::{ByteOrder, LittleEndian};

/// 长度前缀的字节数
const LEN_PREFIX: usize = 4;

/// payload 转换器
pub trait PayloadConverter: Send + Sync {
    /// payload 类型
    type Payload: Send + Sync + 'static;

    /// 分配一个能容纳一个块的新 payload
    fn new_block_data(&self, bytes_per_block: usize) -> Self::Payload;

    /// 清空回收来的 payload
    fn reset(&self, payload: &mut Self::Payload);

    /// 从 `src` 反序列化尽可能多的连续单元
    ///
    /// # 返回
    ///
    /// 读到的单元数，0 表示没有数据
    fn read(&self, payload: &mut Self::Payload, src: &[u8]) -> Result<usize>;

    /// 把前 `length` 个单元序列化并追加到 `dst`
    fn write(&self, payload: &Self::Payload, dst: &mut Vec<u8>, length: usize) -> Result<()>;
}

/// 读出长度前缀，按可用数据截断
fn read_len(src: &[u8], unit: usize, capacity: usize) -> usize {
    if src.len() < LEN_PREFIX {
        return 0;
    }
    let stored = LittleEndian::read_u32(&src[..LEN_PREFIX]) as usize;
    let available = (src.len() - LEN_PREFIX) / unit;
    stored.min(available).min(capacity)
}

fn check_length(length: usize, capacity: usize) -> Result<()> {
    if length > capacity {
        return Err(Error::with_message(
            ErrorKind::InvalidInput,
            format!("payload length {} exceeds block capacity {}", length, capacity),
        ));
    }
    Ok(())
}

/// `i32` 数组块（小端，带长度前缀）
#[derive(Debug, Clone, Copy, Default)]
pub struct IntArrayConverter;

impl IntArrayConverter {
    /// 每块可容纳的 `i32` 个数
    pub fn units_per_block(bytes_per_block: usize) -> usize {
        bytes_per_block.saturating_sub(LEN_PREFIX) / 4
    }
}

impl PayloadConverter for IntArrayConverter {
    type Payload = Vec<i32>;

    fn new_block_data(&self, bytes_per_block: usize) -> Vec<i32> {
        vec![0; Self::units_per_block(bytes_per_block)]
    }

    fn reset(&self, payload: &mut Vec<i32>) {
        payload.fill(0);
    }

    fn read(&self, payload: &mut Vec<i32>, src: &[u8]) -> Result<usize> {
        let count = read_len(src, 4, payload.len());
        if count == 0 {
            return Ok(0);
        }
        let end = LEN_PREFIX + count * 4;
        LittleEndian::read_i32_into(&src[LEN_PREFIX..end], &mut payload[..count]);
        Ok(count)
    }

    fn write(&self, payload: &Vec<i32>, dst: &mut Vec<u8>, length: usize) -> Result<()> {
        check_length(length, payload.len())?;
        let start = dst.len();
        dst.resize(start + LEN_PREFIX + length * 4, 0);
        LittleEndian::write_u32(&mut dst[start..start + LEN_PREFIX], length as u32);
        LittleEndian::write_i32_into(&payload[..length], &mut dst[start + LEN_PREFIX..]);
        Ok(())
    }
}

/// 原始字节块（带长度前缀）
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesConverter;

impl PayloadConverter for BytesConverter {
    type Payload = Vec<u8>;

    fn new_block_data(&self, bytes_per_block: usize) -> Vec<u8> {
        vec![0; bytes_per_block.saturating_sub(LEN_PREFIX)]
    }

    fn reset(&self, payload: &mut Vec<u8>) {
        payload.fill(0);
    }

    fn read(&self, payload: &mut Vec<u8>, src: &[u8]) -> Result<usize> {
        let count = read_len(src, 1, payload.len());
        if count == 0 {
            return Ok(0);
        }
        payload[..count].copy_from_slice(&src[LEN_PREFIX..LEN_PREFIX + count]);
        Ok(count)
    }

    fn write(&self, payload: &Vec<u8>, dst: &mut Vec<u8>, length: usize) -> Result<()> {
        check_length(length, payload.len())?;
        let mut prefix = [0u8; LEN_PREFIX];
        LittleEndian::write_u32(&mut prefix, length as u32);
        dst.extend_from_slice(&prefix);
        dst.extend_from_slice(&payload[..length]);
        Ok(())
    }
}
