//! 内存资源
//!
//! 所有通道共享同一个字节向量，克隆出的 `MemoryResource` 也指向同一份数据，
//! 便于模拟"关闭后重新打开"。

use super::IoResource;
use parking_lot::Mutex;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

/// 内存资源
#[derive(Debug, Clone)]
pub struct MemoryResource {
    data: Arc<Mutex<Vec<u8>>>,
    read_only: bool,
    name: String,
}

impl MemoryResource {
    /// 空的可读写资源
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_bytes(name, Vec::new())
    }

    /// 以已有字节初始化
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(bytes)),
            read_only: false,
            name: name.into(),
        }
    }

    /// 共享同一份数据的只读视图
    pub fn to_read_only(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            read_only: true,
            name: self.name.clone(),
        }
    }

    /// 当前内容的拷贝
    pub fn bytes(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    fn channel(&self, writable: bool) -> MemoryChannel {
        MemoryChannel {
            data: Arc::clone(&self.data),
            pos: 0,
            writable,
        }
    }
}

impl IoResource for MemoryResource {
    type Channel = MemoryChannel;

    fn read_channel(&self) -> io::Result<MemoryChannel> {
        Ok(self.channel(false))
    }

    fn write_channel(&self) -> io::Result<MemoryChannel> {
        if self.read_only {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "memory resource is read-only",
            ));
        }
        Ok(self.channel(true))
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.data.lock().len() as u64)
    }

    fn delete(&self) -> io::Result<()> {
        self.data.lock().clear();
        Ok(())
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn name(&self) -> String {
        self.name.clone()
    }
}

/// 内存资源上的通道
#[derive(Debug)]
pub struct MemoryChannel {
    data: Arc<Mutex<Vec<u8>>>,
    pos: u64,
    writable: bool,
}

impl Read for MemoryChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.lock();
        let start = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for MemoryChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "channel opened read-only",
            ));
        }
        let mut data = self.data.lock();
        let start = self.pos as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        self.pos = end as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryChannel {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let len = self.data.lock().len() as i64;
        let pos = match target {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(delta) => len + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of resource",
            ));
        }
        self.pos = pos as u64;
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_past_end_zero_fills() {
        let resource = MemoryResource::new("mem");
        let mut channel = resource.write_channel().unwrap();
        channel.seek(SeekFrom::Start(4)).unwrap();
        channel.write_all(&[1, 2]).unwrap();
        assert_eq!(resource.bytes(), vec![0, 0, 0, 0, 1, 2]);
        assert_eq!(resource.size().unwrap(), 6);
    }

    #[test]
    fn test_read_at_offset() {
        let resource = MemoryResource::from_bytes("mem", (0u8..10).collect());
        let mut channel = resource.read_channel().unwrap();
        channel.seek(SeekFrom::Start(7)).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(channel.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[7, 8, 9]);
        assert_eq!(channel.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_channel_cannot_write() {
        let resource = MemoryResource::new("mem");
        let mut channel = resource.read_channel().unwrap();
        assert!(channel.write(&[1]).is_err());
    }

    #[test]
    fn test_read_only_view_shares_data() {
        let resource = MemoryResource::from_bytes("mem", vec![9; 3]);
        let view = resource.to_read_only();
        assert!(view.is_read_only());
        assert!(view.write_channel().is_err());

        resource.write_channel().unwrap().write_all(&[1]).unwrap();
        assert_eq!(view.bytes(), vec![1, 9, 9]);

        view.delete().unwrap();
        assert_eq!(resource.size().unwrap(), 0);
    }
}
