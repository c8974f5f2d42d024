//! 资源统计信息

use std::sync::atomic::{AtomicU64, Ordering};

/// 统计信息快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// 共享锁获取次数
    pub shared_locks: u64,
    /// 独占锁获取次数（包括未命中时的升级）
    pub exclusive_locks: u64,
    /// 只读访问者创建次数
    pub read_accessors: u64,
    /// 读写访问者创建次数
    pub write_accessors: u64,
    /// flush 次数
    pub flushes: u64,
    /// 块查找次数
    pub lookups: u64,
    /// "上一个块" 快速路径命中次数
    pub last_block_hits: u64,
    /// 缓存未命中次数
    pub misses: u64,
    /// 块被标记为脏的次数
    pub dirty_marks: u64,
}

impl StatsSnapshot {
    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            (self.lookups - self.misses.min(self.lookups)) as f64 / self.lookups as f64
        }
    }
}

/// 统计计数器
#[derive(Debug, Default)]
pub(crate) struct Statistics {
    shared_locks: AtomicU64,
    exclusive_locks: AtomicU64,
    read_accessors: AtomicU64,
    write_accessors: AtomicU64,
    flushes: AtomicU64,
    lookups: AtomicU64,
    last_block_hits: AtomicU64,
    misses: AtomicU64,
    dirty_marks: AtomicU64,
}

/// 计数器种类
#[derive(Debug, Clone, Copy)]
pub(crate) enum Counter {
    SharedLock,
    ExclusiveLock,
    ReadAccessor,
    WriteAccessor,
    Flush,
    Lookup,
    LastBlockHit,
    Miss,
    DirtyMark,
}

impl Statistics {
    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::SharedLock => &self.shared_locks,
            Counter::ExclusiveLock => &self.exclusive_locks,
            Counter::ReadAccessor => &self.read_accessors,
            Counter::WriteAccessor => &self.write_accessors,
            Counter::Flush => &self.flushes,
            Counter::Lookup => &self.lookups,
            Counter::LastBlockHit => &self.last_block_hits,
            Counter::Miss => &self.misses,
            Counter::DirtyMark => &self.dirty_marks,
        }
    }

    pub(crate) fn incr(&self, counter: Counter) {
        self.counter(counter).fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        let load = |c| self.counter(c).load(Ordering::Relaxed);
        StatsSnapshot {
            shared_locks: load(Counter::SharedLock),
            exclusive_locks: load(Counter::ExclusiveLock),
            read_accessors: load(Counter::ReadAccessor),
            write_accessors: load(Counter::WriteAccessor),
            flushes: load(Counter::Flush),
            lookups: load(Counter::Lookup),
            last_block_hits: load(Counter::LastBlockHit),
            misses: load(Counter::Miss),
            dirty_marks: load(Counter::DirtyMark),
        }
    }

    pub(crate) fn reset(&self) {
        for counter in [
            Counter::SharedLock,
            Counter::ExclusiveLock,
            Counter::ReadAccessor,
            Counter::WriteAccessor,
            Counter::Flush,
            Counter::Lookup,
            Counter::LastBlockHit,
            Counter::Miss,
            Counter::DirtyMark,
        ] {
            self.counter(counter).store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_reset() {
        let stats = Statistics::default();
        stats.incr(Counter::Lookup);
        stats.incr(Counter::Lookup);
        stats.incr(Counter::Miss);
        stats.incr(Counter::Flush);

        let snap = stats.snapshot();
        assert_eq!(snap.lookups, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.flushes, 1);
        assert_eq!(snap.hit_rate(), 0.5);

        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
        assert_eq!(StatsSnapshot::default().hit_rate(), 0.0);
    }
}
