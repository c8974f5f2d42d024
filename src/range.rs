//! 闭区间
//!
//! 记录一组索引的 `[min, max]` 边界，首次 `update` 之前处于未设置状态。

use crate::consts::RANGE_UNSET;

/// 闭区间 `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Range {
    bounds: Option<(i64, i64)>,
}

impl Range {
    /// 创建未设置的区间
    pub const fn new() -> Self {
        Self { bounds: None }
    }

    /// 创建 `[min, max]`，`min > max` 时返回未设置的区间
    pub const fn from_bounds(min: i64, max: i64) -> Self {
        if min > max {
            Self::new()
        } else {
            Self {
                bounds: Some((min, max)),
            }
        }
    }

    /// 是否已设置
    pub const fn is_set(&self) -> bool {
        self.bounds.is_some()
    }

    /// 下界
    pub fn min(&self) -> Option<i64> {
        self.bounds.map(|(min, _)| min)
    }

    /// 上界
    pub fn max(&self) -> Option<i64> {
        self.bounds.map(|(_, max)| max)
    }

    /// 区间内的整数个数，未设置时为 0
    pub fn len(&self) -> u64 {
        match self.bounds {
            Some((min, max)) => max.abs_diff(min) + 1,
            None => 0,
        }
    }

    /// 是否为空（未设置）
    pub fn is_empty(&self) -> bool {
        !self.is_set()
    }

    /// 扩展区间使其包含 `value`
    pub fn update(&mut self, value: i64) {
        self.bounds = Some(match self.bounds {
            Some((min, max)) => (min.min(value), max.max(value)),
            None => (value, value),
        });
    }

    /// 是否包含 `value`，未设置时总是 false
    pub fn contains(&self, value: i64) -> bool {
        matches!(self.bounds, Some((min, max)) if min <= value && value <= max)
    }

    /// 原地取交集
    ///
    /// 两区间不相交（或任一未设置）时结果为未设置。
    pub fn limit(&mut self, other: &Range) {
        self.bounds = match (self.bounds, other.bounds) {
            (Some((a_min, a_max)), Some((b_min, b_max))) => {
                let min = a_min.max(b_min);
                let max = a_max.min(b_max);
                (min <= max).then_some((min, max))
            }
            _ => None,
        };
    }

    /// 原地取并集（包含两者的最小区间）
    pub fn union(&mut self, other: &Range) {
        if let Some((min, max)) = other.bounds {
            self.update(min);
            self.update(max);
        }
    }

    /// 序列化用的 `(min, max)`，未设置时为哨兵值
    pub(crate) fn to_raw(self) -> (i64, i64) {
        self.bounds.unwrap_or((RANGE_UNSET, RANGE_UNSET))
    }

    /// 从序列化的 `(min, max)` 恢复
    pub(crate) fn from_raw(min: i64, max: i64) -> Self {
        if min == RANGE_UNSET || max == RANGE_UNSET {
            Self::new()
        } else {
            Self::from_bounds(min, max)
        }
    }
}
