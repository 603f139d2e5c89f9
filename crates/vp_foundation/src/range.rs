// crates/vp_foundation/src/range.rs

//! 一维索引区间
//!
//! `IndexRange` 表示整数闭区间 `[first, last]`，步长恒为 1。
//! 当 `first > last` 时区间为空。
//!
//! # 不变量
//!
//! `first <= last + 1`（即最多空一格，空区间规范化为 `[0, -1]`）。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 整数闭区间 `[first, last]`
///
/// 所有网格轴向的索引范围均用本类型表达。区间参与交集、
/// 平移、扩张与切分运算，是域分解与 halo 交换的基础。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexRange {
    first: i64,
    last: i64,
}

impl IndexRange {
    /// 规范化的空区间
    pub const EMPTY: Self = Self { first: 0, last: -1 };

    /// 创建闭区间 `[first, last]`
    ///
    /// `first > last` 时返回规范化空区间。
    #[inline]
    pub fn new(first: i64, last: i64) -> Self {
        if first > last {
            Self::EMPTY
        } else {
            Self { first, last }
        }
    }

    /// 创建长度为 `n` 的区间 `[0, n-1]`
    #[inline]
    pub fn with_length(n: usize) -> Self {
        Self::new(0, n as i64 - 1)
    }

    /// 区间下界
    #[inline]
    pub const fn first(self) -> i64 {
        self.first
    }

    /// 区间上界（含）
    #[inline]
    pub const fn last(self) -> i64 {
        self.last
    }

    /// 区间长度
    #[inline]
    pub fn length(self) -> usize {
        (self.last - self.first + 1).max(0) as usize
    }

    /// 是否为空
    #[inline]
    pub fn is_empty(self) -> bool {
        self.first > self.last
    }

    /// 是否包含索引 `i`
    #[inline]
    pub fn contains(self, i: i64) -> bool {
        i >= self.first && i <= self.last
    }

    /// 与另一区间求交，可能为空
    #[inline]
    pub fn intersect(self, other: Self) -> Self {
        Self::new(self.first.max(other.first), self.last.min(other.last))
    }

    /// 平移 `offset`
    #[inline]
    pub fn translate(self, offset: i64) -> Self {
        if self.is_empty() {
            self
        } else {
            Self {
                first: self.first + offset,
                last: self.last + offset,
            }
        }
    }

    /// 两端各扩张 `g` 格
    #[inline]
    pub fn grow(self, g: usize) -> Self {
        if self.is_empty() {
            self
        } else {
            Self {
                first: self.first - g as i64,
                last: self.last + g as i64,
            }
        }
    }

    /// 在前 `count` 格处切分为（下段，上段）
    ///
    /// `count` 超过长度时上段为空。
    pub fn split_at(self, count: usize) -> (Self, Self) {
        let cut = self.first + count as i64;
        (
            Self::new(self.first, (cut - 1).min(self.last)),
            Self::new(cut.min(self.last + 1), self.last),
        )
    }
}

impl Default for IndexRange {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "[empty]")
        } else {
            write!(f, "[{}:{}]", self.first, self.last)
        }
    }
}

// ============================================================================
// 测试
// ============================================================================
