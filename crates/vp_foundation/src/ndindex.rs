// crates/vp_foundation/src/ndindex.rs

//! N 维索引域
//!
//! `NDIndex<D>` 是 D 个 [`IndexRange`] 的笛卡尔积，描述结构化网格上
//! 一块矩形索引区域。域分解、halo 元数据与 FFT 重分布全部建立在
//! 它的交集与平移代数之上。

use crate::range::IndexRange;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// D 维矩形索引域
///
/// 总大小为各轴长度之积。空轴使整个域为空。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NDIndex<const D: usize> {
    #[serde(with = "serde_arrays")]
    ranges: [IndexRange; D],
}

// serde 对任意长度数组缺省实现不足，这里用一个局部模块桥接。
mod serde_arrays {
    use super::IndexRange;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer, const D: usize>(
        v: &[IndexRange; D],
        s: S,
    ) -> Result<S::Ok, S::Error> {
        v.as_slice().serialize(s)
    }

    pub fn deserialize<'de, De: Deserializer<'de>, const D: usize>(
        d: De,
    ) -> Result<[IndexRange; D], De::Error> {
        let v: Vec<IndexRange> = Vec::deserialize(d)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("维度长度不匹配"))
    }
}

impl<const D: usize> NDIndex<D> {
    /// 由各轴区间构造
    #[inline]
    pub fn new(ranges: [IndexRange; D]) -> Self {
        Self { ranges }
    }

    /// 由各轴长度构造 `[0, n_d - 1]` 的域
    pub fn with_lengths(lengths: [usize; D]) -> Self {
        let mut ranges = [IndexRange::EMPTY; D];
        for d in 0..D {
            ranges[d] = IndexRange::with_length(lengths[d]);
        }
        Self { ranges }
    }

    /// 各轴区间
    #[inline]
    pub fn ranges(&self) -> &[IndexRange; D] {
        &self.ranges
    }

    /// 各轴长度
    pub fn lengths(&self) -> [usize; D] {
        let mut out = [0usize; D];
        for d in 0..D {
            out[d] = self.ranges[d].length();
        }
        out
    }

    /// 各轴下界
    pub fn firsts(&self) -> [i64; D] {
        let mut out = [0i64; D];
        for d in 0..D {
            out[d] = self.ranges[d].first();
        }
        out
    }

    /// 总格点数
    pub fn size(&self) -> usize {
        self.ranges.iter().map(|r| r.length()).product()
    }

    /// 是否为空（任一轴为空即为空）
    pub fn is_empty(&self) -> bool {
        self.ranges.iter().any(|r| r.is_empty())
    }

    /// 是否包含多维索引 `idx`
    pub fn contains(&self, idx: [i64; D]) -> bool {
        (0..D).all(|d| self.ranges[d].contains(idx[d]))
    }

    /// 逐轴求交，可能为空
    pub fn intersect(&self, other: &Self) -> Self {
        let mut ranges = [IndexRange::EMPTY; D];
        for d in 0..D {
            ranges[d] = self.ranges[d].intersect(other.ranges[d]);
        }
        Self { ranges }
    }

    /// 逐轴平移
    pub fn translate(&self, offset: [i64; D]) -> Self {
        let mut ranges = self.ranges;
        for d in 0..D {
            ranges[d] = ranges[d].translate(offset[d]);
        }
        Self { ranges }
    }

    /// 所有轴各扩张 `g` 格
    pub fn grow(&self, g: usize) -> Self {
        let mut ranges = self.ranges;
        for d in 0..D {
            ranges[d] = ranges[d].grow(g);
        }
        Self { ranges }
    }

    /// 替换某一轴的区间
    pub fn with_axis(&self, axis: usize, range: IndexRange) -> Self {
        let mut ranges = self.ranges;
        ranges[axis] = range;
        Self { ranges }
    }

    /// 沿 `axis` 在前 `count` 格处切分为（下块，上块）
    pub fn split_axis(&self, axis: usize, count: usize) -> (Self, Self) {
        let (lo, hi) = self.ranges[axis].split_at(count);
        (self.with_axis(axis, lo), self.with_axis(axis, hi))
    }

    /// 将域内多维索引按行主序（末轴最快）展平为局部偏移
    ///
    /// 调用者保证 `idx` 落在域内。
    #[inline]
    pub fn flatten(&self, idx: [i64; D]) -> usize {
        let mut flat = 0usize;
        for d in 0..D {
            let len = self.ranges[d].length();
            let local = (idx[d] - self.ranges[d].first()) as usize;
            flat = flat * len + local;
        }
        flat
    }

    /// 行主序展平的逆运算：局部偏移 → 全局多维索引
    #[inline]
    pub fn unflatten(&self, mut flat: usize) -> [i64; D] {
        let mut idx = [0i64; D];
        for d in (0..D).rev() {
            let len = self.ranges[d].length();
            idx[d] = self.ranges[d].first() + (flat % len) as i64;
            flat /= len;
        }
        idx
    }
}

impl<const D: usize> Index<usize> for NDIndex<D> {
    type Output = IndexRange;

    fn index(&self, axis: usize) -> &IndexRange {
        &self.ranges[axis]
    }
}

impl<const D: usize> fmt::Display for NDIndex<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (d, r) in self.ranges.iter().enumerate() {
            if d > 0 {
                write!(f, "x")?;
            }
            write!(f, "{r}")?;
        }
        write!(f, "}}")
    }
}

// ============================================================================
// 测试
// ============================================================================
