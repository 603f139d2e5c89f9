// crates/vp_foundation/src/sum.rs

//! 确定性求和
//!
//! 归约必须跨分解方式逐位一致，因此本模块提供顺序固定的
//! 成对归约树求和，以及用于诊断累计的 Kahan 补偿求和器。

use num_traits::Float;

/// 成对归约树求和
///
/// 以固定的二分顺序合并，结果与调用次数、线程数无关。
/// 误差界为 O(log n · eps)，优于朴素顺序求和。
pub fn pairwise_sum(values: &[f64]) -> f64 {
    const BASE: usize = 64;
    if values.len() <= BASE {
        let mut acc = 0.0;
        for &v in values {
            acc += v;
        }
        acc
    } else {
        let mid = values.len() / 2;
        pairwise_sum(&values[..mid]) + pairwise_sum(&values[mid..])
    }
}

/// Kahan 求和器（泛型版）
///
/// 使用补偿项减少浮点累加误差。
#[derive(Debug, Clone, Copy)]
pub struct KahanSum<S: Float> {
    sum: S,
    compensation: S,
}

impl<S: Float> KahanSum<S> {
    /// 创建新的求和器
    pub fn new() -> Self {
        Self {
            sum: S::zero(),
            compensation: S::zero(),
        }
    }

    /// 添加一个值
    #[inline]
    pub fn add(&mut self, value: S) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    /// 获取当前求和值
    #[inline]
    pub fn value(&self) -> S {
        self.sum
    }

    /// 从迭代器求和
    pub fn sum_iter<I: IntoIterator<Item = S>>(iter: I) -> S {
        let mut kahan = Self::new();
        for v in iter {
            kahan.add(v);
        }
        kahan.value()
    }
}

impl<S: Float> Default for KahanSum<S> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 测试
// ============================================================================
