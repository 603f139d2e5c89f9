// crates/vp_core/src/executor.rs

//! 秩内并行执行策略
//!
//! 提供多种执行策略用于元素级核函数：
//! - 串行执行（小规模问题）
//! - rayon 数据并行（大规模问题）
//! - 自动选择（按元素数切换）
//!
//! 核函数统一写成"平坦索引 + 索引数组展开"的形式，2D 与 3D
//! 共用同一份循环体。执行策略对调用方不透明：换成加速器后端
//! 只需替换本模块的分发，核函数不变。

use rayon::prelude::*;

/// 并行策略
///
/// # 策略说明
///
/// - `Sequential`: 完全串行执行，适用于小规模问题与确定性调试
/// - `Parallel`: rayon 数据并行
/// - `Auto`: 根据元素数自动选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParallelPolicy {
    /// 串行执行
    Sequential,
    /// rayon 数据并行
    Parallel,
    /// 自动选择（根据问题规模）
    #[default]
    Auto,
}

/// 自动策略的最小并行元素数
const MIN_PARALLEL_SIZE: usize = 4096;

impl ParallelPolicy {
    #[inline]
    fn is_parallel(self, n: usize) -> bool {
        match self {
            Self::Sequential => false,
            Self::Parallel => true,
            Self::Auto => n >= MIN_PARALLEL_SIZE,
        }
    }
}

/// 对 `0..n` 执行只读核函数
pub fn for_each<F>(policy: ParallelPolicy, n: usize, f: F)
where
    F: Fn(usize) + Sync + Send,
{
    if policy.is_parallel(n) {
        (0..n).into_par_iter().for_each(f);
    } else {
        for i in 0..n {
            f(i);
        }
    }
}

/// 对切片逐元素执行可变核函数
///
/// 核函数收到（平坦索引，元素可变引用）。
pub fn map_mut<T, F>(policy: ParallelPolicy, data: &mut [T], f: F)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync,
{
    if policy.is_parallel(data.len()) {
        data.par_iter_mut().enumerate().for_each(|(i, v)| f(i, v));
    } else {
        for (i, v) in data.iter_mut().enumerate() {
            f(i, v);
        }
    }
}

/// 平坦索引 → 局部多维索引（行主序，末轴最快）
#[inline]
pub fn unflatten<const D: usize>(mut flat: usize, lengths: [usize; D]) -> [usize; D] {
    let mut idx = [0usize; D];
    for d in (0..D).rev() {
        idx[d] = flat % lengths[d];
        flat /= lengths[d];
    }
    idx
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_for_each_counts() {
        let counter = AtomicUsize::new(0);
        for_each(ParallelPolicy::Parallel, 1000, |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(counter.load(Ordering::Relaxed), 1000);
    }

    #[test]
    fn test_map_mut_serial_and_parallel_agree() {
        let mut a = vec![0.0f64; 5000];
        let mut b = vec![0.0f64; 5000];
        map_mut(ParallelPolicy::Sequential, &mut a, |i, v| *v = i as f64 * 0.5);
        map_mut(ParallelPolicy::Parallel, &mut b, |i, v| *v = i as f64 * 0.5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_unflatten() {
        // 3x4x5 的域，末轴最快
        assert_eq!(unflatten(0, [3, 4, 5]), [0, 0, 0]);
        assert_eq!(unflatten(1, [3, 4, 5]), [0, 0, 1]);
        assert_eq!(unflatten(5, [3, 4, 5]), [0, 1, 0]);
        assert_eq!(unflatten(59, [3, 4, 5]), [2, 3, 4]);
        // 2D 同一套逻辑
        assert_eq!(unflatten(7, [4, 3]), [2, 1]);
    }
}
