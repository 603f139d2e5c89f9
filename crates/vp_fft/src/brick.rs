// crates/vp_fft/src/brick.rs

//! 稠密暂存块
//!
//! 无 ghost、行主序（末轴最快）的矩形数据块，是 FFT 逐轴
//! 变换与跨秩重分布的工作表示。线迭代支持两种策略：
//!
//! - 逐线 strided 拷贝（`use_reorder = false`）
//! - 整块转置成轴在末、线连续后批量处理（`use_reorder = true`）

use bytemuck::Pod;
use vp_foundation::NDIndex;

/// 稠密矩形数据块
#[derive(Debug, Clone)]
pub struct DenseBrick<T, const D: usize> {
    domain: NDIndex<D>,
    data: Vec<T>,
}

impl<T: Pod, const D: usize> DenseBrick<T, D> {
    /// 零初始化的块
    pub fn zeroed(domain: NDIndex<D>) -> Self {
        Self {
            data: vec![T::zeroed(); domain.size()],
            domain,
        }
    }

    /// 由域与数据构造；长度必须等于域大小
    pub fn from_parts(domain: NDIndex<D>, data: Vec<T>) -> Self {
        debug_assert_eq!(data.len(), domain.size());
        Self { domain, data }
    }

    /// 数据域
    #[inline]
    pub fn domain(&self) -> &NDIndex<D> {
        &self.domain
    }

    /// 底层数据（行主序）
    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// 底层数据（可变）
    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// 拆出域与数据
    pub fn into_parts(self) -> (NDIndex<D>, Vec<T>) {
        (self.domain, self.data)
    }

    /// 逐元素映射为另一种标量
    pub fn map<U: Pod>(&self, f: impl Fn(T) -> U) -> DenseBrick<U, D> {
        DenseBrick {
            domain: self.domain,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// 沿 `axis` 的线长
    #[inline]
    pub fn line_len(&self, axis: usize) -> usize {
        self.domain[axis].length()
    }

    /// 对沿 `axis` 的每条线执行核函数
    ///
    /// 核函数收到（线编号，线数据）。`reorder` 为真时整块转置
    /// 为轴在末的布局后连续处理，否则逐线 strided 拷入拷出。
    /// 两种路径的线编号与结果一致。
    pub fn for_each_line_mut(
        &mut self,
        axis: usize,
        reorder: bool,
        mut f: impl FnMut(usize, &mut [T]),
    ) {
        let n = self.line_len(axis);
        if n == 0 || self.data.is_empty() {
            return;
        }
        let n_lines = self.data.len() / n;

        if reorder {
            let mut permuted = self.transpose_axis_last(axis);
            for (l, line) in permuted.chunks_mut(n).enumerate() {
                f(l, line);
            }
            self.untranspose_axis_last(axis, &permuted);
        } else {
            let mut line = vec![T::zeroed(); n];
            for l in 0..n_lines {
                let offsets = self.line_offsets(axis, l);
                for (k, &off) in offsets.iter().enumerate() {
                    line[k] = self.data[off];
                }
                f(l, &mut line);
                for (k, &off) in offsets.iter().enumerate() {
                    self.data[off] = line[k];
                }
            }
        }
    }

    /// 第 `l` 条线上各元素的平坦偏移
    fn line_offsets(&self, axis: usize, l: usize) -> Vec<usize> {
        let lengths = self.domain.lengths();
        let n = lengths[axis];
        // 行主序步长
        let mut strides = [1usize; D];
        for d in (0..D.saturating_sub(1)).rev() {
            strides[d] = strides[d + 1] * lengths[d + 1];
        }
        // 把线编号展开成其余轴的坐标
        let mut rem = l;
        let mut base = 0usize;
        for d in (0..D).rev() {
            if d == axis {
                continue;
            }
            base += (rem % lengths[d]) * strides[d];
            rem /= lengths[d];
        }
        (0..n).map(|k| base + k * strides[axis]).collect()
    }

    /// 转置为 `axis` 在末、线连续的布局
    fn transpose_axis_last(&self, axis: usize) -> Vec<T> {
        let n = self.line_len(axis);
        let n_lines = self.data.len() / n;
        let mut out = vec![T::zeroed(); self.data.len()];
        for l in 0..n_lines {
            let offsets = self.line_offsets(axis, l);
            for (k, &off) in offsets.iter().enumerate() {
                out[l * n + k] = self.data[off];
            }
        }
        out
    }

    /// [`Self::transpose_axis_last`] 的逆操作
    fn untranspose_axis_last(&mut self, axis: usize, permuted: &[T]) {
        let n = self.line_len(axis);
        let n_lines = self.data.len() / n;
        for l in 0..n_lines {
            let offsets = self.line_offsets(axis, l);
            for (k, &off) in offsets.iter().enumerate() {
                self.data[off] = permuted[l * n + k];
            }
        }
    }
}

// ============================================================================
// 测试
// ============================================================================
