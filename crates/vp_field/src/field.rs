// crates/vp_field/src/field.rs

//! 场存储
//!
//! `Field<T, D>` 是布局上的值数组，范围为局部拥有域沿每轴各
//! 扩张 ghost 宽度。内部单元由本秩独占写入；ghost 单元只由
//! halo 填充/回写产生。
//!
//! 归约是跨秩集合操作：本地以固定行主序做成对树求和，再经
//! 确定性全归约合并，结果与分解方式无关、逐位一致。

use crate::error::FieldError;
use crate::expr::FieldExpr;
use crate::layout::FieldLayout;
use crate::remap;
use bytemuck::Pod;
use std::sync::Arc;
use vp_core::executor::{map_mut, ParallelPolicy};
use vp_foundation::{pairwise_sum, NDIndex};
use vp_mesh::{Centering, UniformCartesian};

/// 分布式场
pub struct Field<T, const D: usize> {
    layout: Arc<FieldLayout<D>>,
    mesh: UniformCartesian<D>,
    centering: Centering,
    owned: NDIndex<D>,
    allocated: NDIndex<D>,
    data: Vec<T>,
}

impl<T: Pod + Send + Sync, const D: usize> Field<T, D> {
    /// 在给定网格与布局上创建零初始化的场
    pub fn new(
        mesh: UniformCartesian<D>,
        layout: Arc<FieldLayout<D>>,
        centering: Centering,
    ) -> Self {
        let owned = *layout.local_domain();
        let allocated = owned.grow(layout.ghost_width());
        let data = vec![T::zeroed(); allocated.size()];
        Self {
            layout,
            mesh,
            centering,
            owned,
            allocated,
            data,
        }
    }

    /// 场布局
    #[inline]
    pub fn layout(&self) -> &Arc<FieldLayout<D>> {
        &self.layout
    }

    /// 网格
    #[inline]
    pub fn mesh(&self) -> &UniformCartesian<D> {
        &self.mesh
    }

    /// 居中方式
    #[inline]
    pub fn centering(&self) -> Centering {
        self.centering
    }

    /// ghost 宽度
    #[inline]
    pub fn nghost(&self) -> usize {
        self.layout.ghost_width()
    }

    /// 本秩拥有域（全局索引）
    #[inline]
    pub fn owned_domain(&self) -> &NDIndex<D> {
        &self.owned
    }

    /// 含 ghost 的分配域（全局索引）
    #[inline]
    pub fn allocated_domain(&self) -> &NDIndex<D> {
        &self.allocated
    }

    /// 底层存储（行主序，含 ghost）
    #[inline]
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// 底层存储（可变）
    #[inline]
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// 读取全局索引处的值（含 ghost 区）
    #[inline]
    pub fn at(&self, idx: [i64; D]) -> T {
        debug_assert!(self.allocated.contains(idx), "索引越出分配域");
        self.data[self.allocated.flatten(idx)]
    }

    /// 全局索引处的可变引用（含 ghost 区）
    #[inline]
    pub fn at_mut(&mut self, idx: [i64; D]) -> &mut T {
        debug_assert!(self.allocated.contains(idx), "索引越出分配域");
        let flat = self.allocated.flatten(idx);
        &mut self.data[flat]
    }

    /// 全场（含 ghost）填充同一值
    pub fn fill(&mut self, value: T) {
        map_mut(ParallelPolicy::Auto, &mut self.data, |_, v| *v = value);
    }

    /// 对内部单元逐元素执行可变核函数
    ///
    /// 核函数收到（全局多维索引，元素可变引用）。
    pub fn apply_mut<F>(&mut self, f: F)
    where
        F: Fn([i64; D], &mut T) + Sync,
    {
        let owned = self.owned;
        let allocated = self.allocated;
        map_mut(ParallelPolicy::Auto, &mut self.data, |flat, v| {
            let idx = allocated.unflatten(flat);
            if owned.contains(idx) {
                f(idx, v);
            }
        });
    }

    /// 将惰性表达式求值并赋给内部单元
    pub fn assign<E>(&mut self, expr: E)
    where
        E: FieldExpr<T, D>,
    {
        self.apply_mut(|idx, v| *v = expr.eval(idx));
    }

    /// 按行主序拷出内部单元（dumper 契约与 FFT 暂存共用）
    pub fn interior_values(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.owned.size());
        for flat in 0..self.owned.size() {
            let idx = self.owned.unflatten(flat);
            out.push(self.data[self.allocated.flatten(idx)]);
        }
        out
    }

    /// 按行主序写回内部单元
    pub fn set_interior(&mut self, values: &[T]) -> Result<(), FieldError> {
        if values.len() != self.owned.size() {
            return Err(FieldError::Domain {
                operation: "set_interior",
                reason: format!(
                    "给定 {} 个值, 内部单元 {} 个",
                    values.len(),
                    self.owned.size()
                ),
            });
        }
        for (flat, &v) in values.iter().enumerate() {
            let idx = self.owned.unflatten(flat);
            let at = self.allocated.flatten(idx);
            self.data[at] = v;
        }
        Ok(())
    }

    /// 迁移到新布局
    ///
    /// 拥有单元经一次 all-to-all 重分布；ghost 内容不迁移，
    /// 调用方在迁移后按需重新填充 halo。
    pub fn remap(&mut self, new_layout: Arc<FieldLayout<D>>) -> Result<(), FieldError> {
        let comm = self.layout.comm().clone();
        let old_domains = self.layout.domains().to_vec();
        let new_owned = *new_layout.domain_of(comm.rank());
        let new_allocated = new_owned.grow(new_layout.ghost_width());
        let mut new_data = vec![T::zeroed(); new_allocated.size()];

        // 打包：旧拥有域与各秩新拥有域的交集
        let mut sends: Vec<Vec<T>> = Vec::with_capacity(comm.size());
        for r in 0..comm.size() {
            let region = self.owned.intersect(new_layout.domain_of(r));
            sends.push(remap::pack_region(&self.allocated, &self.data, &region));
        }
        let received = comm.all_to_all_v(sends)?;

        // 解包：新拥有域与各秩旧拥有域的交集
        for (r, vals) in received.into_iter().enumerate() {
            let region = new_owned.intersect(&old_domains[r]);
            remap::unpack_region(&new_allocated, &mut new_data, &region, &vals)?;
        }

        self.owned = new_owned;
        self.allocated = new_allocated;
        self.data = new_data;
        self.layout = new_layout;
        Ok(())
    }

    /// 校验两个场在同一布局上
    pub fn check_same_layout(
        &self,
        other: &Field<T, D>,
        operation: &'static str,
    ) -> Result<(), FieldError> {
        if !self.layout.same_as(&other.layout) {
            return Err(FieldError::LayoutMismatch {
                operation,
                reason: "两个场的布局不一致".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// 标量场归约
// ============================================================================

impl<const D: usize> Field<f64, D> {
    /// 内部单元全局求和（确定性集合操作）
    pub fn sum(&self) -> Result<f64, FieldError> {
        let local = pairwise_sum(&self.interior_values());
        Ok(self.layout.comm().all_reduce_sum(local)?)
    }

    /// 内部单元全局最小值
    pub fn min(&self) -> Result<f64, FieldError> {
        let local = self
            .interior_values()
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min);
        Ok(self.layout.comm().all_reduce_min(local)?)
    }

    /// 内部单元全局最大值
    pub fn max(&self) -> Result<f64, FieldError> {
        let local = self
            .interior_values()
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        Ok(self.layout.comm().all_reduce_max(local)?)
    }

    /// 两个场的内积 `f^T g`
    pub fn inner_product(&self, other: &Field<f64, D>) -> Result<f64, FieldError> {
        self.check_same_layout(other, "inner_product")?;
        let a = self.interior_values();
        let b = other.interior_values();
        let prod: Vec<f64> = a.iter().zip(&b).map(|(x, y)| x * y).collect();
        let local = pairwise_sum(&prod);
        Ok(self.layout.comm().all_reduce_sum(local)?)
    }

    /// L2 范数
    pub fn l2(&self) -> Result<f64, FieldError> {
        Ok(self.inner_product(self)?.sqrt())
    }

    /// Lp 范数：p=0 为 ℓ∞，p=1 为绝对值和，p=2 为 L2
    pub fn norm(&self, p: u32) -> Result<f64, FieldError> {
        match p {
            0 => {
                let local = self
                    .interior_values()
                    .iter()
                    .fold(0.0f64, |m, v| m.max(v.abs()));
                Ok(self.layout.comm().all_reduce_max(local)?)
            }
            1 => {
                let abs: Vec<f64> = self.interior_values().iter().map(|v| v.abs()).collect();
                let local = pairwise_sum(&abs);
                Ok(self.layout.comm().all_reduce_sum(local)?)
            }
            2 => self.l2(),
            _ => Err(FieldError::Domain {
                operation: "norm",
                reason: format!("不支持的范数阶 p={p}"),
            }),
        }
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::AxisDecomp;
    use vp_core::{Comm, ThreadComm};

    fn single_field(n: usize) -> Field<f64, 3> {
        let comm = Comm::single();
        let global = NDIndex::with_lengths([n, n, n]);
        let layout = Arc::new(
            FieldLayout::all_periodic(comm, global, [AxisDecomp::Parallel; 3], 1).unwrap(),
        );
        let h = 1.0 / n as f64;
        let mesh = UniformCartesian::new(global, [h; 3], [0.0; 3]);
        Field::new(mesh, layout, Centering::Cell)
    }

    #[test]
    fn test_new_is_zeroed_with_ghosts() {
        let f = single_field(4);
        // 4^3 内部 + 每轴 2 格 ghost
        assert_eq!(f.data().len(), 6 * 6 * 6);
        assert!(f.data().iter().all(|&v| v == 0.0));
        assert_eq!(f.owned_domain().size(), 64);
    }

    #[test]
    fn test_at_roundtrip() {
        let mut f = single_field(4);
        *f.at_mut([2, 1, 3]) = 7.5;
        assert_eq!(f.at([2, 1, 3]), 7.5);
        // ghost 区可寻址
        *f.at_mut([-1, 0, 0]) = 1.0;
        assert_eq!(f.at([-1, 0, 0]), 1.0);
    }

    #[test]
    fn test_apply_mut_only_touches_interior() {
        let mut f = single_field(4);
        f.fill(9.0);
        f.apply_mut(|_, v| *v = 1.0);
        // ghost 保持 fill 的值
        assert_eq!(f.at([-1, 0, 0]), 9.0);
        assert_eq!(f.at([0, 0, 0]), 1.0);
        assert_eq!(f.sum().unwrap(), 64.0);
    }

    #[test]
    fn test_interior_roundtrip() {
        let mut f = single_field(3);
        let vals: Vec<f64> = (0..27).map(|i| i as f64).collect();
        f.set_interior(&vals).unwrap();
        assert_eq!(f.interior_values(), vals);
        // ghost 不受影响
        assert_eq!(f.at([-1, -1, -1]), 0.0);
    }

    #[test]
    fn test_reductions() {
        let mut f = single_field(4);
        f.apply_mut(|idx, v| *v = idx[0] as f64 - 1.5);
        // 每个 x 层 16 个单元，x-1.5 ∈ {-1.5,-0.5,0.5,1.5}
        assert_eq!(f.sum().unwrap(), 0.0);
        assert_eq!(f.min().unwrap(), -1.5);
        assert_eq!(f.max().unwrap(), 1.5);
        assert_eq!(f.norm(1).unwrap(), 16.0 * 4.0);
        assert_eq!(f.norm(0).unwrap(), 1.5);
        let l2 = f.l2().unwrap();
        assert!((l2 * l2 - 16.0 * 2.0 * (2.25 + 0.25)).abs() < 1e-10);
    }

    #[test]
    fn test_sum_bitwise_identical_across_decompositions() {
        // 同一全局场在 1 秩与 4 秩下的求和逐位一致
        let global = NDIndex::with_lengths([8, 8, 8]);
        let value = |idx: [i64; 3]| ((idx[0] * 64 + idx[1] * 8 + idx[2]) as f64 * 0.37).sin();

        let f1 = {
            let comm = Comm::single();
            let layout = Arc::new(
                FieldLayout::all_periodic(comm, global, [AxisDecomp::Parallel; 3], 1).unwrap(),
            );
            let mesh = UniformCartesian::new(global, [0.125; 3], [0.0; 3]);
            let mut f = Field::new(mesh, layout, Centering::Cell);
            f.apply_mut(|idx, v| *v = value(idx));
            f.sum().unwrap()
        };

        let results = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let comms = ThreadComm::world(4);
        std::thread::scope(|s| {
            for comm in comms {
                let results = std::sync::Arc::clone(&results);
                s.spawn(move || {
                    let layout = Arc::new(
                        FieldLayout::all_periodic(comm, global, [AxisDecomp::Parallel; 3], 1)
                            .unwrap(),
                    );
                    let mesh = UniformCartesian::new(global, [0.125; 3], [0.0; 3]);
                    let mut f = Field::new(mesh, layout, Centering::Cell);
                    f.apply_mut(|idx, v| *v = value(idx));
                    results.lock().unwrap().push(f.sum().unwrap().to_bits());
                });
            }
        });
        let bits = results.lock().unwrap();
        assert_eq!(bits.len(), 4);
        assert!(bits.iter().all(|&b| b == bits[0]));
        assert_eq!(bits[0], f1.to_bits());
    }

    #[test]
    fn test_remap_preserves_interior() {
        // 单秩下 remap 到等价布局应保持内部值
        let mut f = single_field(4);
        f.apply_mut(|idx, v| *v = (idx[0] * 100 + idx[1] * 10 + idx[2]) as f64);
        let expected = f.interior_values();

        let new_layout = Arc::new(f.layout().rebuild([AxisDecomp::Parallel; 3]).unwrap());
        f.remap(new_layout).unwrap();
        assert_eq!(f.interior_values(), expected);
    }
}
