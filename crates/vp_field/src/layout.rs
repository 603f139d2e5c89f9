// crates/vp_field/src/layout.rs

//! 场布局
//!
//! 把全局 N 维索引域划分为每秩一块的局部子域，并携带 ghost
//! 宽度与每面边界策略。划分算法是均衡正交切分：沿 PARALLEL
//! 轴按长度降序分配秩数因子，每轴切成长度相差至多一格的段，
//! 秩按轴主序（字典序）对应到段网格。
//!
//! 布局在初始化时建立；负载均衡器可产出新布局（任意不重叠
//! 覆盖划分），挂接的场通过 [`crate::field::Field::remap`] 迁移。

use crate::error::FieldError;
use serde::{Deserialize, Serialize};
use vp_core::Comm;
use vp_foundation::{IndexRange, NDIndex};

/// 轴分解标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AxisDecomp {
    /// 允许沿该轴切分
    Parallel,
    /// 该轴不切分
    Serial,
}

/// 每面边界策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundaryPolicy {
    /// 周期回绕
    Periodic,
    /// ghost 置零
    DirichletZero,
    /// ghost 镜像最近内部层
    NeumannZero,
    /// 不处理
    #[default]
    None,
}

/// 面的方位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// 低侧
    Lo,
    /// 高侧
    Hi,
}

impl Side {
    /// 方位序号（Lo=0, Hi=1）
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Side::Lo => 0,
            Side::Hi => 1,
        }
    }
}

/// 场布局
///
/// 不变量：各秩局部域两两不交，其并等于全局域。
pub struct FieldLayout<const D: usize> {
    global: NDIndex<D>,
    decomp: [AxisDecomp; D],
    ghost_width: usize,
    boundaries: [[BoundaryPolicy; 2]; D],
    /// 每秩局部域，按秩序
    domains: Vec<NDIndex<D>>,
    comm: Comm,
}

impl<const D: usize> FieldLayout<D> {
    /// 按均衡正交切分构造布局
    pub fn new(
        comm: Comm,
        global: NDIndex<D>,
        decomp: [AxisDecomp; D],
        boundaries: [[BoundaryPolicy; 2]; D],
        ghost_width: usize,
    ) -> Result<Self, FieldError> {
        Self::validate_boundaries(&boundaries)?;
        let domains = partition(&global, &decomp, comm.size())?;
        Ok(Self {
            global,
            decomp,
            ghost_width,
            boundaries,
            domains,
            comm,
        })
    }

    /// 全周期边界的便捷构造
    pub fn all_periodic(
        comm: Comm,
        global: NDIndex<D>,
        decomp: [AxisDecomp; D],
        ghost_width: usize,
    ) -> Result<Self, FieldError> {
        Self::new(
            comm,
            global,
            decomp,
            [[BoundaryPolicy::Periodic; 2]; D],
            ghost_width,
        )
    }

    fn validate_boundaries(boundaries: &[[BoundaryPolicy; 2]; D]) -> Result<(), FieldError> {
        for (d, faces) in boundaries.iter().enumerate() {
            let lo = faces[0] == BoundaryPolicy::Periodic;
            let hi = faces[1] == BoundaryPolicy::Periodic;
            if lo != hi {
                return Err(FieldError::Layout {
                    operation: "validate_boundaries",
                    reason: format!("轴 {d} 的周期边界必须成对出现"),
                });
            }
        }
        Ok(())
    }

    /// 全局索引域
    #[inline]
    pub fn global_domain(&self) -> &NDIndex<D> {
        &self.global
    }

    /// 本秩局部域
    #[inline]
    pub fn local_domain(&self) -> &NDIndex<D> {
        &self.domains[self.comm.rank()]
    }

    /// 指定秩的局部域
    #[inline]
    pub fn domain_of(&self, rank: usize) -> &NDIndex<D> {
        &self.domains[rank]
    }

    /// 所有秩的局部域
    #[inline]
    pub fn domains(&self) -> &[NDIndex<D>] {
        &self.domains
    }

    /// ghost 宽度
    #[inline]
    pub fn ghost_width(&self) -> usize {
        self.ghost_width
    }

    /// 轴分解标签
    #[inline]
    pub fn decomp(&self) -> &[AxisDecomp; D] {
        &self.decomp
    }

    /// 指定面的边界策略
    #[inline]
    pub fn boundary(&self, axis: usize, side: Side) -> BoundaryPolicy {
        self.boundaries[axis][side.index()]
    }

    /// 每面边界策略表
    #[inline]
    pub fn boundaries(&self) -> &[[BoundaryPolicy; 2]; D] {
        &self.boundaries
    }

    /// 轴是否周期
    #[inline]
    pub fn is_periodic(&self, axis: usize) -> bool {
        self.boundaries[axis][0] == BoundaryPolicy::Periodic
    }

    /// 是否所有面均为周期
    pub fn is_all_periodic(&self) -> bool {
        self.boundaries
            .iter()
            .all(|f| f[0] == BoundaryPolicy::Periodic && f[1] == BoundaryPolicy::Periodic)
    }

    /// 通信子
    #[inline]
    pub fn comm(&self) -> &Comm {
        &self.comm
    }

    /// 拥有指定全局单元的秩
    ///
    /// 单元在全局域外时返回 `None`（周期回绕由调用方先处理）。
    pub fn find_owner(&self, cell: [i64; D]) -> Option<usize> {
        self.domains.iter().position(|dom| dom.contains(cell))
    }

    /// 指定面的邻居秩
    ///
    /// 取本秩面中心单元越过面一格后的拥有者；全局边界上非周期
    /// 时返回 `None`，周期时回绕。
    pub fn face_neighbor(&self, axis: usize, side: Side) -> Option<usize> {
        let local = self.local_domain();
        let mut cell = [0i64; D];
        for d in 0..D {
            cell[d] = (local[d].first() + local[d].last()) / 2;
        }
        cell[axis] = match side {
            Side::Lo => local[axis].first() - 1,
            Side::Hi => local[axis].last() + 1,
        };
        if !self.global[axis].contains(cell[axis]) {
            if !self.is_periodic(axis) {
                return None;
            }
            let len = self.global[axis].length() as i64;
            let first = self.global[axis].first();
            cell[axis] = first + (cell[axis] - first).rem_euclid(len);
        }
        self.find_owner(cell)
    }

    /// 全部面的邻居表：`[轴][Lo/Hi] → 邻居秩或 None`
    pub fn neighbors(&self) -> [[Option<usize>; 2]; D] {
        let mut out = [[None; 2]; D];
        for d in 0..D {
            out[d][0] = self.face_neighbor(d, Side::Lo);
            out[d][1] = self.face_neighbor(d, Side::Hi);
        }
        out
    }

    /// 按新的分解标签重建布局
    pub fn rebuild(&self, decomp: [AxisDecomp; D]) -> Result<Self, FieldError> {
        Self::new(
            self.comm.clone(),
            self.global,
            decomp,
            self.boundaries,
            self.ghost_width,
        )
    }

    /// 由显式划分结果重建布局（负载均衡器使用）
    ///
    /// 调用方保证 `domains` 两两不交且覆盖全局域；此处校验
    /// 总格点数与秩数。
    pub fn rebuild_with_domains(&self, domains: Vec<NDIndex<D>>) -> Result<Self, FieldError> {
        if domains.len() != self.comm.size() {
            return Err(FieldError::Layout {
                operation: "rebuild_with_domains",
                reason: format!(
                    "划分块数 {} 与秩数 {} 不符",
                    domains.len(),
                    self.comm.size()
                ),
            });
        }
        let covered: usize = domains.iter().map(|d| d.size()).sum();
        if covered != self.global.size() {
            return Err(FieldError::Layout {
                operation: "rebuild_with_domains",
                reason: format!(
                    "划分覆盖 {covered} 格, 全局域 {} 格",
                    self.global.size()
                ),
            });
        }
        Ok(Self {
            global: self.global,
            decomp: self.decomp,
            ghost_width: self.ghost_width,
            boundaries: self.boundaries,
            domains,
            comm: self.comm.clone(),
        })
    }

    /// 布局是否结构等价（域划分、ghost、边界一致）
    pub fn same_as(&self, other: &Self) -> bool {
        self.global == other.global
            && self.ghost_width == other.ghost_width
            && self.boundaries == other.boundaries
            && self.domains == other.domains
    }

    /// halo 交换用的周期平移向量集合
    ///
    /// 每个周期轴取 {-L, 0, +L}，非周期轴取 {0}；滤除全零以外
    /// 的组合由调用方处理。
    pub(crate) fn periodic_shifts(&self) -> Vec<[i64; D]> {
        let mut shifts = vec![[0i64; D]];
        for d in 0..D {
            if !self.is_periodic(d) {
                continue;
            }
            let len = self.global[d].length() as i64;
            let mut next = Vec::with_capacity(shifts.len() * 3);
            for s in shifts {
                for w in [-len, 0, len] {
                    let mut t = s;
                    t[d] = w;
                    next.push(t);
                }
            }
            shifts = next;
        }
        shifts
    }
}

/// 均衡正交切分
///
/// 把秩数的素因子按长度降序贪心分配给 PARALLEL 轴，随后每轴
/// 切成长度相差至多一格的段，秩按轴主序排列。
fn partition<const D: usize>(
    global: &NDIndex<D>,
    decomp: &[AxisDecomp; D],
    nranks: usize,
) -> Result<Vec<NDIndex<D>>, FieldError> {
    if global.is_empty() {
        return Err(FieldError::Layout {
            operation: "partition",
            reason: "全局域为空".to_string(),
        });
    }
    let mut counts = [1usize; D];
    for f in prime_factors_desc(nranks) {
        // 选择当前段长最大的 PARALLEL 轴；并列时取低轴
        let mut axis = None;
        let mut best = 0usize;
        for d in 0..D {
            if decomp[d] != AxisDecomp::Parallel {
                continue;
            }
            let seg = global[d].length() / counts[d];
            if axis.is_none() || seg > best {
                axis = Some(d);
                best = seg;
            }
        }
        let Some(axis) = axis else {
            return Err(FieldError::Layout {
                operation: "partition",
                reason: format!("没有 PARALLEL 轴可容纳 {nranks} 个秩"),
            });
        };
        counts[axis] *= f;
    }
    for d in 0..D {
        if counts[d] > global[d].length() {
            return Err(FieldError::Layout {
                operation: "partition",
                reason: format!("轴 {d} 长度 {} 小于段数 {}", global[d].length(), counts[d]),
            });
        }
    }

    // 每轴切段：前 len % counts 段多一格
    let mut axis_segments: Vec<Vec<IndexRange>> = Vec::with_capacity(D);
    for d in 0..D {
        let len = global[d].length();
        let n = counts[d];
        let base = len / n;
        let extra = len % n;
        let mut segs = Vec::with_capacity(n);
        let mut first = global[d].first();
        for k in 0..n {
            let size = base + usize::from(k < extra);
            segs.push(IndexRange::new(first, first + size as i64 - 1));
            first += size as i64;
        }
        axis_segments.push(segs);
    }

    // 轴主序排列段网格
    let mut domains = Vec::with_capacity(nranks);
    for rank in 0..nranks {
        let mut rem = rank;
        let mut coords = [0usize; D];
        for d in (0..D).rev() {
            coords[d] = rem % counts[d];
            rem /= counts[d];
        }
        let mut ranges = [IndexRange::EMPTY; D];
        for d in 0..D {
            ranges[d] = axis_segments[d][coords[d]];
        }
        domains.push(NDIndex::new(ranges));
    }
    Ok(domains)
}

fn prime_factors_desc(mut n: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            factors.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors.sort_unstable_by(|a, b| b.cmp(a));
    factors
}

// ============================================================================
// 测试
// ============================================================================
