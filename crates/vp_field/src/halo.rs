// crates/vp_field/src/halo.rs

//! halo 交换
//!
//! 两个方向：
//!
//! - [`fill_halo`]: 邻居拥有值 → 本秩 ghost；随后在全局边界面
//!   应用边界算子（Dirichlet 置零、Neumann 镜像）
//! - [`flush_halo_add`]: 本秩 ghost 累加值 → 拥有秩内部并求和
//!   （CIC scatter 的对称回写），随后清零 ghost
//!
//! 区域清单由布局知识在收发双方独立推出：对有序对（发送秩 q，
//! 接收秩 p，周期平移 s），区域为 `grow(dom_p) ∩ (dom_q + s)`。
//! 消息按（对端秩，平移序号）配对，同一轴内成对匹配，彼此独立
//! 的平移可重叠进行。填充后保证：每个 ghost 单元等于远端拥有值
//! 或边界算子像。

use crate::error::FieldError;
use crate::field::Field;
use crate::layout::{BoundaryPolicy, Side};
use crate::remap;
use bytemuck::Pod;
use std::ops::AddAssign;

/// fill 消息标签基址
const FILL_TAG: u64 = 0x10_0000;
/// flush 消息标签基址
const FLUSH_TAG: u64 = 0x20_0000;

#[inline]
fn neg<const D: usize>(s: [i64; D]) -> [i64; D] {
    let mut out = [0i64; D];
    for d in 0..D {
        out[d] = -s[d];
    }
    out
}

/// 用邻居拥有值与边界算子填充 ghost 单元
pub fn fill_halo<T, const D: usize>(field: &mut Field<T, D>) -> Result<(), FieldError>
where
    T: Pod + Send + Sync,
{
    let layout = field.layout().clone();
    let g = layout.ghost_width();
    if g == 0 {
        return Ok(());
    }
    validate_wrap_width(&layout, g)?;

    let comm = layout.comm().clone();
    let me = comm.rank();
    let shifts = layout.periodic_shifts();
    let alloc = *field.allocated_domain();
    let owned = *field.owned_domain();

    // 发送：我的拥有单元中落入 p 的 ghost 区的部分
    for (si, &s) in shifts.iter().enumerate() {
        for p in 0..comm.size() {
            if p == me && s == [0i64; D] {
                continue;
            }
            let region = layout.domain_of(p).grow(g).intersect(&owned.translate(s));
            if region.is_empty() {
                continue;
            }
            let src = region.translate(neg(s));
            let buf = remap::pack_region(&alloc, field.data(), &src);
            comm.send_slice(p, FILL_TAG | si as u64, &buf)?;
        }
    }

    // 接收：我的 ghost 区中归 q（或其周期像）所有的部分
    for (si, &s) in shifts.iter().enumerate() {
        for q in 0..comm.size() {
            if q == me && s == [0i64; D] {
                continue;
            }
            let region = alloc.intersect(&layout.domain_of(q).translate(s));
            if region.is_empty() {
                continue;
            }
            let buf: Vec<T> = comm.recv_vec(q, FILL_TAG | si as u64)?;
            remap::unpack_region(&alloc, field.data_mut(), &region, &buf)?;
        }
    }

    apply_boundary_ops(field)
}

/// 把 ghost 累加值回写给拥有秩并求和，随后清零 ghost
///
/// 非周期边界外的 ghost 累加值没有拥有者，直接丢弃。
pub fn flush_halo_add<T, const D: usize>(field: &mut Field<T, D>) -> Result<(), FieldError>
where
    T: Pod + AddAssign + Send + Sync,
{
    let layout = field.layout().clone();
    let g = layout.ghost_width();
    if g == 0 {
        return Ok(());
    }
    validate_wrap_width(&layout, g)?;

    let comm = layout.comm().clone();
    let me = comm.rank();
    let shifts = layout.periodic_shifts();
    let alloc = *field.allocated_domain();
    let owned = *field.owned_domain();

    // 发送：我的 ghost 中属于 q 的周期像的部分
    for (si, &s) in shifts.iter().enumerate() {
        for q in 0..comm.size() {
            if q == me && s == [0i64; D] {
                continue;
            }
            let region = alloc.intersect(&layout.domain_of(q).translate(s));
            if region.is_empty() {
                continue;
            }
            let buf = remap::pack_region(&alloc, field.data(), &region);
            comm.send_slice(q, FLUSH_TAG | si as u64, &buf)?;
        }
    }

    // 接收：p 的 ghost 中属于我的周期像的部分，累加进拥有单元
    for (si, &s) in shifts.iter().enumerate() {
        for p in 0..comm.size() {
            if p == me && s == [0i64; D] {
                continue;
            }
            let region = layout.domain_of(p).grow(g).intersect(&owned.translate(s));
            if region.is_empty() {
                continue;
            }
            let buf: Vec<T> = comm.recv_vec(p, FLUSH_TAG | si as u64)?;
            let dest = region.translate(neg(s));
            remap::unpack_region_add(&alloc, field.data_mut(), &dest, &buf)?;
        }
    }

    // 清零 ghost，保证后续 scatter 从干净状态开始
    zero_ghosts(field);
    Ok(())
}

fn validate_wrap_width<const D: usize>(
    layout: &crate::layout::FieldLayout<D>,
    g: usize,
) -> Result<(), FieldError> {
    for d in 0..D {
        if layout.is_periodic(d) && layout.global_domain()[d].length() < g {
            return Err(FieldError::Domain {
                operation: "halo",
                reason: format!("周期轴 {d} 长度小于 ghost 宽度 {g}"),
            });
        }
    }
    Ok(())
}

/// 在全局边界面应用边界算子
fn apply_boundary_ops<T, const D: usize>(field: &mut Field<T, D>) -> Result<(), FieldError>
where
    T: Pod + Send + Sync,
{
    let layout = field.layout().clone();
    let alloc = *field.allocated_domain();
    let global = *layout.global_domain();

    for d in 0..D {
        for side in [Side::Lo, Side::Hi] {
            let policy = layout.boundary(d, side);
            if matches!(policy, BoundaryPolicy::Periodic | BoundaryPolicy::None) {
                continue;
            }
            // 我的分配域越出全局边界的 ghost 片
            let slab = match side {
                Side::Lo => alloc.with_axis(
                    d,
                    vp_foundation::IndexRange::new(alloc[d].first(), global[d].first() - 1),
                ),
                Side::Hi => alloc.with_axis(
                    d,
                    vp_foundation::IndexRange::new(global[d].last() + 1, alloc[d].last()),
                ),
            };
            if slab.is_empty() {
                continue;
            }
            match policy {
                BoundaryPolicy::DirichletZero => {
                    for flat in 0..slab.size() {
                        let idx = slab.unflatten(flat);
                        *field.at_mut(idx) = T::zeroed();
                    }
                }
                BoundaryPolicy::NeumannZero => {
                    // 镜像最近内部层：跨边界面反射
                    let pivot = match side {
                        Side::Lo => 2 * global[d].first() - 1,
                        Side::Hi => 2 * global[d].last() + 1,
                    };
                    for flat in 0..slab.size() {
                        let idx = slab.unflatten(flat);
                        let mut src = idx;
                        src[d] = pivot - idx[d];
                        if !alloc.contains(src) {
                            return Err(FieldError::Domain {
                                operation: "apply_boundary_ops",
                                reason: format!("轴 {d} 子域过窄, 镜像源越界"),
                            });
                        }
                        let v = field.at(src);
                        *field.at_mut(idx) = v;
                    }
                }
                BoundaryPolicy::Periodic | BoundaryPolicy::None => unreachable!(),
            }
        }
    }
    Ok(())
}

fn zero_ghosts<T, const D: usize>(field: &mut Field<T, D>)
where
    T: Pod + Send + Sync,
{
    let alloc = *field.allocated_domain();
    let owned = *field.owned_domain();
    for flat in 0..alloc.size() {
        let idx = alloc.unflatten(flat);
        if !owned.contains(idx) {
            field.data_mut()[flat] = T::zeroed();
        }
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{AxisDecomp, BoundaryPolicy, FieldLayout};
    use std::sync::Arc;
    use vp_core::{Comm, ThreadComm};
    use vp_foundation::NDIndex;
    use vp_mesh::{Centering, UniformCartesian};

    fn make_field(
        comm: Comm,
        n: usize,
        boundaries: [[BoundaryPolicy; 2]; 3],
    ) -> Field<f64, 3> {
        let global = NDIndex::with_lengths([n, n, n]);
        let layout = Arc::new(
            FieldLayout::new(comm, global, [AxisDecomp::Parallel; 3], boundaries, 1).unwrap(),
        );
        let h = 1.0 / n as f64;
        let mesh = UniformCartesian::new(global, [h; 3], [0.0; 3]);
        Field::new(mesh, layout, Centering::Cell)
    }

    fn tagv(idx: [i64; 3]) -> f64 {
        (idx[0] * 10000 + idx[1] * 100 + idx[2]) as f64
    }

    #[test]
    fn test_periodic_fill_single_rank() {
        let mut f = make_field(Comm::single(), 4, [[BoundaryPolicy::Periodic; 2]; 3]);
        f.apply_mut(|idx, v| *v = tagv(idx));
        fill_halo(&mut f).unwrap();

        // 面 ghost：x=-1 来自 x=3
        assert_eq!(f.at([-1, 0, 0]), tagv([3, 0, 0]));
        assert_eq!(f.at([4, 2, 1]), tagv([0, 2, 1]));
        // 棱与角 ghost 也要正确
        assert_eq!(f.at([-1, -1, 0]), tagv([3, 3, 0]));
        assert_eq!(f.at([-1, -1, -1]), tagv([3, 3, 3]));
        assert_eq!(f.at([4, 4, 4]), tagv([0, 0, 0]));
    }

    #[test]
    fn test_dirichlet_fill() {
        let mut f = make_field(Comm::single(), 4, [[BoundaryPolicy::DirichletZero; 2]; 3]);
        f.fill(7.0);
        fill_halo(&mut f).unwrap();
        assert_eq!(f.at([-1, 0, 0]), 0.0);
        assert_eq!(f.at([4, 4, 4]), 0.0);
        // 内部不受影响
        assert_eq!(f.at([0, 0, 0]), 7.0);
    }

    #[test]
    fn test_neumann_fill_mirrors() {
        let mut f = make_field(Comm::single(), 4, [[BoundaryPolicy::NeumannZero; 2]; 3]);
        f.apply_mut(|idx, v| *v = tagv(idx));
        fill_halo(&mut f).unwrap();
        // ghost -1 镜像内部 0
        assert_eq!(f.at([-1, 2, 2]), tagv([0, 2, 2]));
        // ghost 4 镜像内部 3
        assert_eq!(f.at([4, 1, 0]), tagv([3, 1, 0]));
    }

    #[test]
    fn test_two_rank_fill() {
        let comms = ThreadComm::world(2);
        std::thread::scope(|s| {
            for comm in comms {
                s.spawn(move || {
                    let mut f = make_field(comm.clone(), 4, [[BoundaryPolicy::Periodic; 2]; 3]);
                    f.apply_mut(|idx, v| *v = tagv(idx));
                    fill_halo(&mut f).unwrap();

                    // 所有 ghost 都应等于周期回绕后的权威值
                    let alloc = *f.allocated_domain();
                    let owned = *f.owned_domain();
                    for flat in 0..alloc.size() {
                        let idx = alloc.unflatten(flat);
                        if owned.contains(idx) {
                            continue;
                        }
                        let mut wrapped = idx;
                        for d in 0..3 {
                            wrapped[d] = wrapped[d].rem_euclid(4);
                        }
                        assert_eq!(f.at(idx), tagv(wrapped), "ghost {idx:?} 错误");
                    }
                });
            }
        });
    }

    #[test]
    fn test_flush_accumulates_and_clears() {
        let mut f = make_field(Comm::single(), 4, [[BoundaryPolicy::Periodic; 2]; 3]);
        // 向角 ghost 累加，flush 后应回到周期拥有单元 (3,3,3)
        *f.at_mut([-1, -1, -1]) = 2.5;
        *f.at_mut([0, 0, 0]) = 1.0;
        flush_halo_add(&mut f).unwrap();
        assert_eq!(f.at([3, 3, 3]), 2.5);
        assert_eq!(f.at([0, 0, 0]), 1.0);
        // ghost 已清零
        assert_eq!(f.at([-1, -1, -1]), 0.0);
    }

    #[test]
    fn test_flush_conserves_total() {
        let comms = ThreadComm::world(2);
        std::thread::scope(|s| {
            for comm in comms {
                s.spawn(move || {
                    let mut f = make_field(comm.clone(), 4, [[BoundaryPolicy::Periodic; 2]; 3]);
                    // 整个分配域（含 ghost）写入 1
                    f.fill(1.0);
                    let alloc_total = comm
                        .all_reduce_sum(f.allocated_domain().size() as f64)
                        .unwrap();
                    flush_halo_add(&mut f).unwrap();
                    // flush 后总和不变（全周期下每个 ghost 都有拥有者）
                    assert_eq!(f.sum().unwrap(), alloc_total);
                });
            }
        });
    }

    #[test]
    fn test_fill_then_fill_idempotent() {
        let mut f = make_field(Comm::single(), 4, [[BoundaryPolicy::Periodic; 2]; 3]);
        f.apply_mut(|idx, v| *v = tagv(idx));
        fill_halo(&mut f).unwrap();
        let snapshot = f.data().to_vec();
        fill_halo(&mut f).unwrap();
        assert_eq!(f.data(), &snapshot[..]);
    }
}
