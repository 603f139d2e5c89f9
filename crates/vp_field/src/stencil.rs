// crates/vp_field/src/stencil.rs

//! 差分模板
//!
//! 中心二阶梯度、Laplacian（3D 为 7 点，2D 为 5 点）与散度。
//! 模板读取 ghost 单元，调用前必须完成一次 halo 填充；ghost
//! 宽度至少为 1。

use crate::error::FieldError;
use crate::field::Field;

/// 散度的差分格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DivScheme {
    /// 中心差分
    #[default]
    Centered,
    /// 前向差分
    Forward,
    /// 后向差分
    Backward,
}

fn require_ghost<T: bytemuck::Pod + Send + Sync, const D: usize>(
    f: &Field<T, D>,
    operation: &'static str,
) -> Result<(), FieldError> {
    if f.nghost() < 1 {
        return Err(FieldError::Domain {
            operation,
            reason: "模板需要 ghost 宽度至少为 1".to_string(),
        });
    }
    Ok(())
}

/// 中心二阶梯度: `out_d = (phi[i+e_d] - phi[i-e_d]) / (2 h_d)`
pub fn gradient<const D: usize>(
    phi: &Field<f64, D>,
    out: &mut Field<[f64; D], D>,
) -> Result<(), FieldError> {
    require_ghost(phi, "gradient")?;
    let h = phi.mesh().spacing();
    out.apply_mut(|idx, v| {
        for d in 0..D {
            let mut hi = idx;
            let mut lo = idx;
            hi[d] += 1;
            lo[d] -= 1;
            v[d] = (phi.at(hi) - phi.at(lo)) / (2.0 * h[d]);
        }
    });
    Ok(())
}

/// Laplacian: 逐轴二阶中心差分之和
pub fn laplacian<const D: usize>(
    phi: &Field<f64, D>,
    out: &mut Field<f64, D>,
) -> Result<(), FieldError> {
    require_ghost(phi, "laplacian")?;
    let h = phi.mesh().spacing();
    out.apply_mut(|idx, v| {
        let center = phi.at(idx);
        let mut acc = 0.0;
        for d in 0..D {
            let mut hi = idx;
            let mut lo = idx;
            hi[d] += 1;
            lo[d] -= 1;
            acc += (phi.at(hi) - 2.0 * center + phi.at(lo)) / (h[d] * h[d]);
        }
        *v = acc;
    });
    Ok(())
}

/// 散度: `out = Σ_d ∂_d v_d`，格式可选
pub fn divergence<const D: usize>(
    v: &Field<[f64; D], D>,
    out: &mut Field<f64, D>,
    scheme: DivScheme,
) -> Result<(), FieldError> {
    require_ghost(v, "divergence")?;
    let h = v.mesh().spacing();
    out.apply_mut(|idx, val| {
        let mut acc = 0.0;
        for d in 0..D {
            let mut hi = idx;
            let mut lo = idx;
            match scheme {
                DivScheme::Centered => {
                    hi[d] += 1;
                    lo[d] -= 1;
                    acc += (v.at(hi)[d] - v.at(lo)[d]) / (2.0 * h[d]);
                }
                DivScheme::Forward => {
                    hi[d] += 1;
                    acc += (v.at(hi)[d] - v.at(idx)[d]) / h[d];
                }
                DivScheme::Backward => {
                    lo[d] -= 1;
                    acc += (v.at(idx)[d] - v.at(lo)[d]) / h[d];
                }
            }
        }
        *val = acc;
    });
    Ok(())
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::halo::fill_halo;
    use crate::layout::{AxisDecomp, FieldLayout};
    use std::f64::consts::PI;
    use std::sync::Arc;
    use vp_core::Comm;
    use vp_foundation::NDIndex;
    use vp_mesh::{Centering, UniformCartesian};

    fn periodic_pair(n: usize) -> (Field<f64, 3>, Field<[f64; 3], 3>, Field<f64, 3>) {
        let comm = Comm::single();
        let global = NDIndex::with_lengths([n, n, n]);
        let layout = Arc::new(
            FieldLayout::all_periodic(comm, global, [AxisDecomp::Parallel; 3], 1).unwrap(),
        );
        let h = 1.0 / n as f64;
        let mesh = UniformCartesian::new(global, [h; 3], [0.0; 3]);
        (
            Field::new(mesh.clone(), layout.clone(), Centering::Cell),
            Field::new(mesh.clone(), layout.clone(), Centering::Cell),
            Field::new(mesh, layout, Centering::Cell),
        )
    }

    /// 在单元中心取样 sin(2πx)sin(2πy)sin(2πz)
    fn sample_sin(phi: &mut Field<f64, 3>) {
        let mesh = phi.mesh().clone();
        phi.apply_mut(|idx, v| {
            let x = mesh.cell_center(idx);
            *v = (2.0 * PI * x[0]).sin() * (2.0 * PI * x[1]).sin() * (2.0 * PI * x[2]).sin();
        });
    }

    #[test]
    fn test_laplacian_matches_analytic_to_h2() {
        let n = 32;
        let (mut phi, _, mut lap) = periodic_pair(n);
        sample_sin(&mut phi);
        fill_halo(&mut phi).unwrap();
        laplacian(&phi, &mut lap).unwrap();

        // 解析: ∇²f = -3 (2π)² f
        let k2 = 3.0 * (2.0 * PI).powi(2);
        let mesh = phi.mesh().clone();
        let mut max_err = 0.0f64;
        let owned = *phi.owned_domain();
        for flat in 0..owned.size() {
            let idx = owned.unflatten(flat);
            let x = mesh.cell_center(idx);
            let f =
                (2.0 * PI * x[0]).sin() * (2.0 * PI * x[1]).sin() * (2.0 * PI * x[2]).sin();
            max_err = max_err.max((lap.at(idx) + k2 * f).abs());
        }
        // O(h²) 截断误差
        let h = 1.0 / n as f64;
        let bound = k2 * (2.0 * PI * h).powi(2);
        assert!(max_err < bound, "max_err={max_err}, bound={bound}");
    }

    #[test]
    fn test_gradient_matches_analytic() {
        let n = 32;
        let (mut phi, mut grad, _) = periodic_pair(n);
        sample_sin(&mut phi);
        fill_halo(&mut phi).unwrap();
        gradient(&phi, &mut grad).unwrap();

        let mesh = phi.mesh().clone();
        let owned = *phi.owned_domain();
        let mut max_err = 0.0f64;
        for flat in 0..owned.size() {
            let idx = owned.unflatten(flat);
            let x = mesh.cell_center(idx);
            let gx = 2.0 * PI
                * (2.0 * PI * x[0]).cos()
                * (2.0 * PI * x[1]).sin()
                * (2.0 * PI * x[2]).sin();
            max_err = max_err.max((grad.at(idx)[0] - gx).abs());
        }
        let h = 1.0 / n as f64;
        assert!(max_err < 2.0 * PI * (2.0 * PI * h).powi(2));
    }

    #[test]
    fn test_divergence_of_gradient_equals_wide_laplacian() {
        // 前向散度(后向梯度)的一致性这里不展开，只验证中心散度
        // 作用在解析梯度上接近解析 Laplacian
        let n = 32;
        let (mut phi, mut grad, mut div) = periodic_pair(n);
        sample_sin(&mut phi);
        fill_halo(&mut phi).unwrap();
        gradient(&phi, &mut grad).unwrap();
        fill_halo(&mut grad).unwrap();
        divergence(&grad, &mut div, DivScheme::Centered).unwrap();

        let k2 = 3.0 * (2.0 * PI).powi(2);
        // 宽模板 Laplacian 与解析值同阶一致
        let mesh = phi.mesh().clone();
        let owned = *phi.owned_domain();
        for flat in 0..owned.size() {
            let idx = owned.unflatten(flat);
            let x = mesh.cell_center(idx);
            let f =
                (2.0 * PI * x[0]).sin() * (2.0 * PI * x[1]).sin() * (2.0 * PI * x[2]).sin();
            let err = (div.at(idx) + k2 * f).abs();
            assert!(err < k2 * 4.0 * (2.0 * PI / n as f64).powi(2) + 1e-9);
        }
    }

    #[test]
    fn test_forward_backward_divergence_on_linear_field() {
        let n = 8;
        let (_, mut v, mut div) = periodic_pair(n);
        // v = (x, 0, 0) 的散度为 1；线性场上前/后向差分均精确
        let mesh = v.mesh().clone();
        v.apply_mut(|idx, val| {
            let x = mesh.cell_center(idx);
            *val = [x[0], 0.0, 0.0];
        });
        // 周期 ghost 会破坏边界邻域的线性性，只检查远离边界的单元
        fill_halo(&mut v).unwrap();
        for scheme in [DivScheme::Forward, DivScheme::Backward, DivScheme::Centered] {
            divergence(&v, &mut div, scheme).unwrap();
            for i in 1..(n as i64 - 1) {
                let d = div.at([i, 4, 4]);
                assert!((d - 1.0).abs() < 1e-12, "{scheme:?} 在 i={i} 给出 {d}");
            }
        }
    }

    #[test]
    fn test_stencil_requires_ghost() {
        let comm = Comm::single();
        let global = NDIndex::with_lengths([4, 4, 4]);
        let layout = Arc::new(
            FieldLayout::all_periodic(comm, global, [AxisDecomp::Parallel; 3], 0).unwrap(),
        );
        let mesh = UniformCartesian::new(global, [0.25; 3], [0.0; 3]);
        let phi: Field<f64, 3> = Field::new(mesh.clone(), layout.clone(), Centering::Cell);
        let mut out: Field<f64, 3> = Field::new(mesh, layout, Centering::Cell);
        assert!(laplacian(&phi, &mut out).is_err());
    }
}
