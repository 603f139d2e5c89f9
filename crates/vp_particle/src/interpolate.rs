// crates/vp_particle/src/interpolate.rs

//! CIC（cloud-in-cell）插值
//!
//! 一阶线性插值：粒子量按多线性权重分布到包络它的 2^D 个
//! 网格结点（单元中心场的结点即单元中心）：
//!
//! `w_j = ∏_d (1 − |R_d/h_d − i_{j,d}|)`
//!
//! - [`scatter`]: 粒子 → 网格累加；落入 ghost 的贡献经对称
//!   halo 回写归还拥有秩并求和
//! - [`gather`]: 网格 → 粒子读取；要求此前已完成 halo 填充，
//!   本身不再通信
//!
//! 不变量：周期网格上 scatter 后场的全局和等于粒子量之和。

use crate::error::ParticleError;
use vp_field::halo::{fill_halo, flush_halo_add};
use vp_field::Field;

/// 粒子的 CIC 基点与各轴权重
///
/// 返回（基结点索引，各轴高侧权重）。
#[inline]
fn cic_base<const D: usize>(
    r: [f64; D],
    origin: [f64; D],
    spacing: [f64; D],
) -> ([i64; D], [f64; D]) {
    let mut base = [0i64; D];
    let mut frac = [0.0f64; D];
    for d in 0..D {
        // 单元中心场：结点 i 位于 origin + (i + 1/2) h
        let g = (r[d] - origin[d]) / spacing[d] - 0.5;
        let b = g.floor();
        base[d] = b as i64;
        frac[d] = g - b;
    }
    (base, frac)
}

/// 粒子量 scatter 到网格
///
/// `q[i]` 以 CIC 权重累加进 `rho`；完成后执行一次 halo 回写，
/// ghost 累加值归还拥有秩。`rho` 在调用前由调用方清零。
pub fn scatter<const D: usize>(
    q: &[f64],
    rho: &mut Field<f64, D>,
    positions: &[[f64; D]],
) -> Result<(), ParticleError> {
    if q.len() != positions.len() {
        return Err(ParticleError::Domain {
            operation: "scatter",
            reason: format!("属性长度 {} 与位置数 {} 不符", q.len(), positions.len()),
        });
    }
    if rho.nghost() < 1 {
        return Err(ParticleError::Domain {
            operation: "scatter",
            reason: "CIC 需要 ghost 宽度至少为 1".to_string(),
        });
    }
    let origin = rho.mesh().origin();
    let spacing = rho.mesh().spacing();
    let alloc = *rho.allocated_domain();

    for (qi, r) in q.iter().zip(positions) {
        let (base, frac) = cic_base(*r, origin, spacing);
        // 2^D 个包络结点
        for corner in 0..(1usize << D) {
            let mut idx = base;
            let mut w = 1.0f64;
            for d in 0..D {
                if corner >> d & 1 == 1 {
                    idx[d] += 1;
                    w *= frac[d];
                } else {
                    w *= 1.0 - frac[d];
                }
            }
            if !alloc.contains(idx) {
                return Err(ParticleError::Domain {
                    operation: "scatter",
                    reason: format!("粒子 {r:?} 的插值结点 {idx:?} 越出分配域"),
                });
            }
            *rho.at_mut(idx) += qi * w;
        }
    }

    flush_halo_add(rho)?;
    Ok(())
}

/// 网格量 gather 到粒子
///
/// `out[i]` 以 CIC 权重从已完成 halo 填充的场读出。
pub fn gather<const D: usize>(
    out: &mut [[f64; D]],
    field: &Field<[f64; D], D>,
    positions: &[[f64; D]],
) -> Result<(), ParticleError> {
    if out.len() != positions.len() {
        return Err(ParticleError::Domain {
            operation: "gather",
            reason: format!("输出长度 {} 与位置数 {} 不符", out.len(), positions.len()),
        });
    }
    if field.nghost() < 1 {
        return Err(ParticleError::Domain {
            operation: "gather",
            reason: "CIC 需要 ghost 宽度至少为 1".to_string(),
        });
    }
    let origin = field.mesh().origin();
    let spacing = field.mesh().spacing();
    let alloc = *field.allocated_domain();

    for (oi, r) in out.iter_mut().zip(positions) {
        let (base, frac) = cic_base(*r, origin, spacing);
        let mut acc = [0.0f64; D];
        for corner in 0..(1usize << D) {
            let mut idx = base;
            let mut w = 1.0f64;
            for d in 0..D {
                if corner >> d & 1 == 1 {
                    idx[d] += 1;
                    w *= frac[d];
                } else {
                    w *= 1.0 - frac[d];
                }
            }
            if !alloc.contains(idx) {
                return Err(ParticleError::Domain {
                    operation: "gather",
                    reason: format!("粒子 {r:?} 的插值结点 {idx:?} 越出分配域"),
                });
            }
            let v = field.at(idx);
            for d in 0..D {
                acc[d] += w * v[d];
            }
        }
        *oi = acc;
    }
    Ok(())
}

/// 标量场版本的 gather（诊断与测试用）
pub fn gather_scalar<const D: usize>(
    out: &mut [f64],
    field: &Field<f64, D>,
    positions: &[[f64; D]],
) -> Result<(), ParticleError> {
    if out.len() != positions.len() {
        return Err(ParticleError::Domain {
            operation: "gather_scalar",
            reason: format!("输出长度 {} 与位置数 {} 不符", out.len(), positions.len()),
        });
    }
    let origin = field.mesh().origin();
    let spacing = field.mesh().spacing();
    let alloc = *field.allocated_domain();

    for (oi, r) in out.iter_mut().zip(positions) {
        let (base, frac) = cic_base(*r, origin, spacing);
        let mut acc = 0.0f64;
        for corner in 0..(1usize << D) {
            let mut idx = base;
            let mut w = 1.0f64;
            for d in 0..D {
                if corner >> d & 1 == 1 {
                    idx[d] += 1;
                    w *= frac[d];
                } else {
                    w *= 1.0 - frac[d];
                }
            }
            if !alloc.contains(idx) {
                return Err(ParticleError::Domain {
                    operation: "gather_scalar",
                    reason: format!("粒子 {r:?} 的插值结点 {idx:?} 越出分配域"),
                });
            }
            acc += w * field.at(idx);
        }
        *oi = acc;
    }
    Ok(())
}

/// 填充场 halo 后 gather（便捷组合）
pub fn fill_and_gather<const D: usize>(
    out: &mut [[f64; D]],
    field: &mut Field<[f64; D], D>,
    positions: &[[f64; D]],
) -> Result<(), ParticleError> {
    fill_halo(field)?;
    gather(out, field, positions)
}

// ============================================================================
// 测试
// ============================================================================
