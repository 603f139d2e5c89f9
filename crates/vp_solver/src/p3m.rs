// crates/vp_solver/src/p3m.rs

//! 粒子-粒子 / 粒子-网格（P3M）混合求解器
//!
//! 把库仑相互作用拆成两部分：
//!
//! - 网格部分：屏蔽 Green 函数 Ĝ(k) = e^(−α²|k|²/4)/(|k|²ε₀)
//!   的周期谱求解（误差函数核的长程光滑项）
//! - 短程部分：截断半径 r_c 内的直接粒子对求和（互补误差
//!   函数核），经单元列表加速
//!
//! α 与 r_c 的配置应使短程贡献在 r_c 处衰减到容差以下。
//! 短程项只覆盖本秩粒子间的最小像对；跨秩粒子对的交换路径
//! 未实现，由 `pp_enabled` 显式控制并记录在设计文档中。
//!
//! 本求解器要求 D = 3。

use crate::error::SolverError;
use crate::poisson::{check_outputs, wavenumber, OutputType, SolverState};
use glam::DVec3;
use std::sync::Arc;
use vp_core::ParameterList;
use vp_field::layout::{AxisDecomp, BoundaryPolicy, FieldLayout};
use vp_field::Field;
use vp_fft::{Complex64, FftOptions, FftRC};
use vp_foundation::NDIndex;
use vp_mesh::{Centering, UniformCartesian};

const SUBSYSTEM: &str = "P3M";

/// P3M 混合求解器
pub struct P3MSolver<const D: usize> {
    params: ParameterList,
    state: SolverState,
    output_type: OutputType,
    mesh: UniformCartesian<D>,
    layout: Arc<FieldLayout<D>>,
    epsilon0: f64,
    alpha: f64,
    r_cut: f64,
    pp_enabled: bool,
    plan: Option<FftRC<D>>,
    rho_hat: Option<Field<Complex64, D>>,
    work_hat: Option<Field<Complex64, D>>,
    work_real: Option<Field<f64, D>>,
}

impl<const D: usize> P3MSolver<D> {
    /// 默认参数表
    pub fn default_parameters() -> ParameterList {
        let mut p = FftOptions::default_parameters();
        p.add("output_type", "GRAD")
            .add("epsilon0", 1.0)
            .add("alpha", 10.0)
            .add("r_cut", 0.25)
            .add("pp_enabled", true);
        p
    }

    /// 在 ρ 的网格与布局上创建求解器
    pub fn new(mesh: UniformCartesian<D>, layout: Arc<FieldLayout<D>>) -> Self {
        Self {
            params: Self::default_parameters(),
            state: SolverState::Uninitialized,
            output_type: OutputType::default(),
            mesh,
            layout,
            epsilon0: 1.0,
            alpha: 10.0,
            r_cut: 0.25,
            pp_enabled: true,
            plan: None,
            rho_hat: None,
            work_hat: None,
            work_real: None,
        }
    }

    /// 合并调用方参数，退回未初始化状态
    pub fn merge_parameters(&mut self, params: &ParameterList) {
        self.params.merge(params);
        self.state = SolverState::Uninitialized;
    }

    /// 当前状态
    pub fn state(&self) -> SolverState {
        self.state
    }

    /// 布局变更：退回未初始化并丢弃缓存
    pub fn relayout(&mut self, mesh: UniformCartesian<D>, layout: Arc<FieldLayout<D>>) {
        self.mesh = mesh;
        self.layout = layout;
        self.plan = None;
        self.rho_hat = None;
        self.work_hat = None;
        self.work_real = None;
        self.state = SolverState::Uninitialized;
    }

    /// 初始化：校验维度与参数并建立 FFT 计划
    pub fn initialize(&mut self) -> Result<(), SolverError> {
        if D != 3 {
            return Err(SolverError::DimensionUnsupported {
                subsystem: SUBSYSTEM,
                dim: D,
            });
        }
        self.output_type = OutputType::from_params(&self.params, SUBSYSTEM)?;
        self.epsilon0 = self.params.get_or("epsilon0", 1.0);
        self.alpha = self.params.get_or("alpha", 10.0);
        self.r_cut = self.params.get_or("r_cut", 0.25);
        self.pp_enabled = self.params.get_or("pp_enabled", true);
        if self.alpha <= 0.0 || self.r_cut <= 0.0 {
            return Err(SolverError::Config {
                subsystem: SUBSYSTEM,
                operation: "initialize",
                source: vp_core::ConfigError::InvalidValue {
                    key: "alpha/r_cut".to_string(),
                    reason: "必须为正".to_string(),
                },
            });
        }

        let axis = self.params.get_or::<usize>("r2c_direction", 0);
        let global = *self.layout.global_domain();
        let mut spec_lengths = global.lengths();
        spec_lengths[axis] = spec_lengths[axis] / 2 + 1;
        let spec_global = NDIndex::with_lengths(spec_lengths);
        let spec_layout = Arc::new(
            FieldLayout::new(
                self.layout.comm().clone(),
                spec_global,
                [AxisDecomp::Parallel; D],
                [[BoundaryPolicy::None; 2]; D],
                0,
            )
            .map_err(SolverError::Field)?,
        );
        let spec_mesh = UniformCartesian::new(spec_global, [1.0; D], [0.0; D]);

        self.plan = Some(FftRC::new(
            self.layout.clone(),
            spec_layout.clone(),
            &self.params,
        )?);
        self.rho_hat = Some(Field::new(
            spec_mesh.clone(),
            spec_layout.clone(),
            Centering::Cell,
        ));
        self.work_hat = Some(Field::new(spec_mesh, spec_layout, Centering::Cell));
        self.work_real = Some(Field::new(
            self.mesh.clone(),
            self.layout.clone(),
            Centering::Cell,
        ));
        self.state = SolverState::Planned;
        Ok(())
    }

    /// 网格部分求解：屏蔽 Green 函数的周期谱解
    pub fn solve(
        &mut self,
        rho: &mut Field<f64, D>,
        mut phi: Option<&mut Field<f64, D>>,
        mut e: Option<&mut Field<[f64; D], D>>,
    ) -> Result<(), SolverError> {
        if self.state == SolverState::Uninitialized {
            return Err(SolverError::InvalidState {
                subsystem: SUBSYSTEM,
                reason: "solve 调用先于 initialize".to_string(),
            });
        }
        if !rho.layout().same_as(&self.layout) {
            return Err(SolverError::LayoutIncompatible {
                subsystem: SUBSYSTEM,
                operation: "solve",
                reason: "ρ 的布局与求解器布局不一致".to_string(),
            });
        }
        check_outputs(SUBSYSTEM, self.output_type, phi.is_some(), e.is_some())?;

        let output_type = self.output_type;
        let n = self.layout.global_domain().lengths();
        let extent = self.mesh.extent();
        let eps = self.epsilon0;
        let alpha = self.alpha;

        let plan = self.plan.as_mut().ok_or(SolverError::InvalidState {
            subsystem: SUBSYSTEM,
            reason: "计划缺失".to_string(),
        })?;
        let mut rho_hat = self.rho_hat.take().ok_or(SolverError::InvalidState {
            subsystem: SUBSYSTEM,
            reason: "谱工作场缺失".to_string(),
        })?;
        let mut work_hat = self.work_hat.take().unwrap_or_else(|| unreachable!());
        let mut work_real = self.work_real.take().unwrap_or_else(|| unreachable!());

        let result = (|| -> Result<(), SolverError> {
            plan.transform(1, rho, &mut rho_hat)?;

            // Ĝ(k) = e^(−α²|k|²/4)/(|k|²ε₀)，Ĝ(0) = 0
            rho_hat.apply_mut(|idx, v| {
                let mut k2 = 0.0;
                for d in 0..D {
                    let k = wavenumber(idx[d], n[d], extent[d], false);
                    k2 += k * k;
                }
                if k2 == 0.0 {
                    *v = Complex64::new(0.0, 0.0);
                } else {
                    *v *= (-alpha * alpha * k2 / 4.0).exp() / (k2 * eps);
                }
            });

            if output_type.wants_sol() {
                let Some(phi) = phi.as_deref_mut() else {
                    unreachable!()
                };
                plan.transform(-1, phi, &mut rho_hat)?;
            }
            if output_type.wants_grad() {
                let Some(e) = e.as_deref_mut() else {
                    unreachable!()
                };
                for d in 0..D {
                    work_hat.apply_mut(|idx, v| {
                        let kd = wavenumber(idx[d], n[d], extent[d], true);
                        *v = rho_hat.at(idx) * Complex64::new(0.0, -kd);
                    });
                    plan.transform(-1, &mut work_real, &mut work_hat)?;
                    e.apply_mut(|idx, v| v[d] = work_real.at(idx));
                }
            }
            Ok(())
        })();

        self.rho_hat = Some(rho_hat);
        self.work_hat = Some(work_hat);
        self.work_real = Some(work_real);
        result?;
        self.state = SolverState::Ready;
        Ok(())
    }
}

impl P3MSolver<3> {
    /// 短程粒子-粒子项：向每个粒子的电场累加截断半径内的
    /// 互补误差函数核贡献（本秩粒子，最小像约定）
    pub fn short_range_field(
        &self,
        positions: &[[f64; 3]],
        charges: &[f64],
        e_out: &mut [[f64; 3]],
    ) -> Result<(), SolverError> {
        if !self.pp_enabled {
            return Ok(());
        }
        if positions.len() != charges.len() || positions.len() != e_out.len() {
            return Err(SolverError::LayoutIncompatible {
                subsystem: SUBSYSTEM,
                operation: "short_range_field",
                reason: "粒子数组长度不一致".to_string(),
            });
        }
        let extent = self.mesh.extent();
        let box_side = DVec3::from_array(extent);
        let cells = CellList::build(positions, extent, self.r_cut);
        let four_pi_eps = 4.0 * std::f64::consts::PI * self.epsilon0;
        let alpha = self.alpha;
        let rc2 = self.r_cut * self.r_cut;

        for i in 0..positions.len() {
            let ri = DVec3::from_array(positions[i]);
            let mut acc = DVec3::ZERO;
            cells.for_neighbors(positions[i], |j| {
                if j == i {
                    return;
                }
                // 最小像
                let mut dr = ri - DVec3::from_array(positions[j]);
                dr -= box_side * (dr / box_side).round();
                let r2 = dr.length_squared();
                if r2 >= rc2 || r2 == 0.0 {
                    return;
                }
                let r = r2.sqrt();
                // E_sr = q_j/(4πε₀)·[erfc(αr)/r² + 2α/√π·e^(−α²r²)/r]·r̂
                let magnitude = (erfc(alpha * r) / r2
                    + 2.0 * alpha / std::f64::consts::PI.sqrt() * (-alpha * alpha * r2).exp()
                        / r)
                    / four_pi_eps;
                acc += dr / r * magnitude * charges[j];
            });
            e_out[i][0] += acc.x;
            e_out[i][1] += acc.y;
            e_out[i][2] += acc.z;
        }
        Ok(())
    }
}

/// 互补误差函数（Abramowitz & Stegun 7.1.26，绝对误差 < 1.5e-7）
pub fn erfc(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    let erf = 1.0 - poly * (-x * x).exp();
    if sign < 0.0 {
        1.0 + erf
    } else {
        1.0 - erf
    }
}

/// 本秩单元列表
///
/// 三趟构建：粒子归格 → 前缀和 → 散射索引。
struct CellList {
    n_cells: [usize; 3],
    cell_size: [f64; 3],
    cell_start: Vec<u32>,
    sorted_indices: Vec<usize>,
}

impl CellList {
    fn build(positions: &[[f64; 3]], extent: [f64; 3], rc: f64) -> Self {
        let mut n_cells = [1usize; 3];
        let mut cell_size = [0.0f64; 3];
        for d in 0..3 {
            n_cells[d] = ((extent[d] / rc).floor() as usize).max(1);
            cell_size[d] = extent[d] / n_cells[d] as f64;
        }
        let total = n_cells[0] * n_cells[1] * n_cells[2];

        // 归格计数
        let mut count = vec![0u32; total];
        let cell_of = |r: &[f64; 3]| -> usize {
            let mut c = [0usize; 3];
            for d in 0..3 {
                let i = (r[d] / cell_size[d]).floor() as i64;
                c[d] = i.rem_euclid(n_cells[d] as i64) as usize;
            }
            (c[0] * n_cells[1] + c[1]) * n_cells[2] + c[2]
        };
        for r in positions {
            count[cell_of(r)] += 1;
        }

        // 前缀和
        let mut cell_start = vec![0u32; total + 1];
        for c in 0..total {
            cell_start[c + 1] = cell_start[c] + count[c];
        }

        // 散射
        let mut cursor = cell_start[..total].to_vec();
        let mut sorted_indices = vec![0usize; positions.len()];
        for (i, r) in positions.iter().enumerate() {
            let c = cell_of(r);
            sorted_indices[cursor[c] as usize] = i;
            cursor[c] += 1;
        }

        Self {
            n_cells,
            cell_size,
            cell_start,
            sorted_indices,
        }
    }

    /// 遍历粒子所在单元及 26 个相邻单元（周期回绕）中的粒子
    fn for_neighbors(&self, r: [f64; 3], mut f: impl FnMut(usize)) {
        let mut home = [0i64; 3];
        for d in 0..3 {
            home[d] = (r[d] / self.cell_size[d]).floor() as i64;
        }
        for dx in -1i64..=1 {
            for dy in -1i64..=1 {
                for dz in -1i64..=1 {
                    let cx = (home[0] + dx).rem_euclid(self.n_cells[0] as i64) as usize;
                    let cy = (home[1] + dy).rem_euclid(self.n_cells[1] as i64) as usize;
                    let cz = (home[2] + dz).rem_euclid(self.n_cells[2] as i64) as usize;
                    let c = (cx * self.n_cells[1] + cy) * self.n_cells[2] + cz;
                    let lo = self.cell_start[c] as usize;
                    let hi = self.cell_start[c + 1] as usize;
                    for &j in &self.sorted_indices[lo..hi] {
                        f(j);
                    }
                }
            }
        }
    }
}

// ============================================================================
// 测试
// ============================================================================
