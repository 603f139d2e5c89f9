// crates/vp_solver/src/open.rs

//! 开边界（自由空间）Poisson 求解器
//!
//! Hockney 技巧：在每轴加倍的网格上把截断的自由空间 Green
//! 函数与零延拓的 ρ 做循环卷积，再裁剪回原域。Green 函数及其
//! 谱按布局缓存，仅在初始化时计算一次。
//!
//! - `HOCKNEY`: 实空间采样 G(r) = 1/(4πε₀r)，回绕距离取样，
//!   原点用半格距正则化
//! - `VICO`: 解析正则化谱 Ĝ(k) = (1−cos(|k|R))/(|k|²ε₀)，
//!   Ĝ(0) = R²/(2ε₀)，R 取原域对角线长度
//!
//! 本求解器要求 D = 3。

use crate::error::SolverError;
use crate::poisson::{check_outputs, wavenumber, OutputType, SolverState};
use std::sync::Arc;
use vp_core::{ConfigError, ParameterList};
use vp_field::layout::{AxisDecomp, BoundaryPolicy, FieldLayout};
use vp_field::Field;
use vp_fft::brick::DenseBrick;
use vp_fft::reshape::{reshape, ReshapeAlgorithm};
use vp_fft::{Complex64, FftCC, FftOptions};
use vp_foundation::NDIndex;
use vp_mesh::{Centering, UniformCartesian};

const SUBSYSTEM: &str = "OpenPoisson";

/// 开边界算法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenAlgorithm {
    /// 实空间截断 Green 函数
    #[default]
    Hockney,
    /// 解析正则化谱（Vico–Greengard）
    Vico,
}

impl OpenAlgorithm {
    fn from_params(params: &ParameterList) -> Result<Self, SolverError> {
        match params.get_or::<String>("algorithm", "HOCKNEY".to_string()).as_str() {
            "HOCKNEY" => Ok(Self::Hockney),
            "VICO" => Ok(Self::Vico),
            other => Err(SolverError::Config {
                subsystem: SUBSYSTEM,
                operation: "algorithm",
                source: ConfigError::InvalidValue {
                    key: "algorithm".to_string(),
                    reason: format!("未知开边界算法 {other}"),
                },
            }),
        }
    }
}

/// 开边界 Poisson 求解器（Hockney / Vico–Greengard）
pub struct OpenPoissonSolver<const D: usize> {
    params: ParameterList,
    state: SolverState,
    output_type: OutputType,
    algorithm: OpenAlgorithm,
    mesh: UniformCartesian<D>,
    layout: Arc<FieldLayout<D>>,
    epsilon0: f64,
    layout2: Option<Arc<FieldLayout<D>>>,
    plan: Option<FftCC<D>>,
    green_hat: Option<Field<Complex64, D>>,
    work2: Option<Field<Complex64, D>>,
    grad2: Option<Field<Complex64, D>>,
}

impl<const D: usize> OpenPoissonSolver<D> {
    /// 默认参数表
    pub fn default_parameters() -> ParameterList {
        let mut p = FftOptions::default_parameters();
        p.add("output_type", "GRAD")
            .add("epsilon0", 1.0)
            .add("algorithm", "HOCKNEY");
        p
    }

    /// 在 ρ 的网格与布局上创建求解器
    pub fn new(mesh: UniformCartesian<D>, layout: Arc<FieldLayout<D>>) -> Self {
        Self {
            params: Self::default_parameters(),
            state: SolverState::Uninitialized,
            output_type: OutputType::default(),
            algorithm: OpenAlgorithm::default(),
            mesh,
            layout,
            epsilon0: 1.0,
            layout2: None,
            plan: None,
            green_hat: None,
            work2: None,
            grad2: None,
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
        self.layout2 = None;
        self.plan = None;
        self.green_hat = None;
        self.work2 = None;
        self.grad2 = None;
        self.state = SolverState::Uninitialized;
    }

    /// 初始化：建立加倍布局、FFT 计划并缓存 Green 函数谱
    pub fn initialize(&mut self) -> Result<(), SolverError> {
        if D != 3 {
            return Err(SolverError::DimensionUnsupported {
                subsystem: SUBSYSTEM,
                dim: D,
            });
        }
        self.output_type = OutputType::from_params(&self.params, SUBSYSTEM)?;
        self.algorithm = OpenAlgorithm::from_params(&self.params)?;
        self.epsilon0 = self.params.get_or("epsilon0", 1.0);

        // 加倍域
        let lengths = self.layout.global_domain().lengths();
        let mut doubled = [0usize; D];
        for d in 0..D {
            doubled[d] = 2 * lengths[d];
        }
        let global2 = NDIndex::with_lengths(doubled);
        let layout2 = Arc::new(
            FieldLayout::new(
                self.layout.comm().clone(),
                global2,
                [AxisDecomp::Parallel; D],
                [[BoundaryPolicy::None; 2]; D],
                0,
            )
            .map_err(SolverError::Field)?,
        );
        let mesh2 = UniformCartesian::new(global2, self.mesh.spacing(), self.mesh.origin());

        let mut plan = FftCC::new(layout2.clone(), &self.params)?;
        let mut green = Field::<Complex64, D>::new(mesh2.clone(), layout2.clone(), Centering::Cell);
        self.fill_green(&mut green, &global2)?;
        if self.algorithm == OpenAlgorithm::Hockney {
            // 实空间采样的 Green 函数前向变换后缓存
            plan.transform(1, &mut green)?;
        }

        self.work2 = Some(Field::new(mesh2.clone(), layout2.clone(), Centering::Cell));
        self.grad2 = Some(Field::new(mesh2, layout2.clone(), Centering::Cell));
        self.green_hat = Some(green);
        self.plan = Some(plan);
        self.layout2 = Some(layout2);
        self.state = SolverState::Planned;
        tracing::debug!(subsystem = SUBSYSTEM, algorithm = ?self.algorithm, "求解器已规划");
        Ok(())
    }

    /// 按算法填充 Green 函数（实空间样本或解析谱）
    fn fill_green(
        &self,
        green: &mut Field<Complex64, D>,
        global2: &NDIndex<D>,
    ) -> Result<(), SolverError> {
        let h = self.mesh.spacing();
        let eps = self.epsilon0;
        let n2 = global2.lengths();
        match self.algorithm {
            OpenAlgorithm::Hockney => {
                // G(r) = 1/(4πε₀ r)，回绕距离，原点半格距正则化
                let r_min = 0.5 * h.iter().cloned().fold(f64::INFINITY, f64::min);
                green.apply_mut(|idx, v| {
                    let mut r2 = 0.0;
                    for d in 0..D {
                        let m = idx[d].min(n2[d] as i64 - idx[d]);
                        let x = m as f64 * h[d];
                        r2 += x * x;
                    }
                    let r = r2.sqrt().max(r_min);
                    *v = Complex64::new(1.0 / (4.0 * std::f64::consts::PI * eps * r), 0.0);
                });
            }
            OpenAlgorithm::Vico => {
                // Ĝ(k) = (1−cos(|k|R))/(|k|²ε₀)，Ĝ(0) = R²/(2ε₀)
                // 除以 N₂h³ 使其与实空间采样路径的离散谱同标度
                let ext = self.mesh.extent();
                let radius = ext.iter().map(|l| l * l).sum::<f64>().sqrt();
                let cell_vol: f64 = h.iter().product();
                let norm = 1.0 / (global2.size() as f64 * cell_vol);
                let ext2: Vec<f64> = (0..D).map(|d| 2.0 * ext[d]).collect();
                green.apply_mut(|idx, v| {
                    let mut k2 = 0.0;
                    for d in 0..D {
                        let k = wavenumber(idx[d], n2[d], ext2[d], false);
                        k2 += k * k;
                    }
                    let g = if k2 == 0.0 {
                        radius * radius / (2.0 * eps)
                    } else {
                        let k = k2.sqrt();
                        (1.0 - (k * radius).cos()) / (k2 * eps)
                    };
                    *v = Complex64::new(g * norm, 0.0);
                });
            }
        }
        Ok(())
    }

    /// 求解：输出写入调用方提供的 φ 与/或 E
    pub fn solve(
        &mut self,
        rho: &Field<f64, D>,
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
        let comm = self.layout.comm().clone();
        let domains = self.layout.domains().to_vec();
        let layout2 = self.layout2.clone().ok_or(SolverError::InvalidState {
            subsystem: SUBSYSTEM,
            reason: "加倍布局缺失".to_string(),
        })?;
        let domains2 = layout2.domains().to_vec();
        let global2 = *layout2.global_domain();
        let n2 = global2.lengths();
        let ext2: [f64; D] = {
            let ext = self.mesh.extent();
            let mut out = [0.0; D];
            for d in 0..D {
                out[d] = 2.0 * ext[d];
            }
            out
        };
        let cell_vol = self.mesh.cell_volume();
        let scale = global2.size() as f64 * cell_vol;

        let plan = self.plan.as_mut().ok_or(SolverError::InvalidState {
            subsystem: SUBSYSTEM,
            reason: "计划缺失".to_string(),
        })?;
        let green_hat = self.green_hat.take().ok_or(SolverError::InvalidState {
            subsystem: SUBSYSTEM,
            reason: "Green 函数缓存缺失".to_string(),
        })?;
        let mut work2 = self.work2.take().unwrap_or_else(|| unreachable!());
        let mut grad2 = self.grad2.take().unwrap_or_else(|| unreachable!());

        let result = (|| -> Result<(), SolverError> {
            // 零延拓 ρ 到加倍域
            let src = DenseBrick::from_parts(
                *rho.owned_domain(),
                rho.interior_values()
                    .into_iter()
                    .map(|v| Complex64::new(v, 0.0))
                    .collect(),
            );
            let padded = reshape(&comm, &src, &domains, &domains2, ReshapeAlgorithm::AllToAllV)?;
            work2.set_interior(padded.data())?;

            // 卷积：φ̂₂ = N₂h³ · Ĝ · ρ̂₂
            plan.transform(1, &mut work2)?;
            work2.apply_mut(|idx, v| *v *= green_hat.at(idx) * scale);

            if output_type.wants_sol() {
                let Some(phi) = phi.as_deref_mut() else {
                    unreachable!()
                };
                grad2.apply_mut(|idx, v| *v = work2.at(idx));
                plan.transform(-1, &mut grad2)?;
                crop_real(&comm, &grad2, &domains2, &domains, phi)?;
            }

            if output_type.wants_grad() {
                let Some(e) = e.as_deref_mut() else {
                    unreachable!()
                };
                for d in 0..D {
                    grad2.apply_mut(|idx, v| {
                        let kd = wavenumber(idx[d], n2[d], ext2[d], true);
                        *v = work2.at(idx) * Complex64::new(0.0, -kd);
                    });
                    plan.transform(-1, &mut grad2)?;
                    crop_component(&comm, &grad2, &domains2, &domains, e, d)?;
                }
            }
            Ok(())
        })();

        self.green_hat = Some(green_hat);
        self.work2 = Some(work2);
        self.grad2 = Some(grad2);
        result?;
        self.state = SolverState::Ready;
        Ok(())
    }
}

/// 把加倍域上的复场裁剪回原域并取实部写入标量场
fn crop_real<const D: usize>(
    comm: &vp_core::Comm,
    src: &Field<Complex64, D>,
    domains2: &[NDIndex<D>],
    domains: &[NDIndex<D>],
    out: &mut Field<f64, D>,
) -> Result<(), SolverError> {
    let brick = DenseBrick::from_parts(*src.owned_domain(), src.interior_values());
    let cropped = reshape(comm, &brick, domains2, domains, ReshapeAlgorithm::AllToAllV)?;
    let vals: Vec<f64> = cropped.data().iter().map(|c| c.re).collect();
    out.set_interior(&vals)?;
    Ok(())
}

/// 把加倍域上的复场裁剪回原域并取实部写入向量场分量
fn crop_component<const D: usize>(
    comm: &vp_core::Comm,
    src: &Field<Complex64, D>,
    domains2: &[NDIndex<D>],
    domains: &[NDIndex<D>],
    out: &mut Field<[f64; D], D>,
    component: usize,
) -> Result<(), SolverError> {
    let brick = DenseBrick::from_parts(*src.owned_domain(), src.interior_values());
    let cropped = reshape(comm, &brick, domains2, domains, ReshapeAlgorithm::AllToAllV)?;
    let owned = *out.owned_domain();
    let data = cropped.data();
    out.apply_mut(|idx, v| v[component] = data[owned.flatten(idx)].re);
    Ok(())
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;
    use vp_core::Comm;

    fn setup(
        n: usize,
    ) -> (
        UniformCartesian<3>,
        Arc<FieldLayout<3>>,
        Field<f64, 3>,
        Field<f64, 3>,
        Field<[f64; 3], 3>,
    ) {
        let comm = Comm::single();
        let global = NDIndex::with_lengths([n, n, n]);
        let layout = Arc::new(
            FieldLayout::new(
                comm,
                global,
                [AxisDecomp::Parallel; 3],
                [[BoundaryPolicy::None; 2]; 3],
                1,
            )
            .unwrap(),
        );
        let h = 1.0 / n as f64;
        let mesh = UniformCartesian::new(global, [h; 3], [0.0; 3]);
        let rho = Field::new(mesh.clone(), layout.clone(), Centering::Cell);
        let phi = Field::new(mesh.clone(), layout.clone(), Centering::Cell);
        let e = Field::new(mesh.clone(), layout.clone(), Centering::Cell);
        (mesh, layout, rho, phi, e)
    }

    #[test]
    fn test_hockney_point_charge_potential() {
        // 单点电荷的离散卷积恰为 G(r)·q：远场应精确重现 1/(4πr)
        let n = 16usize;
        let (mesh, layout, mut rho, mut phi, mut e) = setup(n);
        let h = 1.0 / n as f64;
        let center = [8i64, 8, 8];
        // 总电荷 1：密度 1/h³
        *rho.at_mut(center) = 1.0 / (h * h * h);

        let mut solver = OpenPoissonSolver::new(mesh, layout);
        let mut p = ParameterList::new();
        p.add("output_type", "SOL_AND_GRAD");
        solver.merge_parameters(&p);
        solver.initialize().unwrap();
        solver.solve(&rho, Some(&mut phi), Some(&mut e)).unwrap();

        for offset in [2i64, 4, 6] {
            let r = offset as f64 * h;
            let expect = 1.0 / (4.0 * PI * r);
            let got = phi.at([8 + offset, 8, 8]);
            let rel = (got - expect).abs() / expect;
            assert!(rel < 1e-8, "offset={offset}: got={got}, expect={expect}");
        }
    }

    #[test]
    fn test_hockney_field_points_outward() {
        let n = 16usize;
        let (mesh, layout, mut rho, _, mut e) = setup(n);
        let h = 1.0 / n as f64;
        *rho.at_mut([8, 8, 8]) = 1.0 / (h * h * h);

        let mut solver = OpenPoissonSolver::new(mesh, layout);
        solver.initialize().unwrap();
        solver.solve(&rho, None, Some(&mut e)).unwrap();

        // 正电荷的 E 场沿径向向外
        assert!(e.at([12, 8, 8])[0] > 0.0);
        assert!(e.at([4, 8, 8])[0] < 0.0);
        assert!(e.at([8, 12, 8])[1] > 0.0);
        // 对称位置幅值相近
        let hi = e.at([12, 8, 8])[0];
        let lo = -e.at([4, 8, 8])[0];
        assert!((hi - lo).abs() / hi < 1e-6);
    }

    #[test]
    fn test_vico_matches_analytic_potential() {
        let n = 16usize;
        let (mesh, layout, mut rho, mut phi, _) = setup(n);
        let h = 1.0 / n as f64;
        *rho.at_mut([8, 8, 8]) = 1.0 / (h * h * h);

        let mut solver = OpenPoissonSolver::new(mesh, layout);
        let mut p = ParameterList::new();
        p.add("output_type", "SOL").add("algorithm", "VICO");
        solver.merge_parameters(&p);
        solver.initialize().unwrap();
        solver.solve(&rho, Some(&mut phi), None).unwrap();

        // 带限重构在点源附近有振铃，远场容差放宽
        for offset in [3i64, 5] {
            let r = offset as f64 * h;
            let expect = 1.0 / (4.0 * PI * r);
            let got = phi.at([8 + offset, 8, 8]);
            let rel = (got - expect).abs() / expect;
            assert!(rel < 0.1, "offset={offset}: got={got}, expect={expect}, rel={rel}");
        }
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let (mesh, layout, ..) = setup(8);
        let mut solver = OpenPoissonSolver::new(mesh, layout);
        let mut p = ParameterList::new();
        p.add("algorithm", "MULTIGRID");
        solver.merge_parameters(&p);
        assert!(solver.initialize().is_err());
        assert_eq!(solver.state(), SolverState::Uninitialized);
    }

    #[test]
    fn test_dimension_guard() {
        let comm = Comm::single();
        let global = NDIndex::<2>::with_lengths([8, 8]);
        let layout = Arc::new(
            FieldLayout::new(
                comm,
                global,
                [AxisDecomp::Parallel; 2],
                [[BoundaryPolicy::None; 2]; 2],
                1,
            )
            .unwrap(),
        );
        let mesh = UniformCartesian::new(global, [0.125; 2], [0.0; 2]);
        let mut solver = OpenPoissonSolver::<2>::new(mesh, layout);
        assert!(matches!(
            solver.initialize(),
            Err(SolverError::DimensionUnsupported { dim: 2, .. })
        ));
    }
}
