// crates/vp_solver/src/periodic.rs

//! 全周期谱 Poisson 求解器
//!
//! 算法：
//! 1. ρ 的 r2c 前向 FFT → ρ̂
//! 2. ρ̂(k) 乘 Green 函数 Ĝ(k) = 1/(|k|² ε₀)，Ĝ(0) := 0
//!    （强制零均值电势）
//! 3. GRAD 输出按分量做 −i k_d · φ̂ 的逆变换 → E；SOL 输出
//!    直接逆变换 φ̂ → φ
//!
//! |k|² 由整数波数除以物理长度得到，r2c 减半轴只存下半谱。

use crate::error::SolverError;
use crate::poisson::{check_outputs, wavenumber, OutputType, SolverState};
use std::sync::Arc;
use vp_core::ParameterList;
use vp_field::layout::{AxisDecomp, BoundaryPolicy, FieldLayout};
use vp_field::Field;
use vp_fft::{Complex64, FftOptions, FftRC};
use vp_foundation::NDIndex;
use vp_mesh::{Centering, UniformCartesian};

const SUBSYSTEM: &str = "PeriodicPoisson";

/// 全周期谱 Poisson 求解器
pub struct PeriodicPoissonSolver<const D: usize> {
    params: ParameterList,
    state: SolverState,
    output_type: OutputType,
    mesh: UniformCartesian<D>,
    layout: Arc<FieldLayout<D>>,
    epsilon0: f64,
    plan: Option<FftRC<D>>,
    rho_hat: Option<Field<Complex64, D>>,
    work_hat: Option<Field<Complex64, D>>,
    work_real: Option<Field<f64, D>>,
}

impl<const D: usize> PeriodicPoissonSolver<D> {
    /// 默认参数表（FFT 默认 + 求解器键）
    pub fn default_parameters() -> ParameterList {
        let mut p = FftOptions::default_parameters();
        p.add("output_type", "GRAD").add("epsilon0", 1.0);
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
            plan: None,
            rho_hat: None,
            work_hat: None,
            work_real: None,
        }
    }

    /// 合并调用方参数（冲突时覆盖），退回未初始化状态
    pub fn merge_parameters(&mut self, params: &ParameterList) {
        self.params.merge(params);
        self.state = SolverState::Uninitialized;
    }

    /// 按已有键更新参数；未知键报配置错误
    pub fn update_parameters(&mut self, params: &ParameterList) -> Result<(), SolverError> {
        self.params
            .update(params)
            .map_err(|source| SolverError::Config {
                subsystem: SUBSYSTEM,
                operation: "update_parameters",
                source,
            })?;
        self.state = SolverState::Uninitialized;
        Ok(())
    }

    /// 当前状态
    pub fn state(&self) -> SolverState {
        self.state
    }

    /// 布局变更：退回未初始化并丢弃计划
    pub fn relayout(&mut self, mesh: UniformCartesian<D>, layout: Arc<FieldLayout<D>>) {
        self.mesh = mesh;
        self.layout = layout;
        self.plan = None;
        self.rho_hat = None;
        self.work_hat = None;
        self.work_real = None;
        self.state = SolverState::Uninitialized;
    }

    /// 初始化：解析配置并建立 FFT 计划
    pub fn initialize(&mut self) -> Result<(), SolverError> {
        self.output_type = OutputType::from_params(&self.params, SUBSYSTEM)?;
        self.epsilon0 = self.params.get_or("epsilon0", 1.0);
        let axis = self.params.get_or::<usize>("r2c_direction", 0);
        if axis >= D {
            return Err(SolverError::Config {
                subsystem: SUBSYSTEM,
                operation: "initialize",
                source: vp_core::ConfigError::InvalidValue {
                    key: "r2c_direction".to_string(),
                    reason: format!("轴 {axis} 超出维度 {D}"),
                },
            });
        }

        // 半谱布局
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
        tracing::debug!(subsystem = SUBSYSTEM, "求解器已规划");
        Ok(())
    }

    /// 求解：输出写入调用方提供的 φ 与/或 E
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
        let layout = self.layout.clone();
        let n = layout.global_domain().lengths();
        let extent = self.mesh.extent();
        let eps = self.epsilon0;

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
            // 前向 r2c
            plan.transform(1, rho, &mut rho_hat)?;

            // 乘 Green 函数 Ĝ(k) = 1/(|k|² ε₀)，Ĝ(0) = 0
            rho_hat.apply_mut(|idx, v| {
                let mut k2 = 0.0;
                for d in 0..D {
                    let k = wavenumber(idx[d], n[d], extent[d], false);
                    k2 += k * k;
                }
                if k2 == 0.0 {
                    *v = Complex64::new(0.0, 0.0);
                } else {
                    *v *= 1.0 / (k2 * eps);
                }
            });

            // 电势输出
            if output_type.wants_sol() {
                let Some(phi) = phi.as_deref_mut() else {
                    unreachable!()
                };
                if !phi.layout().same_as(&layout) {
                    return Err(SolverError::LayoutIncompatible {
                        subsystem: SUBSYSTEM,
                        operation: "solve",
                        reason: "φ 的布局与 ρ 不一致".to_string(),
                    });
                }
                plan.transform(-1, phi, &mut rho_hat)?;
            }

            // 电场输出：Ê_d = −i k_d φ̂
            if output_type.wants_grad() {
                let Some(e) = e.as_deref_mut() else {
                    unreachable!()
                };
                if !e.layout().same_as(&layout) {
                    return Err(SolverError::LayoutIncompatible {
                        subsystem: SUBSYSTEM,
                        operation: "solve",
                        reason: "E 的布局与 ρ 不一致".to_string(),
                    });
                }
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

// ============================================================================
// 测试
// ============================================================================
