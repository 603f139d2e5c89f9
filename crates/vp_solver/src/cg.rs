// crates/vp_solver/src/cg.rs

//! 共轭梯度 Poisson 求解器
//!
//! 对称正定系统 `−∇²φ = ρ/ε₀` 的（预处理）CG 迭代，算子为
//! 7 点 Laplacian 模板，每次作用前刷新 halo。内积走确定性
//! 集合归约，迭代行为跨分解方式一致。
//!
//! 全周期布局下系统有常数零空间：右端先去均值，解的均值为零。
//!
//! 预处理器：
//! - 无预处理（单位矩阵）
//! - Jacobi（对角）预处理；均匀网格上对角元为常数 Σ_d 2/h_d²

use crate::error::SolverError;
use crate::poisson::{check_outputs, OutputType, SolverState};
use std::sync::Arc;
use vp_core::ParameterList;
use vp_field::halo::fill_halo;
use vp_field::layout::FieldLayout;
use vp_field::stencil;
use vp_field::Field;
use vp_mesh::{Centering, UniformCartesian};

const SUBSYSTEM: &str = "CgPoisson";

/// 预处理器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preconditioner {
    /// 无预处理
    None,
    /// Jacobi（对角）预处理
    #[default]
    Jacobi,
}

/// CG 求解结果
#[derive(Debug, Clone, Copy)]
pub struct CgResult {
    /// 是否收敛
    pub converged: bool,
    /// 实际迭代次数
    pub iterations: usize,
    /// 最终残差范数
    pub residual_norm: f64,
    /// 初始残差范数
    pub initial_residual_norm: f64,
}

/// 共轭梯度 Poisson 求解器
pub struct CgPoissonSolver<const D: usize> {
    params: ParameterList,
    state: SolverState,
    output_type: OutputType,
    mesh: UniformCartesian<D>,
    layout: Arc<FieldLayout<D>>,
    epsilon0: f64,
    tolerance: f64,
    max_iter: usize,
    preconditioner: Preconditioner,
    last_result: Option<CgResult>,
}

impl<const D: usize> CgPoissonSolver<D> {
    /// 默认参数表
    pub fn default_parameters() -> ParameterList {
        let mut p = ParameterList::new();
        p.add("output_type", "SOL")
            .add("epsilon0", 1.0)
            .add("tolerance", 1e-10)
            .add("max_iter", 1000usize)
            .add("preconditioner", "JACOBI");
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
            tolerance: 1e-10,
            max_iter: 1000,
            preconditioner: Preconditioner::default(),
            last_result: None,
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
        self.state = SolverState::Uninitialized;
    }

    /// 最近一次求解的迭代信息
    pub fn last_result(&self) -> Option<&CgResult> {
        self.last_result.as_ref()
    }

    /// 初始化：解析配置
    pub fn initialize(&mut self) -> Result<(), SolverError> {
        self.output_type = OutputType::from_params(&self.params, SUBSYSTEM)?;
        self.epsilon0 = self.params.get_or("epsilon0", 1.0);
        self.tolerance = self.params.get_or("tolerance", 1e-10);
        self.max_iter = self.params.get_or("max_iter", 1000usize);
        self.preconditioner = match self
            .params
            .get_or::<String>("preconditioner", "JACOBI".to_string())
            .as_str()
        {
            "NONE" => Preconditioner::None,
            "JACOBI" => Preconditioner::Jacobi,
            other => {
                return Err(SolverError::Config {
                    subsystem: SUBSYSTEM,
                    operation: "initialize",
                    source: vp_core::ConfigError::InvalidValue {
                        key: "preconditioner".to_string(),
                        reason: format!("未知预处理器 {other}"),
                    },
                })
            }
        };
        if self.layout.ghost_width() < 1 {
            return Err(SolverError::LayoutIncompatible {
                subsystem: SUBSYSTEM,
                operation: "initialize",
                reason: "Laplacian 模板要求 ghost 宽度至少为 1".to_string(),
            });
        }
        self.state = SolverState::Planned;
        Ok(())
    }

    /// 求解；φ 必填，E 按配置可选
    pub fn solve(
        &mut self,
        rho: &Field<f64, D>,
        phi: &mut Field<f64, D>,
        mut e: Option<&mut Field<[f64; D], D>>,
    ) -> Result<(), SolverError> {
        if self.state == SolverState::Uninitialized {
            return Err(SolverError::InvalidState {
                subsystem: SUBSYSTEM,
                reason: "solve 调用先于 initialize".to_string(),
            });
        }
        rho.check_same_layout(phi, "CgPoisson::solve")?;
        if !rho.layout().same_as(&self.layout) {
            return Err(SolverError::LayoutIncompatible {
                subsystem: SUBSYSTEM,
                operation: "solve",
                reason: "ρ 的布局与求解器布局不一致".to_string(),
            });
        }
        check_outputs(SUBSYSTEM, self.output_type, true, e.is_some())?;

        // 右端 b = ρ/ε₀；全周期下去均值以消除常数零空间
        let mut b = Field::new(self.mesh.clone(), self.layout.clone(), Centering::Cell);
        let eps = self.epsilon0;
        b.apply_mut(|idx, v| *v = rho.at(idx) / eps);
        if self.layout.is_all_periodic() {
            let mean = b.sum()? / self.layout.global_domain().size() as f64;
            b.apply_mut(|_, v| *v -= mean);
        }

        // 工作场
        let mut r = Field::new(self.mesh.clone(), self.layout.clone(), Centering::Cell);
        let mut p = Field::new(self.mesh.clone(), self.layout.clone(), Centering::Cell);
        let mut ap = Field::new(self.mesh.clone(), self.layout.clone(), Centering::Cell);

        // 对角元（均匀网格上为常数）
        let h = self.mesh.spacing();
        let diag: f64 = (0..D).map(|d| 2.0 / (h[d] * h[d])).sum();
        let precond = match self.preconditioner {
            Preconditioner::None => 1.0,
            Preconditioner::Jacobi => 1.0 / diag,
        };

        // x0 = 0 → r0 = b
        phi.fill(0.0);
        r.apply_mut(|idx, v| *v = b.at(idx));
        let b_norm = b.l2()?;
        let initial_residual_norm = b_norm;
        // z = M⁻¹r 为标量缩放, p0 = z0
        p.apply_mut(|idx, v| *v = precond * r.at(idx));
        let mut rz = r.inner_product(&p)?;

        let mut result = CgResult {
            converged: b_norm == 0.0,
            iterations: 0,
            residual_norm: b_norm,
            initial_residual_norm,
        };

        if !result.converged {
            for iter in 0..self.max_iter {
                // ap = A p = −∇²p
                fill_halo(&mut p)?;
                stencil::laplacian(&p, &mut ap)?;
                ap.apply_mut(|_, v| *v = -*v);
                // 避免借 p 自身：先算内积
                let p_ap = p.inner_product(&ap)?;
                let alpha = rz / p_ap;

                phi.apply_mut(|idx, v| *v += alpha * p.at(idx));
                r.apply_mut(|idx, v| *v -= alpha * ap.at(idx));

                let r_norm = r.l2()?;
                result.iterations = iter + 1;
                result.residual_norm = r_norm;
                if r_norm < self.tolerance * b_norm + 1e-300 {
                    result.converged = true;
                    break;
                }

                let rz_new = {
                    // <r, M⁻¹r> = precond · <r, r>
                    precond * r.inner_product(&r)?
                };
                let beta = rz_new / rz;
                rz = rz_new;
                p.apply_mut(|idx, v| *v = precond * r.at(idx) + beta * *v);
            }
        }

        tracing::debug!(
            subsystem = SUBSYSTEM,
            converged = result.converged,
            iterations = result.iterations,
            residual = result.residual_norm,
            "CG 求解完成"
        );

        if self.output_type.wants_grad() {
            let Some(e) = e.as_deref_mut() else {
                unreachable!()
            };
            // E = −∇φ
            fill_halo(phi)?;
            stencil::gradient(phi, e)?;
            e.apply_mut(|_, v| {
                for x in v.iter_mut() {
                    *x = -*x;
                }
            });
        }

        self.last_result = Some(result);
        self.state = SolverState::Ready;
        Ok(())
    }
}

// ============================================================================
// 测试
// ============================================================================
