// crates/vp_solver/src/poisson.rs

//! 求解器公共基座
//!
//! 输出种类、状态机与波数工具。各求解器持有一份参数表，
//! `merge_parameters` 合并调用方配置并退回未初始化状态；
//! `update_parameters` 拒绝未知键。

use crate::error::SolverError;
use vp_core::{ConfigError, ParameterList};

/// 求解输出种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputType {
    /// 仅电势 φ
    Sol,
    /// 仅电场 E = −∇φ
    #[default]
    Grad,
    /// 电势与电场
    SolAndGrad,
}

impl OutputType {
    /// 是否需要电势输出
    #[inline]
    pub fn wants_sol(self) -> bool {
        matches!(self, Self::Sol | Self::SolAndGrad)
    }

    /// 是否需要电场输出
    #[inline]
    pub fn wants_grad(self) -> bool {
        matches!(self, Self::Grad | Self::SolAndGrad)
    }

    /// 从参数表解析 `output_type`
    pub fn from_params(
        params: &ParameterList,
        subsystem: &'static str,
    ) -> Result<Self, SolverError> {
        let tag: String = params.get("output_type").map_err(|source| {
            SolverError::Config {
                subsystem,
                operation: "output_type",
                source,
            }
        })?;
        match tag.as_str() {
            "SOL" => Ok(Self::Sol),
            "GRAD" => Ok(Self::Grad),
            "SOL_AND_GRAD" => Ok(Self::SolAndGrad),
            other => Err(SolverError::Config {
                subsystem,
                operation: "output_type",
                source: ConfigError::InvalidValue {
                    key: "output_type".to_string(),
                    reason: format!("未知输出种类 {other}"),
                },
            }),
        }
    }
}

/// 求解器状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverState {
    /// 未初始化（新建或布局已变更）
    #[default]
    Uninitialized,
    /// 已规划（initialize 完成）
    Planned,
    /// 已就绪（至少完成一次 solve，幂等）
    Ready,
}

/// 周期网格的整数波数 → 物理波数
///
/// `m` 为谱索引（0..n-1 或 r2c 半谱 0..n/2），`n` 为该轴格点
/// 数，`extent` 为物理长度。上半谱映射为负频。`deriv` 为真时
/// Nyquist 模取零，保持奇导数的共轭对称。
#[inline]
pub fn wavenumber(m: i64, n: usize, extent: f64, deriv: bool) -> f64 {
    let n = n as i64;
    let wrapped = if m > n / 2 { m - n } else { m };
    if deriv && n % 2 == 0 && m == n / 2 {
        return 0.0;
    }
    2.0 * std::f64::consts::PI * wrapped as f64 / extent
}

/// 校验输出场与配置的匹配
pub fn check_outputs(
    subsystem: &'static str,
    output_type: OutputType,
    has_phi: bool,
    has_grad: bool,
) -> Result<(), SolverError> {
    if output_type.wants_sol() && !has_phi {
        return Err(SolverError::LayoutIncompatible {
            subsystem,
            operation: "solve",
            reason: "配置要求电势输出, 但未提供 φ 场".to_string(),
        });
    }
    if output_type.wants_grad() && !has_grad {
        return Err(SolverError::LayoutIncompatible {
            subsystem,
            operation: "solve",
            reason: "配置要求电场输出, 但未提供 E 场".to_string(),
        });
    }
    Ok(())
}

// ============================================================================
// 测试
// ============================================================================
