// crates/vp_solver/src/error.rs

//! 求解器错误

use thiserror::Error;
use vp_core::ConfigError;
use vp_fft::FftError;
use vp_field::FieldError;

/// 求解器错误
#[derive(Debug, Error)]
pub enum SolverError {
    /// 算法对当前维度不可用
    #[error("求解器[{subsystem}]维度不支持: D={dim}")]
    DimensionUnsupported {
        /// 子系统名
        subsystem: &'static str,
        /// 维度
        dim: usize,
    },

    /// 配置错误（在 initialize 阶段报告）
    #[error("求解器[{subsystem}::{operation}]配置错误: {source}")]
    Config {
        /// 子系统名
        subsystem: &'static str,
        /// 失败操作
        operation: &'static str,
        /// 底层配置错误
        source: ConfigError,
    },

    /// 输入输出布局不满足要求
    #[error("求解器[{subsystem}::{operation}]布局不兼容: {reason}")]
    LayoutIncompatible {
        /// 子系统名
        subsystem: &'static str,
        /// 失败操作
        operation: &'static str,
        /// 原因说明
        reason: String,
    },

    /// 状态机违例（未初始化即求解等）
    #[error("求解器[{subsystem}]状态违例: {reason}")]
    InvalidState {
        /// 子系统名
        subsystem: &'static str,
        /// 原因说明
        reason: String,
    },

    /// FFT 后端失败；当前计划作废，须重建
    #[error("求解器后端错误: {0}")]
    Backend(#[from] FftError),

    /// 场层错误
    #[error(transparent)]
    Field(#[from] FieldError),

    /// 粒子层错误
    #[error(transparent)]
    Particle(#[from] vp_particle::ParticleError),
}
