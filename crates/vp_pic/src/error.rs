// crates/vp_pic/src/error.rs

//! PIC 驱动错误

use thiserror::Error;
use vp_core::{CommError, ConfigError};
use vp_field::FieldError;
use vp_particle::ParticleError;
use vp_solver::SolverError;

/// PIC 驱动错误
#[derive(Debug, Error)]
pub enum PicError {
    /// 配置错误
    #[error("PIC[{operation}]配置错误: {source}")]
    Config {
        /// 失败操作
        operation: &'static str,
        /// 底层配置错误
        source: ConfigError,
    },

    /// 步进中的不变量违例
    #[error("PIC[{operation}]: {reason}")]
    Step {
        /// 失败操作
        operation: &'static str,
        /// 原因说明
        reason: String,
    },

    /// 求解器错误
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// 粒子层错误
    #[error(transparent)]
    Particle(#[from] ParticleError),

    /// 场层错误
    #[error(transparent)]
    Field(#[from] FieldError),

    /// 通信错误（致命）
    #[error("通信失败: {0}")]
    Comm(#[from] CommError),
}
