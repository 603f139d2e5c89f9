// crates/vp_particle/src/error.rs

//! 粒子层错误

use thiserror::Error;
use vp_core::CommError;
use vp_field::FieldError;

/// 粒子层错误
#[derive(Debug, Error)]
pub enum ParticleError {
    /// 粒子位置或插值索引超出域
    #[error("粒子域错误[{operation}]: {reason}")]
    Domain {
        /// 失败操作
        operation: &'static str,
        /// 原因说明
        reason: String,
    },

    /// 属性注册时机或类型错误
    #[error("属性注册错误[{operation}]: {reason}")]
    Registration {
        /// 失败操作
        operation: &'static str,
        /// 原因说明
        reason: String,
    },

    /// 场层错误
    #[error(transparent)]
    Field(#[from] FieldError),

    /// 通信错误（致命）
    #[error("通信失败: {0}")]
    Comm(#[from] CommError),
}
