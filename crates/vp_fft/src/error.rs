// crates/vp_fft/src/error.rs

//! FFT 服务错误

use thiserror::Error;
use vp_core::{CommError, ConfigError};
use vp_field::FieldError;

/// FFT 服务错误
#[derive(Debug, Error)]
pub enum FftError {
    /// 维度超出后端支持范围
    #[error("FFT 维度不支持: D={0} (后端至多 3 维)")]
    UnsupportedDim(usize),

    /// 变换方向不在 {+1, -1}
    #[error("FFT 方向非法: {0} (仅允许 +1 前向与 -1 逆向)")]
    UnknownDirection(i32),

    /// 重分布算法标签不在枚举内
    #[error("FFT 重分布算法未识别: {0}")]
    UnknownComm(String),

    /// 配置键缺失或取值非法
    #[error("FFT 配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 布局不满足变换要求
    #[error("FFT 布局不匹配[{operation}]: {reason}")]
    LayoutMismatch {
        /// 失败操作
        operation: &'static str,
        /// 原因说明
        reason: String,
    },

    /// 后端失败
    #[error("FFT 后端错误[{operation}]: {reason}")]
    Backend {
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
