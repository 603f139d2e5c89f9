// crates/vp_field/src/error.rs

//! 场层错误

use thiserror::Error;
use vp_core::CommError;

/// 场层错误
#[derive(Debug, Error)]
pub enum FieldError {
    /// 布局构造失败
    #[error("场布局[{operation}]: {reason}")]
    Layout {
        /// 失败操作
        operation: &'static str,
        /// 原因说明
        reason: String,
    },

    /// 两个场要求同一布局却不一致
    #[error("布局不匹配[{operation}]: {reason}")]
    LayoutMismatch {
        /// 失败操作
        operation: &'static str,
        /// 原因说明
        reason: String,
    },

    /// 索引或区域超出域
    #[error("域错误[{operation}]: {reason}")]
    Domain {
        /// 失败操作
        operation: &'static str,
        /// 原因说明
        reason: String,
    },

    /// 底层通信失败（致命）
    #[error("通信失败: {0}")]
    Comm(#[from] CommError),
}
