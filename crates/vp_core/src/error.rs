// crates/vp_core/src/error.rs

//! 配置与通信错误
//!
//! 每个错误携带失败的操作与结构化原因；通信错误在本框架中
//! 视为致命错误，由调用方决定中止方式。

use thiserror::Error;

/// 配置错误
///
/// 在 `initialize` 阶段报告，阻止对象进入 PLANNED 状态。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 缺少必需键
    #[error("配置缺少必需键: {key}")]
    MissingKey {
        /// 键名
        key: String,
    },

    /// 键已存在但类型不符
    #[error("配置键 {key} 类型不符, 期望 {expected}")]
    WrongType {
        /// 键名
        key: String,
        /// 期望类型名
        expected: &'static str,
    },

    /// update 遇到不存在的键
    #[error("配置更新遇到未知键: {key}")]
    UnknownKey {
        /// 键名
        key: String,
    },

    /// 枚举值超出定义范围
    #[error("配置键 {key} 取值无效: {reason}")]
    InvalidValue {
        /// 键名
        key: String,
        /// 原因说明
        reason: String,
    },
}

/// 通信错误（致命）
#[derive(Debug, Error)]
pub enum CommError {
    /// 接收超时（对端缺失或死锁）
    #[error("通信接收超时: rank {rank} 等待来自 rank {from} 的 tag {tag:#x}")]
    RecvTimeout {
        /// 本秩
        rank: usize,
        /// 期望的发送方
        from: usize,
        /// 消息标签
        tag: u64,
    },

    /// 协议误用（如单秩通信子上的阻塞接收无消息可取）
    #[error("通信协议误用[{operation}]: {reason}")]
    Protocol {
        /// 失败操作
        operation: &'static str,
        /// 原因说明
        reason: String,
    },

    /// 消息长度与元素大小不整除
    #[error("通信消息长度非法: {len} 字节无法按 {elem} 字节切分")]
    BadLength {
        /// 字节长度
        len: usize,
        /// 元素大小
        elem: usize,
    },
}
