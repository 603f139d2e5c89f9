// crates/vp_core/src/lib.rs

//! VoltaPIC Core Layer
//!
//! 运行时核心层，提供与物理无关的执行与通信抽象：
//!
//! - [`executor`]: 秩内并行执行策略（串行 / rayon 数据并行 / 自动）
//! - [`comm`]: 秩间通信子抽象与确定性集合通信
//! - [`params`]: 类型化键值参数表
//! - [`error`]: 配置与通信错误
//!
//! # 调度模型
//!
//! 节点间为扁平数据并行（消息传递）；秩内核函数通过不透明的
//! parallel-for 执行，提交顺序串行化，任何集合操作前显式栅栏。
//! 核函数不挂起；集合操作构成跨秩同步点。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod comm;
pub mod error;
pub mod executor;
pub mod params;

pub use comm::{Comm, Communicator, SelfComm, ThreadComm};
pub use error::{CommError, ConfigError};
pub use executor::{for_each, map_mut, ParallelPolicy};
pub use params::{ParamValue, ParameterList};
