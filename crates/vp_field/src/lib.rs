// crates/vp_field/src/lib.rs

//! VoltaPIC 分布式场层
//!
//! 提供结构化网格上的分布式场抽象：
//!
//! - [`layout`]: 全局索引域到秩的划分、ghost 元数据与边界策略
//! - [`field`]: 场存储（内部 + ghost）、逐元素代数与归约
//! - [`expr`]: 惰性逐元素表达式（赋值时求值）
//! - [`halo`]: ghost 填充与反向累加（flush）
//! - [`stencil`]: 二阶中心梯度、Laplacian 与散度
//! - [`remap`]: 两个布局间拥有单元的 all-to-all 重分布
//!
//! # 所有权
//!
//! 每个单元恰有一个拥有秩；ghost 单元的权威值在邻居秩或由
//! 边界算子给出。halo 填充/回写是远端 ghost 值的唯一生产者。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod expr;
pub mod field;
pub mod halo;
pub mod layout;
pub mod remap;
pub mod stencil;

pub use error::FieldError;
pub use expr::FieldExpr;
pub use field::Field;
pub use layout::{AxisDecomp, BoundaryPolicy, FieldLayout, Side};
