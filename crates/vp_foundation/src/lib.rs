// crates/vp_foundation/src/lib.rs

//! VoltaPIC Foundation Layer
//!
//! 零依赖基础层，提供整个项目的基础抽象。
//!
//! # 模块概览
//!
//! - [`range`]: 一维闭区间索引 `IndexRange`
//! - [`ndindex`]: N 维索引域 `NDIndex<D>` 及其代数运算
//! - [`error`]: 统一基础错误类型
//! - [`sum`]: 确定性求和（成对归约树 + Kahan 补偿）
//! - [`tolerance`]: 浮点比较工具
//!
//! # 设计原则
//!
//! 1. **零外部依赖**: 仅依赖 serde 与 num-traits
//! 2. **维度泛型**: 通过 const generics 区分 1D/2D/3D，核函数只写一份
//! 3. **确定性**: 所有归约顺序固定，跨分解方式结果逐位一致

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod ndindex;
pub mod range;
pub mod sum;
pub mod tolerance;

pub use error::{VpError, VpResult};
pub use ndindex::NDIndex;
pub use range::IndexRange;
pub use sum::{pairwise_sum, KahanSum};
