// crates/vp_fft/src/lib.rs

//! VoltaPIC 分布式 FFT 服务
//!
//! 在场布局上提供四种变换，全部建立在同一个抽象计划上
//! （内部拷入 → 逐轴后端调用 → 拷出），区别只在暂存形状与
//! 后端变体：
//!
//! - [`FftCC`]: 复到复，单场原位，方向 ∈ {+1, -1}
//! - [`FftRC`]: 实 ↔ 复，输入输出布局各异，r2c 轴长度减半
//! - [`FftSine`]: 实到实 DST-I，原位
//! - [`FftCos`]: 实到实 DCT-I，原位
//!
//! 服务把输入场的内部单元拷入稠密无 ghost 的轴主序暂存块，
//! 逐轴做 1D 变换；分布轴先经可配置的重分布算法换成该轴连续
//! 的 pencil 分布。前向变换乘 1/N，逆向不缩放。
//!
//! 暂存缓冲跨调用保留并单调增长。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod brick;
pub mod error;
pub mod plan;
pub mod reshape;

pub use error::FftError;
pub use plan::{FftCC, FftCos, FftOptions, FftRC, FftSine};
pub use reshape::ReshapeAlgorithm;

/// 复数标量（双精度）
pub type Complex64 = num_complex::Complex<f64>;
