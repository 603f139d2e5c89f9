// crates/vp_solver/src/lib.rs

//! VoltaPIC 静电 Poisson 求解器族
//!
//! 共同契约：输入为布局上的源密度场 ρ，输出写入调用方提供的
//! 电势 φ 与/或电场 E = −∇φ；输出种类由 `output_type` 配置。
//! 所有求解器假定均匀网格。
//!
//! 状态机：`Uninitialized` → `Planned`（首次 `initialize`）→
//! `Ready`（首次 `solve`，此后幂等）；布局变更退回
//! `Uninitialized`。配置错误在 `initialize` 时报告并阻止进入
//! `Planned`。
//!
//! - [`PeriodicPoissonSolver`]: 全周期谱求解（r2c FFT + 1/k²）
//! - [`OpenPoissonSolver`]: 开边界 Hockney / Vico–Greengard
//! - [`P3MSolver`]: 粒子-粒子 / 粒子-网格混合
//! - [`CgPoissonSolver`]: 7 点模板共轭梯度
//! - [`FrictionStub`]: 速度阻尼桩（碰撞算子占位）

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cg;
pub mod error;
pub mod friction;
pub mod open;
pub mod p3m;
pub mod periodic;
pub mod poisson;

pub use cg::{CgPoissonSolver, CgResult};
pub use error::SolverError;
pub use friction::FrictionStub;
pub use open::{OpenAlgorithm, OpenPoissonSolver};
pub use p3m::P3MSolver;
pub use periodic::PeriodicPoissonSolver;
pub use poisson::{OutputType, SolverState};
