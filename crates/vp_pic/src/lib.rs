// crates/vp_pic/src/lib.rs

//! VoltaPIC PIC 驱动层
//!
//! - [`orb`]: 密度驱动的正交递归二分负载均衡
//! - [`driver`]: 蛙跳（kick-drift-kick）时间推进，穿插
//!   scatter / 求解 / gather 与机会式再均衡
//! - [`config`]: 驱动与均衡器的配置
//!
//! 每步数据流：粒子 → CIC scatter → 密度场 → halo 交换 →
//! Poisson 求解 → 梯度 → halo 交换 → CIC gather → 粒子受力 →
//! 蛙跳更新 → 粒子重分布 →（可选）负载均衡。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod driver;
pub mod error;
pub mod orb;

pub use config::PicConfig;
pub use driver::{FieldSolver, PicDriver};
pub use error::PicError;
pub use orb::OrbBalancer;
