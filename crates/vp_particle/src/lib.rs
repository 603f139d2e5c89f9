// crates/vp_particle/src/lib.rs

//! VoltaPIC 粒子层
//!
//! - [`attrib`]: 逐粒子属性数组与类型擦除的属性槽
//! - [`container`]: 粒子容器（创建、销毁、按位置跨秩重分布）
//! - [`interpolate`]: CIC（cloud-in-cell）scatter / gather
//!
//! 粒子存储为 SoA：容器内所有属性数组长度一致，按注册顺序
//! 定义跨秩序列化的线格式，收发两端无需附带元数据。

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attrib;
pub mod container;
pub mod error;
pub mod interpolate;

pub use attrib::{AttribHandle, ParticleAttrib};
pub use container::ParticleContainer;
pub use error::ParticleError;
pub use interpolate::{gather, scatter};
