// crates/vp_mesh/src/lib.rs

//! VoltaPIC 均匀笛卡尔网格

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cartesian;

pub use cartesian::{Centering, UniformCartesian};
