// crates/vp_solver/src/friction.rs

//! 速度阻尼桩
//!
//! 碰撞算子的占位实现：对动量施加速度比例阻尼
//! `P ← P·e^(−γΔt)`，在半步 kick 处调用。系数 γ 可配置，
//! 默认为零（关闭）。完整的 Fokker–Planck 摩擦谱在此之外。

use serde::{Deserialize, Serialize};

/// 速度阻尼桩
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrictionStub {
    /// 阻尼系数 γ ≥ 0；0 表示关闭
    pub gamma: f64,
}

impl Default for FrictionStub {
    fn default() -> Self {
        Self { gamma: 0.0 }
    }
}

impl FrictionStub {
    /// 创建阻尼桩
    pub fn new(gamma: f64) -> Self {
        Self { gamma }
    }

    /// 是否生效
    #[inline]
    pub fn is_active(&self) -> bool {
        self.gamma > 0.0
    }

    /// 对动量数组施加一次阻尼
    pub fn apply<const D: usize>(&self, momenta: &mut [[f64; D]], dt: f64) {
        if !self.is_active() {
            return;
        }
        let factor = (-self.gamma * dt).exp();
        for p in momenta {
            for v in p.iter_mut() {
                *v *= factor;
            }
        }
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inactive_by_default() {
        let f = FrictionStub::default();
        assert!(!f.is_active());
        let mut p = [[1.0, 2.0, 3.0]];
        f.apply(&mut p, 0.1);
        assert_eq!(p, [[1.0, 2.0, 3.0]]);
    }

    #[test]
    fn test_exponential_decay() {
        let f = FrictionStub::new(2.0);
        let mut p = [[1.0, -4.0]];
        f.apply(&mut p, 0.5);
        let factor = (-1.0f64).exp();
        assert!((p[0][0] - factor).abs() < 1e-15);
        assert!((p[0][1] + 4.0 * factor).abs() < 1e-15);
    }
}
