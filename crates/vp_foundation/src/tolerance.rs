// crates/vp_foundation/src/tolerance.rs

//! 浮点比较工具
//!
//! 测试与数值守卫共用的容差常量与比较函数。

/// 默认绝对容差
pub const ABS_TOL: f64 = 1e-12;

/// 默认相对容差
pub const REL_TOL: f64 = 1e-10;

/// 绝对误差比较
#[inline]
pub fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

/// 相对误差（分母取两者较大的绝对值，下限 1）
#[inline]
pub fn rel_err(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approx_eq() {
        assert!(approx_eq(1.0, 1.0 + 1e-13, ABS_TOL));
        assert!(!approx_eq(1.0, 1.1, ABS_TOL));
    }

    #[test]
    fn test_rel_err() {
        assert!(rel_err(1e10, 1e10 + 1.0) < 1e-9);
        assert_eq!(rel_err(0.0, 0.0), 0.0);
    }
}
