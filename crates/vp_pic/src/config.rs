// crates/vp_pic/src/config.rs

//! 驱动与均衡器配置

use serde::{Deserialize, Serialize};

/// PIC 驱动配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicConfig {
    /// 场求解器种类 ∈ {"FFT", "CG", "OPEN", "P3M"}
    pub solver: String,
    /// 时间步长
    pub dt: f64,
    /// 负载均衡触发阈值 L_max/L_mean；≥ 1.0，取 1.0 关闭
    pub rebalance_threshold: f64,
    /// 均衡器可用轴位集（第 d 位对应轴 d）
    pub axes_eligible: u64,
    /// 摩擦桩系数 γ；0 关闭
    pub friction_gamma: f64,
}

impl Default for PicConfig {
    fn default() -> Self {
        Self {
            solver: "FFT".to_string(),
            dt: 0.05,
            rebalance_threshold: 1.0,
            axes_eligible: u64::MAX,
            friction_gamma: 0.0,
        }
    }
}
