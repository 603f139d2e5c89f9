// crates/vp_pic/src/orb.rs

//! 正交递归二分负载均衡
//!
//! 输入为标量权重场（通常取散射后的密度 ρ）与当前布局：
//!
//! 1. 全收集权重得到每秩一致的全局权重数组
//! 2. 在当前区域内对各可用 PARALLEL 轴求切片和，取不均衡
//!    最大的轴，在前缀和最接近权重一半处切分
//! 3. 两个子区域各携带一半秩预算递归，直到每区域一个秩
//!
//! 触发条件：L_max/L_mean 超过阈值（阈值 ≥ 1.0，1.0 关闭）。
//! 所有秩对同一输入得到逐位一致的划分。

use crate::error::PicError;
use vp_field::layout::{AxisDecomp, FieldLayout};
use vp_field::Field;
use vp_foundation::NDIndex;

/// 正交递归二分均衡器
#[derive(Debug, Clone)]
pub struct OrbBalancer<const D: usize> {
    threshold: f64,
    axes_eligible: u64,
}

impl<const D: usize> OrbBalancer<D> {
    /// 创建均衡器
    ///
    /// `threshold` 必须 ≥ 1.0；1.0 表示关闭。`axes_eligible`
    /// 的第 d 位控制轴 d 是否参与切分。
    pub fn new(threshold: f64, axes_eligible: u64) -> Result<Self, PicError> {
        if threshold < 1.0 || !threshold.is_finite() {
            return Err(PicError::Config {
                operation: "OrbBalancer::new",
                source: vp_core::ConfigError::InvalidValue {
                    key: "threshold".to_string(),
                    reason: format!("阈值 {threshold} 必须 ≥ 1.0"),
                },
            });
        }
        Ok(Self {
            threshold,
            axes_eligible,
        })
    }

    /// 是否启用
    #[inline]
    pub fn enabled(&self) -> bool {
        self.threshold > 1.0
    }

    /// 以本地负载（如粒子数）评估当前不均衡度 L_max/L_mean
    pub fn imbalance(
        &self,
        layout: &FieldLayout<D>,
        local_load: f64,
    ) -> Result<f64, PicError> {
        let comm = layout.comm();
        let max = comm.all_reduce_max(local_load)?;
        let total = comm.all_reduce_sum(local_load)?;
        let mean = total / comm.size() as f64;
        if mean <= 0.0 {
            return Ok(1.0);
        }
        Ok(max / mean)
    }

    /// 是否应当触发再均衡
    pub fn should_rebalance(
        &self,
        layout: &FieldLayout<D>,
        local_load: f64,
    ) -> Result<bool, PicError> {
        if !self.enabled() {
            return Ok(false);
        }
        let ratio = self.imbalance(layout, local_load)?;
        tracing::debug!(ratio, threshold = self.threshold, "负载不均衡评估");
        Ok(ratio > self.threshold)
    }

    /// 对权重场做正交递归二分，产出新的每秩子域
    pub fn partition(&self, weights: &Field<f64, D>) -> Result<Vec<NDIndex<D>>, PicError> {
        let layout = weights.layout().clone();
        let comm = layout.comm().clone();
        let nranks = comm.size();
        let global = *layout.global_domain();

        // 全收集权重：每秩装配同一份全局数组
        let local = weights.interior_values();
        let gathered = comm.all_gather_bytes(bytemuck::cast_slice(&local).to_vec())?;
        let mut dense = vec![0.0f64; global.size()];
        for (rank, bytes) in gathered.iter().enumerate() {
            let vals: Vec<f64> = bytemuck::pod_collect_to_vec(bytes);
            let dom = layout.domain_of(rank);
            for (flat, &v) in vals.iter().enumerate() {
                dense[global.flatten(dom.unflatten(flat))] = v;
            }
        }

        // 可切分轴
        let eligible: Vec<usize> = (0..D)
            .filter(|&d| {
                layout.decomp()[d] == AxisDecomp::Parallel && (self.axes_eligible >> d) & 1 == 1
            })
            .collect();
        if eligible.is_empty() {
            return Err(PicError::Config {
                operation: "partition",
                source: vp_core::ConfigError::InvalidValue {
                    key: "axes_eligible".to_string(),
                    reason: "没有可切分的 PARALLEL 轴".to_string(),
                },
            });
        }

        let mut out = Vec::with_capacity(nranks);
        bisect(&global, &dense, &global, &eligible, nranks, &mut out);
        debug_assert_eq!(out.len(), nranks);

        let covered: usize = out.iter().map(|d| d.size()).sum();
        if covered != global.size() {
            return Err(PicError::Step {
                operation: "partition",
                reason: format!("划分覆盖 {covered} 格, 全局 {} 格", global.size()),
            });
        }
        Ok(out)
    }
}

/// 区域内沿 `axis` 的切片权重和
fn slab_sums<const D: usize>(
    global: &NDIndex<D>,
    dense: &[f64],
    region: &NDIndex<D>,
    axis: usize,
) -> Vec<f64> {
    let n = region[axis].length();
    let mut sums = vec![0.0f64; n];
    for flat in 0..region.size() {
        let idx = region.unflatten(flat);
        let slab = (idx[axis] - region[axis].first()) as usize;
        sums[slab] += dense[global.flatten(idx)];
    }
    sums
}

/// 递归二分：每次在最不均衡的轴上按加权中位数切分
fn bisect<const D: usize>(
    global: &NDIndex<D>,
    dense: &[f64],
    region: &NDIndex<D>,
    eligible: &[usize],
    budget: usize,
    out: &mut Vec<NDIndex<D>>,
) {
    if budget == 1 {
        out.push(*region);
        return;
    }
    let lo_budget = budget / 2;
    let hi_budget = budget - lo_budget;

    // 选择切片不均衡度最大的轴；并列取低轴
    let mut best_axis = eligible[0];
    let mut best_score = f64::NEG_INFINITY;
    for &axis in eligible {
        if region[axis].length() < budget {
            continue;
        }
        let sums = slab_sums(global, dense, region, axis);
        let total: f64 = sums.iter().sum();
        let mean = total / sums.len() as f64;
        let max = sums.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let score = if mean > 0.0 { max / mean } else { 1.0 };
        if score > best_score {
            best_score = score;
            best_axis = axis;
        }
    }
    let axis = best_axis;

    let sums = slab_sums(global, dense, region, axis);
    let total: f64 = sums.iter().sum();
    let target = total * lo_budget as f64 / budget as f64;

    // 前缀和最接近目标处切分；两侧至少容纳各自预算的格数
    let n = region[axis].length();
    let min_cut = lo_budget;
    let max_cut = n - hi_budget;
    let mut cut = min_cut;
    let mut best_diff = f64::INFINITY;
    let mut prefix = 0.0;
    for i in 0..n {
        prefix += sums[i];
        let candidate = i + 1;
        if candidate < min_cut || candidate > max_cut {
            continue;
        }
        let diff = (prefix - target).abs();
        if diff < best_diff {
            best_diff = diff;
            cut = candidate;
        }
    }

    let (lo, hi) = region.split_axis(axis, cut);
    bisect(global, dense, &lo, eligible, lo_budget, out);
    bisect(global, dense, &hi, eligible, hi_budget, out);
}

// ============================================================================
// 测试
// ============================================================================
