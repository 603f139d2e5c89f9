// crates/vp_field/src/remap.rs

//! 矩形区域打包与重分布
//!
//! 两个布局间拥有单元的迁移、halo 填充/回写与 FFT 重分布都
//! 归结为同一原语：按交集区域在行主序下打包/解包。区域用全局
//! 索引描述，双方各自从共享的布局知识推出同一份区域清单，
//! 消息无需附带元数据。

use crate::error::FieldError;
use bytemuck::Pod;
use std::ops::AddAssign;
use vp_foundation::NDIndex;

/// 从分配域 `alloc` 上的数组中按行主序拷出 `region` 的值
///
/// `region` 为空时返回空向量；调用者保证 `region ⊆ alloc`。
pub fn pack_region<T: Pod, const D: usize>(
    alloc: &NDIndex<D>,
    data: &[T],
    region: &NDIndex<D>,
) -> Vec<T> {
    let mut out = Vec::with_capacity(region.size());
    for flat in 0..region.size() {
        let idx = region.unflatten(flat);
        out.push(data[alloc.flatten(idx)]);
    }
    out
}

/// 将值按行主序写入 `alloc` 上数组的 `region` 区域
pub fn unpack_region<T: Pod, const D: usize>(
    alloc: &NDIndex<D>,
    data: &mut [T],
    region: &NDIndex<D>,
    values: &[T],
) -> Result<(), FieldError> {
    if values.len() != region.size() {
        return Err(FieldError::Domain {
            operation: "unpack_region",
            reason: format!("收到 {} 个值, 区域 {} 格", values.len(), region.size()),
        });
    }
    for (flat, &v) in values.iter().enumerate() {
        let idx = region.unflatten(flat);
        data[alloc.flatten(idx)] = v;
    }
    Ok(())
}

/// 将值累加进 `region` 区域（halo 回写使用）
pub fn unpack_region_add<T: Pod + AddAssign, const D: usize>(
    alloc: &NDIndex<D>,
    data: &mut [T],
    region: &NDIndex<D>,
    values: &[T],
) -> Result<(), FieldError> {
    if values.len() != region.size() {
        return Err(FieldError::Domain {
            operation: "unpack_region_add",
            reason: format!("收到 {} 个值, 区域 {} 格", values.len(), region.size()),
        });
    }
    for (flat, &v) in values.iter().enumerate() {
        let idx = region.unflatten(flat);
        data[alloc.flatten(idx)] += v;
    }
    Ok(())
}

// ============================================================================
// 测试
// ============================================================================
