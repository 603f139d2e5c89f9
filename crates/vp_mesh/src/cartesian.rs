// crates/vp_mesh/src/cartesian.rs

//! 均匀笛卡尔网格
//!
//! 网格是三元组（索引域，步长 h，原点 o），把索引空间映射到
//! 物理坐标：
//!
//! - 单元中心: `o + (i + 1/2) * h`
//! - 顶点:     `o + i * h`
//!
//! 居中方式（cell / vertex）按场固定，由场携带标签；网格本身
//! 同时提供两套坐标映射。

use serde::{Deserialize, Serialize};
use vp_foundation::NDIndex;

/// 场居中方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Centering {
    /// 单元中心
    #[default]
    Cell,
    /// 顶点
    Vertex,
}

/// 均匀笛卡尔网格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniformCartesian<const D: usize> {
    domain: NDIndex<D>,
    #[serde(with = "serde_arrays")]
    spacing: [f64; D],
    #[serde(with = "serde_arrays")]
    origin: [f64; D],
}

// serde 对任意长度数组缺省实现不足，这里用一个局部模块桥接。
mod serde_arrays {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer, const D: usize>(v: &[f64; D], s: S) -> Result<S::Ok, S::Error> {
        v.as_slice().serialize(s)
    }

    pub fn deserialize<'de, De: Deserializer<'de>, const D: usize>(
        d: De,
    ) -> Result<[f64; D], De::Error> {
        let v: Vec<f64> = Vec::deserialize(d)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("维度长度不匹配"))
    }
}

impl<const D: usize> UniformCartesian<D> {
    /// 由索引域、步长与原点构造
    pub fn new(domain: NDIndex<D>, spacing: [f64; D], origin: [f64; D]) -> Self {
        Self {
            domain,
            spacing,
            origin,
        }
    }

    /// 全局索引域
    #[inline]
    pub fn domain(&self) -> &NDIndex<D> {
        &self.domain
    }

    /// 网格步长
    #[inline]
    pub fn spacing(&self) -> [f64; D] {
        self.spacing
    }

    /// 网格原点
    #[inline]
    pub fn origin(&self) -> [f64; D] {
        self.origin
    }

    /// 各轴物理长度
    pub fn extent(&self) -> [f64; D] {
        let lengths = self.domain.lengths();
        let mut out = [0.0; D];
        for d in 0..D {
            out[d] = lengths[d] as f64 * self.spacing[d];
        }
        out
    }

    /// 单元体积（各轴步长之积）
    pub fn cell_volume(&self) -> f64 {
        self.spacing.iter().product()
    }

    /// 总物理体积
    pub fn total_volume(&self) -> f64 {
        self.extent().iter().product()
    }

    /// 多维索引处的坐标
    pub fn position(&self, idx: [i64; D], centering: Centering) -> [f64; D] {
        let mut out = [0.0; D];
        let shift = match centering {
            Centering::Cell => 0.5,
            Centering::Vertex => 0.0,
        };
        for d in 0..D {
            out[d] = self.origin[d] + (idx[d] as f64 + shift) * self.spacing[d];
        }
        out
    }

    /// 单元中心坐标
    #[inline]
    pub fn cell_center(&self, idx: [i64; D]) -> [f64; D] {
        self.position(idx, Centering::Cell)
    }

    /// 物理坐标所在的单元索引（floor 映射，不做越界截断）
    pub fn locate(&self, point: [f64; D]) -> [i64; D] {
        let mut out = [0i64; D];
        for d in 0..D {
            out[d] = ((point[d] - self.origin[d]) / self.spacing[d]).floor() as i64;
        }
        out
    }
}

// ============================================================================
// 测试
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh8() -> UniformCartesian<3> {
        UniformCartesian::new(
            NDIndex::with_lengths([8, 8, 8]),
            [0.125, 0.125, 0.125],
            [0.0, 0.0, 0.0],
        )
    }

    #[test]
    fn test_extent_volume() {
        let m = mesh8();
        assert_eq!(m.extent(), [1.0, 1.0, 1.0]);
        assert!((m.cell_volume() - 0.125f64.powi(3)).abs() < 1e-15);
        assert!((m.total_volume() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cell_center_and_vertex() {
        let m = mesh8();
        let c = m.cell_center([0, 0, 0]);
        assert!((c[0] - 0.0625).abs() < 1e-15);

        let v = m.position([1, 0, 0], Centering::Vertex);
        assert!((v[0] - 0.125).abs() < 1e-15);
    }

    #[test]
    fn test_locate_inverse_of_center() {
        let m = mesh8();
        for i in 0..8i64 {
            let c = m.cell_center([i, 3, 5]);
            assert_eq!(m.locate(c), [i, 3, 5]);
        }
    }

    #[test]
    fn test_locate_outside() {
        let m = mesh8();
        // 不截断，负索引直接返回
        assert_eq!(m.locate([-0.01, 0.5, 0.5])[0], -1);
        assert_eq!(m.locate([1.01, 0.5, 0.5])[0], 8);
    }
}
