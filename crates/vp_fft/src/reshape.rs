// crates/vp_fft/src/reshape.rs

//! 跨秩重分布
//!
//! 把一个稠密块从源分布搬到目标分布。收发区域由双方从共享的
//! 分布描述独立推出（源域与目标域的交集），消息无需元数据。
//!
//! 四种通信日程，数据结果一致：
//!
//! - `AllToAll`: 所有消息填充到统一长度后全交换
//! - `AllToAllV`: 变长全交换
//! - `P2p`: 成对点对点
//! - `P2pPipelined`: 分块流水的成对点对点

use crate::brick::DenseBrick;
use crate::error::FftError;
use bytemuck::Pod;
use vp_core::Comm;
use vp_field::remap::{pack_region, unpack_region};
use vp_foundation::NDIndex;

/// 点对点重分布消息标签基址
const RESHAPE_TAG: u64 = 0x30_0000;
/// 流水分块元素数
const PIPELINE_CHUNK: usize = 8192;

/// 重分布算法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReshapeAlgorithm {
    /// 填充到统一长度的全交换
    AllToAll,
    /// 变长全交换
    #[default]
    AllToAllV,
    /// 成对点对点
    P2p,
    /// 分块流水点对点
    P2pPipelined,
}

impl ReshapeAlgorithm {
    /// 解析字符串标签
    pub fn parse(tag: &str) -> Result<Self, FftError> {
        match tag {
            "ALL_TO_ALL" => Ok(Self::AllToAll),
            "ALL_TO_ALL_V" => Ok(Self::AllToAllV),
            "P2P" => Ok(Self::P2p),
            "P2P_PIPELINED" => Ok(Self::P2pPipelined),
            other => Err(FftError::UnknownComm(other.to_string())),
        }
    }

    /// 解析整数标签（0=a2av, 1=a2a, 2=p2p, 3=p2p_pl）
    pub fn parse_int(tag: i64) -> Result<Self, FftError> {
        match tag {
            0 => Ok(Self::AllToAllV),
            1 => Ok(Self::AllToAll),
            2 => Ok(Self::P2p),
            3 => Ok(Self::P2pPipelined),
            other => Err(FftError::UnknownComm(other.to_string())),
        }
    }
}

/// 把块从源分布重分布到目标分布
///
/// `src_domains` / `dst_domains` 均按秩序给出；返回本秩目标域
/// 上的新块。两个分布覆盖同一全局格点集（目标可为源的子集，
/// 此时多余数据被丢弃；反之缺失格点保持零）。
pub fn reshape<T: Pod, const D: usize>(
    comm: &Comm,
    src: &DenseBrick<T, D>,
    src_domains: &[NDIndex<D>],
    dst_domains: &[NDIndex<D>],
    algorithm: ReshapeAlgorithm,
) -> Result<DenseBrick<T, D>, FftError> {
    let me = comm.rank();
    let p = comm.size();
    let dst_mine = dst_domains[me];
    let mut out = DenseBrick::<T, D>::zeroed(dst_mine);

    // 本地部分直接拷贝
    let local_region = src.domain().intersect(&dst_mine);
    if !local_region.is_empty() {
        let vals = pack_region(src.domain(), src.data(), &local_region);
        unpack_region(&dst_mine, out.data_mut(), &local_region, &vals)?;
    }
    if p == 1 {
        return Ok(out);
    }

    match algorithm {
        ReshapeAlgorithm::AllToAllV | ReshapeAlgorithm::AllToAll => {
            let pad = if algorithm == ReshapeAlgorithm::AllToAll {
                // 所有 (i,j) 区域的最大格点数，各秩可独立算出
                let mut m = 0usize;
                for i in 0..p {
                    for j in 0..p {
                        if i != j {
                            m = m.max(src_domains[i].intersect(&dst_domains[j]).size());
                        }
                    }
                }
                Some(m)
            } else {
                None
            };

            let mut sends: Vec<Vec<T>> = Vec::with_capacity(p);
            for (r, dst_dom) in dst_domains.iter().enumerate() {
                if r == me {
                    sends.push(Vec::new());
                    continue;
                }
                let region = src.domain().intersect(dst_dom);
                let mut vals = pack_region(src.domain(), src.data(), &region);
                if let Some(m) = pad {
                    vals.resize(m, T::zeroed());
                }
                sends.push(vals);
            }
            let received = comm.all_to_all_v(sends)?;
            for (r, vals) in received.into_iter().enumerate() {
                if r == me {
                    continue;
                }
                let region = dst_mine.intersect(&src_domains[r]);
                if region.is_empty() {
                    continue;
                }
                unpack_region(&dst_mine, out.data_mut(), &region, &vals[..region.size()])?;
            }
        }
        ReshapeAlgorithm::P2p => {
            for (r, dst_dom) in dst_domains.iter().enumerate() {
                if r == me {
                    continue;
                }
                let region = src.domain().intersect(dst_dom);
                if region.is_empty() {
                    continue;
                }
                let vals = pack_region(src.domain(), src.data(), &region);
                comm.send_slice(r, RESHAPE_TAG, &vals)?;
            }
            for (r, src_dom) in src_domains.iter().enumerate() {
                if r == me {
                    continue;
                }
                let region = dst_mine.intersect(src_dom);
                if region.is_empty() {
                    continue;
                }
                let vals: Vec<T> = comm.recv_vec(r, RESHAPE_TAG)?;
                unpack_region(&dst_mine, out.data_mut(), &region, &vals)?;
            }
        }
        ReshapeAlgorithm::P2pPipelined => {
            for (r, dst_dom) in dst_domains.iter().enumerate() {
                if r == me {
                    continue;
                }
                let region = src.domain().intersect(dst_dom);
                if region.is_empty() {
                    continue;
                }
                let vals = pack_region(src.domain(), src.data(), &region);
                for (c, chunk) in vals.chunks(PIPELINE_CHUNK).enumerate() {
                    comm.send_slice(r, RESHAPE_TAG + 1 + c as u64, chunk)?;
                }
            }
            for (r, src_dom) in src_domains.iter().enumerate() {
                if r == me {
                    continue;
                }
                let region = dst_mine.intersect(src_dom);
                if region.is_empty() {
                    continue;
                }
                let total = region.size();
                let mut vals = Vec::with_capacity(total);
                let n_chunks = total.div_ceil(PIPELINE_CHUNK);
                for c in 0..n_chunks {
                    let chunk: Vec<T> = comm.recv_vec(r, RESHAPE_TAG + 1 + c as u64)?;
                    vals.extend_from_slice(&chunk);
                }
                unpack_region(&dst_mine, out.data_mut(), &region, &vals)?;
            }
        }
    }
    Ok(out)
}

// ============================================================================
// 测试
// ============================================================================
