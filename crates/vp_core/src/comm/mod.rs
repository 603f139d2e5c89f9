// crates/vp_core/src/comm/mod.rs

//! 秩间通信子
//!
//! 世界通信子与秩标识在启动时建立一次，运行期间不可变；
//! 秩数不允许中途变化。核心只依赖 [`Communicator`] trait：
//!
//! - [`SelfComm`]: 单秩通信子（带自发自收邮箱，周期回绕到
//!   自身时同样走消息路径）
//! - [`ThreadComm`]: 单进程多秩通信子，每个秩一个线程，
//!   邮箱 + 条件变量实现点对点，集合操作建立在其上
//!
//! 网络后端（MPI 等）可作为第三个实现接入，接口不变。
//!
//! # 确定性
//!
//! 所有归约集合操作先 all-gather 各秩部分和，再在每个秩上以
//! 固定的成对树顺序合并，保证结果跨秩、跨分解方式逐位一致。
//!
//! # 标签空间
//!
//! 点对点用户标签位于低位空间；集合操作内部使用最高位标记 +
//! 每秩单调序号。集合操作是全体同步的，且在所有秩上以相同的
//! 程序顺序发起，因此序号天然对齐。

mod self_comm;
mod thread;

pub use self_comm::SelfComm;
pub use thread::ThreadComm;

use crate::error::CommError;
use bytemuck::Pod;
use std::sync::Arc;
use vp_foundation::pairwise_sum;

/// 集合操作标签基址（最高位）
const COLLECTIVE_TAG_BASE: u64 = 1 << 63;

/// 通信子 trait
///
/// 实现者提供点对点字节消息与栅栏；类型化接口与集合操作由
/// [`Comm`] 句柄统一提供。
pub trait Communicator: Send + Sync {
    /// 本秩编号
    fn rank(&self) -> usize;

    /// 世界大小
    fn size(&self) -> usize;

    /// 发送字节消息（不阻塞，投递即返回）
    fn send_bytes(&self, to: usize, tag: u64, bytes: Vec<u8>) -> Result<(), CommError>;

    /// 接收字节消息（阻塞直至匹配的消息到达）
    fn recv_bytes(&self, from: usize, tag: u64) -> Result<Vec<u8>, CommError>;

    /// 全体栅栏
    fn barrier(&self);

    /// 下一个集合操作序号（各秩独立单调递增）
    fn next_collective_seq(&self) -> u64;
}

/// 通信子句柄
///
/// 可克隆的轻量句柄，提供类型化点对点与确定性集合操作。
#[derive(Clone)]
pub struct Comm {
    inner: Arc<dyn Communicator>,
}

impl Comm {
    /// 由任意通信子实现构造
    pub fn new(inner: Arc<dyn Communicator>) -> Self {
        Self { inner }
    }

    /// 单秩通信子
    pub fn single() -> Self {
        Self::new(Arc::new(SelfComm::new()))
    }

    /// 本秩编号
    #[inline]
    pub fn rank(&self) -> usize {
        self.inner.rank()
    }

    /// 世界大小
    #[inline]
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// 全体栅栏
    pub fn barrier(&self) {
        self.inner.barrier();
    }

    /// 发送 Pod 切片
    pub fn send_slice<T: Pod>(&self, to: usize, tag: u64, data: &[T]) -> Result<(), CommError> {
        self.inner
            .send_bytes(to, tag, bytemuck::cast_slice(data).to_vec())
    }

    /// 接收 Pod 向量
    pub fn recv_vec<T: Pod>(&self, from: usize, tag: u64) -> Result<Vec<T>, CommError> {
        let bytes = self.inner.recv_bytes(from, tag)?;
        let elem = std::mem::size_of::<T>();
        if elem != 0 && bytes.len() % elem != 0 {
            return Err(CommError::BadLength {
                len: bytes.len(),
                elem,
            });
        }
        Ok(bytemuck::pod_collect_to_vec(&bytes))
    }

    /// all-gather：收集每个秩的字节消息，按秩序返回
    pub fn all_gather_bytes(&self, local: Vec<u8>) -> Result<Vec<Vec<u8>>, CommError> {
        let me = self.rank();
        let p = self.size();
        let tag = COLLECTIVE_TAG_BASE | self.inner.next_collective_seq();

        for r in 0..p {
            if r != me {
                self.inner.send_bytes(r, tag, local.clone())?;
            }
        }
        let mut out = Vec::with_capacity(p);
        for r in 0..p {
            if r == me {
                out.push(local.clone());
            } else {
                out.push(self.inner.recv_bytes(r, tag)?);
            }
        }
        Ok(out)
    }

    /// all-to-all-v：每秩向每秩发送一段 Pod 数据，按秩序返回收到的段
    pub fn all_to_all_v<T: Pod>(&self, sends: Vec<Vec<T>>) -> Result<Vec<Vec<T>>, CommError> {
        let me = self.rank();
        let p = self.size();
        debug_assert_eq!(sends.len(), p);
        let tag = COLLECTIVE_TAG_BASE | self.inner.next_collective_seq();

        let mut own = Vec::new();
        for (r, data) in sends.into_iter().enumerate() {
            if r == me {
                own = data;
            } else {
                self.send_slice(r, tag, &data)?;
            }
        }
        let mut out = Vec::with_capacity(p);
        for r in 0..p {
            if r == me {
                out.push(std::mem::take(&mut own));
            } else {
                out.push(self.recv_vec::<T>(r, tag)?);
            }
        }
        Ok(out)
    }

    /// 确定性全归约求和（逐元素）
    ///
    /// 先收集各秩部分和，再在每个秩上以固定成对树顺序合并，
    /// 结果逐位一致。
    pub fn all_reduce_sum_vec(&self, local: &[f64]) -> Result<Vec<f64>, CommError> {
        let parts = self.all_gather_bytes(bytemuck::cast_slice(local).to_vec())?;
        let p = parts.len();
        let mut out = vec![0.0f64; local.len()];
        let mut rank_vals = vec![0.0f64; p];
        // 字节缓冲可能未对齐，拷贝回 f64 向量再合并
        let views: Vec<Vec<f64>> = parts
            .iter()
            .map(|b| bytemuck::pod_collect_to_vec(b))
            .collect();
        for (j, out_j) in out.iter_mut().enumerate() {
            for (r, view) in views.iter().enumerate() {
                rank_vals[r] = view[j];
            }
            *out_j = pairwise_sum(&rank_vals);
        }
        Ok(out)
    }

    /// 确定性全归约求和（标量）
    pub fn all_reduce_sum(&self, local: f64) -> Result<f64, CommError> {
        Ok(self.all_reduce_sum_vec(&[local])?[0])
    }

    /// 全归约求最小值
    pub fn all_reduce_min(&self, local: f64) -> Result<f64, CommError> {
        self.fold_scalar(local, f64::min)
    }

    /// 全归约求最大值
    pub fn all_reduce_max(&self, local: f64) -> Result<f64, CommError> {
        self.fold_scalar(local, f64::max)
    }

    fn fold_scalar(&self, local: f64, op: impl Fn(f64, f64) -> f64) -> Result<f64, CommError> {
        let parts = self.all_gather_bytes(local.to_le_bytes().to_vec())?;
        let mut acc = f64::from_le_bytes(parts[0][..8].try_into().unwrap());
        for bytes in &parts[1..] {
            acc = op(acc, f64::from_le_bytes(bytes[..8].try_into().unwrap()));
        }
        Ok(acc)
    }

    /// 广播：root 的数据复制到所有秩
    pub fn broadcast<T: Pod>(&self, root: usize, data: &[T]) -> Result<Vec<T>, CommError> {
        let me = self.rank();
        let p = self.size();
        let tag = COLLECTIVE_TAG_BASE | self.inner.next_collective_seq();

        if me == root {
            for r in 0..p {
                if r != root {
                    self.send_slice(r, tag, data)?;
                }
            }
            Ok(data.to_vec())
        } else {
            self.recv_vec::<T>(root, tag)
        }
    }
}

// ============================================================================
// 测试（单秩语义；多秩集合操作在 thread.rs 中覆盖）
// ============================================================================
