// crates/vp_core/src/comm/self_comm.rs

//! 单秩通信子
//!
//! 大小恒为 1。自发自收经由本地邮箱完成，使周期边界回绕到
//! 自身的 halo 交换与多秩路径共用同一套代码。

use super::Communicator;
use crate::error::CommError;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

/// 单秩通信子
#[derive(Default)]
pub struct SelfComm {
    mailbox: Mutex<HashMap<u64, VecDeque<Vec<u8>>>>,
    seq: AtomicU64,
}

impl SelfComm {
    /// 创建单秩通信子
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send_bytes(&self, to: usize, tag: u64, bytes: Vec<u8>) -> Result<(), CommError> {
        if to != 0 {
            return Err(CommError::Protocol {
                operation: "send_bytes",
                reason: format!("单秩通信子不存在 rank {to}"),
            });
        }
        self.mailbox.lock().entry(tag).or_default().push_back(bytes);
        Ok(())
    }

    fn recv_bytes(&self, from: usize, tag: u64) -> Result<Vec<u8>, CommError> {
        if from != 0 {
            return Err(CommError::Protocol {
                operation: "recv_bytes",
                reason: format!("单秩通信子不存在 rank {from}"),
            });
        }
        // 单线程语义下消息必须已投递，阻塞等待即死锁
        self.mailbox
            .lock()
            .get_mut(&tag)
            .and_then(|q| q.pop_front())
            .ok_or(CommError::Protocol {
                operation: "recv_bytes",
                reason: format!("tag {tag:#x} 无已投递消息"),
            })
    }

    fn barrier(&self) {}

    fn next_collective_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}
