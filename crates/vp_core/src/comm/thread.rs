// crates/vp_core/src/comm/thread.rs

//! 线程通信子
//!
//! 单进程内的多秩世界：每个秩在自己的线程上运行，点对点消息
//! 经由目标秩的邮箱（互斥锁 + 条件变量）投递。集合操作与栅栏
//! 建立在点对点之上，语义与网络后端一致，使多秩行为可以在普通
//! `cargo test` 中被完整演练。

use super::{Comm, Communicator};
use crate::error::CommError;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

/// 接收等待上限；超时视为通信子故障（致命）
const RECV_TIMEOUT: Duration = Duration::from_secs(30);

struct Mailbox {
    queues: Mutex<HashMap<(usize, u64), VecDeque<Vec<u8>>>>,
    signal: Condvar,
}

struct World {
    size: usize,
    mailboxes: Vec<Mailbox>,
    barrier: Barrier,
}

/// 线程通信子（每秩一个句柄）
pub struct ThreadComm {
    rank: usize,
    world: Arc<World>,
    seq: AtomicU64,
}

impl ThreadComm {
    /// 建立大小为 `n` 的世界，返回每个秩的通信子句柄
    ///
    /// 句柄按秩序排列，调用方将它们分发给各自的秩线程。
    pub fn world(n: usize) -> Vec<Comm> {
        assert!(n > 0, "世界大小必须为正");
        let world = Arc::new(World {
            size: n,
            mailboxes: (0..n)
                .map(|_| Mailbox {
                    queues: Mutex::new(HashMap::new()),
                    signal: Condvar::new(),
                })
                .collect(),
            barrier: Barrier::new(n),
        });
        (0..n)
            .map(|rank| {
                Comm::new(Arc::new(ThreadComm {
                    rank,
                    world: Arc::clone(&world),
                    seq: AtomicU64::new(0),
                }))
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.world.size
    }

    fn send_bytes(&self, to: usize, tag: u64, bytes: Vec<u8>) -> Result<(), CommError> {
        if to >= self.world.size {
            return Err(CommError::Protocol {
                operation: "send_bytes",
                reason: format!("rank {to} 超出世界大小 {}", self.world.size),
            });
        }
        let mb = &self.world.mailboxes[to];
        mb.queues
            .lock()
            .entry((self.rank, tag))
            .or_default()
            .push_back(bytes);
        mb.signal.notify_all();
        Ok(())
    }

    fn recv_bytes(&self, from: usize, tag: u64) -> Result<Vec<u8>, CommError> {
        if from >= self.world.size {
            return Err(CommError::Protocol {
                operation: "recv_bytes",
                reason: format!("rank {from} 超出世界大小 {}", self.world.size),
            });
        }
        let mb = &self.world.mailboxes[self.rank];
        let mut guard = mb.queues.lock();
        loop {
            if let Some(msg) = guard.get_mut(&(from, tag)).and_then(|q| q.pop_front()) {
                return Ok(msg);
            }
            if mb.signal.wait_for(&mut guard, RECV_TIMEOUT).timed_out() {
                return Err(CommError::RecvTimeout {
                    rank: self.rank,
                    from,
                    tag,
                });
            }
        }
    }

    fn barrier(&self) {
        self.world.barrier.wait();
    }

    fn next_collective_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}

// ============================================================================
// 测试
// ============================================================================
