//! # 同步原语
//!
//! 两级锁：
//!
//! - 短锁 [`spin::Mutex`]：保护缓存池的索引、引用计数，只做查表与计数，
//!   绝不跨越磁盘 I/O；
//! - 长锁 [`SleepLock`]：保护块与 inode 的内容，可跨越 I/O 与多步操作，
//!   争用时通过 [`Scheduler`] 挂起当前任务。
//!
//! 取长锁前必须先放掉短锁。

mod scheduler;
mod sleep_lock;

pub use self::{
    scheduler::{Scheduler, SpinScheduler, TaskId},
    sleep_lock::{SleepGuard, SleepLock},
};
