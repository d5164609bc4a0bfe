use core::hint;

/// 任务标识，由调度器分配
pub type TaskId = usize;

/// 调度器提供给文件系统的挂起与唤醒原语。
///
/// 睡眠锁以自身地址为等待通道 `chan`。
pub trait Scheduler: Send + Sync {
    /// 当前执行上下文的标识
    fn current_task(&self) -> TaskId;

    /// 挂起当前任务，直到 `chan` 被唤醒且 `still_blocked` 不再成立。
    ///
    /// 实现必须在登记为等待者**之后**重新求值 `still_blocked`，
    /// 否则会丢失夹在判断与入睡之间的唤醒。
    fn block_on(&self, chan: usize, still_blocked: &dyn Fn() -> bool);

    /// 唤醒所有等在 `chan` 上的任务
    fn wake(&self, chan: usize);
}

/// 没有真实调度器时的后备实现：所有上下文共用一个身份，等待即忙等
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinScheduler;

impl Scheduler for SpinScheduler {
    #[inline]
    fn current_task(&self) -> TaskId {
        0
    }

    fn block_on(&self, _chan: usize, still_blocked: &dyn Fn() -> bool) {
        while still_blocked() {
            hint::spin_loop();
        }
    }

    #[inline]
    fn wake(&self, _chan: usize) {}
}
