use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

use kfs::{Scheduler, TaskId};

static NEXT_TASK: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    /// 每个宿主线程是一个任务
    static TASK: TaskId = NEXT_TASK.fetch_add(1, Ordering::Relaxed);
}

/// 以宿主线程充当任务的调度器。
///
/// 所有等待通道共用一个条件变量，唤醒时全部等待者重新检查。
#[derive(Debug, Default)]
pub struct ThreadScheduler {
    lock: Mutex<()>,
    cond: Condvar,
}

impl Scheduler for ThreadScheduler {
    fn current_task(&self) -> TaskId {
        TASK.with(|id| *id)
    }

    fn block_on(&self, _chan: usize, still_blocked: &dyn Fn() -> bool) {
        let mut guard = self.lock.lock().unwrap();
        while still_blocked() {
            guard = self.cond.wait(guard).unwrap();
        }
    }

    fn wake(&self, _chan: usize) {
        let _guard = self.lock.lock().unwrap();
        self.cond.notify_all();
    }
}
