use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::ptr;

use spin::Mutex;

use super::{Scheduler, TaskId};

/// 睡眠锁：持有者可以长时间占用，等待者被挂起而非空转
pub struct SleepLock<T> {
    /// 持有者；仅在判断与交接时被短暂锁住
    holder: Mutex<Option<TaskId>>,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SleepLock<T> {}
unsafe impl<T: Send> Sync for SleepLock<T> {}

/// 持有睡眠锁的凭证，析构时释放锁并唤醒等待者
pub struct SleepGuard<'a, T> {
    lock: &'a SleepLock<T>,
    sched: &'a dyn Scheduler,
}

impl<T> SleepLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            holder: Mutex::new(None),
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock<'a>(&'a self, sched: &'a dyn Scheduler) -> SleepGuard<'a, T> {
        let me = sched.current_task();
        loop {
            {
                let mut holder = self.holder.lock();
                if holder.is_none() {
                    *holder = Some(me);
                    break;
                }
            }
            sched.block_on(self.chan(), &|| self.holder.lock().is_some());
        }

        SleepGuard { lock: self, sched }
    }

    #[inline]
    fn chan(&self) -> usize {
        ptr::from_ref(self) as usize
    }
}

impl<T> Deref for SleepGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SleepGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SleepGuard<'_, T> {
    fn drop(&mut self) {
        {
            let mut holder = self.lock.holder.lock();
            assert_eq!(
                *holder,
                Some(self.sched.current_task()),
                "sleep lock released by a task that does not hold it"
            );
            *holder = None;
        }
        self.sched.wake(self.lock.chan());
    }
}
