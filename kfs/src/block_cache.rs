//! # 块缓存层
//!
//! 固定容量的缓冲池。`spin` 短锁保护块号与引用计数，
//! 每个缓冲的内容由一把睡眠锁保护；读盘发生在内容锁之下、短锁之外。

use alloc::{boxed::Box, collections::VecDeque, sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicBool, Ordering};

use block_dev::BlockDevice;
use spin::Mutex;

use crate::{
    BLOCK_SIZE, Exhausted,
    error::fatal,
    layout::Pod,
    sync::{Scheduler, SleepGuard, SleepLock},
};

/// 块内容，对齐到 8 以便叠放磁盘结构
#[derive(Clone)]
#[repr(C, align(8))]
pub struct BlockData(pub [u8; BLOCK_SIZE]);

struct Buffer {
    /// 内容是否已从磁盘读入；换块时清空
    valid: AtomicBool,
    data: SleepLock<BlockData>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Slot {
    block_id: Option<u32>,
    refs: u32,
}

/// 短锁保护的索引：
/// 队头一侧是最近被引用的缓冲，队尾一侧是最近被放回的缓冲
struct CacheIndex {
    slots: Vec<Slot>,
    lru: VecDeque<usize>,
}

impl CacheIndex {
    fn touch(&mut self, slot: usize) {
        self.lru.retain(|&s| s != slot);
        self.lru.push_front(slot);
    }

    fn retire(&mut self, slot: usize) {
        self.lru.retain(|&s| s != slot);
        self.lru.push_back(slot);
    }
}

pub struct BufferCache {
    device: Arc<dyn BlockDevice>,
    sched: Arc<dyn Scheduler>,
    index: Mutex<CacheIndex>,
    buffers: Box<[Buffer]>,
}

impl BufferCache {
    pub fn new(device: Arc<dyn BlockDevice>, sched: Arc<dyn Scheduler>, capacity: usize) -> Self {
        assert!(capacity > 0, "buffer pool cannot be empty");

        let buffers = (0..capacity)
            .map(|_| Buffer {
                valid: AtomicBool::new(false),
                data: SleepLock::new(BlockData([0; BLOCK_SIZE])),
            })
            .collect();
        let index = CacheIndex {
            slots: alloc::vec![Slot::default(); capacity],
            lru: (0..capacity).collect(),
        };

        Self {
            device,
            sched,
            index: Mutex::new(index),
            buffers,
        }
    }

    /// 获取块缓存并持有其内容锁；缓冲全部被占用时停机
    pub fn read(&self, block_id: u32) -> BufferGuard<'_> {
        self.try_read(block_id).unwrap_or_else(|err| fatal(err))
    }

    pub fn try_read(&self, block_id: u32) -> Result<BufferGuard<'_>, Exhausted> {
        let slot = self.pin(block_id)?;
        let buffer = &self.buffers[slot];

        let mut data = buffer.data.lock(self.sched.as_ref());
        if !buffer.valid.load(Ordering::Acquire) {
            self.device.read_block(block_id as usize, &mut data.0);
            buffer.valid.store(true, Ordering::Release);
        }

        Ok(BufferGuard {
            cache: self,
            slot,
            block_id,
            data: Some(data),
        })
    }

    /// 在同一次短锁临界区内完成查找与换块，因此两个槽位不会同时代表同一块
    fn pin(&self, block_id: u32) -> Result<usize, Exhausted> {
        let mut index = self.index.lock();

        if let Some(slot) = index
            .slots
            .iter()
            .position(|s| s.block_id == Some(block_id))
        {
            index.slots[slot].refs += 1;
            index.touch(slot);
            return Ok(slot);
        }

        // 从最近放回的一端开始寻找空闲缓冲
        let slot = index
            .lru
            .iter()
            .rev()
            .copied()
            .find(|&s| index.slots[s].refs == 0)
            .ok_or(Exhausted::BufferPool)?;
        index.slots[slot] = Slot {
            block_id: Some(block_id),
            refs: 1,
        };
        // 引用计数为 0 的缓冲没有内容锁持有者
        self.buffers[slot].valid.store(false, Ordering::Release);
        index.touch(slot);

        Ok(slot)
    }

    fn unpin(&self, slot: usize) {
        let mut index = self.index.lock();
        let entry = &mut index.slots[slot];
        assert!(entry.refs > 0, "double release of block buffer");
        entry.refs -= 1;
        if entry.refs == 0 {
            index.retire(slot);
        }
    }

    /// 当前被引用的缓冲个数
    pub fn pinned(&self) -> usize {
        self.index.lock().slots.iter().filter(|s| s.refs > 0).count()
    }

    /// 缓存中是否有 `block_id` 的缓冲
    pub fn contains(&self, block_id: u32) -> bool {
        self.index
            .lock()
            .slots
            .iter()
            .any(|s| s.block_id == Some(block_id))
    }
}

/// 持有一块缓冲的引用与内容锁，析构时依次释放内容锁与引用
pub struct BufferGuard<'a> {
    cache: &'a BufferCache,
    slot: usize,
    block_id: u32,
    data: Option<SleepGuard<'a, BlockData>>,
}

impl BufferGuard<'_> {
    #[inline]
    pub fn block_id(&self) -> u32 {
        self.block_id
    }

    #[inline]
    pub fn bytes(&self) -> &[u8; BLOCK_SIZE] {
        match &self.data {
            Some(data) => &data.0,
            None => unreachable!(),
        }
    }

    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8; BLOCK_SIZE] {
        match &mut self.data {
            Some(data) => &mut data.0,
            None => unreachable!(),
        }
    }

    /// 直写回磁盘
    pub fn write(&self) {
        self.cache
            .device
            .write_block(self.block_id as usize, self.bytes());
    }

    /// 获取缓冲区中的 `T` 类型值的引用
    pub fn get<T: Pod>(&self, offset: usize) -> &T {
        check_cast::<T>(offset);
        unsafe { &*self.bytes().as_ptr().add(offset).cast() }
    }

    /// 获取缓冲区中的 `T` 类型值的可变引用
    pub fn get_mut<T: Pod>(&mut self, offset: usize) -> &mut T {
        check_cast::<T>(offset);
        unsafe { &mut *self.bytes_mut().as_mut_ptr().add(offset).cast() }
    }

    pub fn map<T: Pod, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(offset))
    }

    pub fn map_mut<T: Pod, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }
}

impl Drop for BufferGuard<'_> {
    fn drop(&mut self) {
        // 先放内容锁，再在短锁下归还引用
        drop(self.data.take());
        self.cache.unpin(self.slot);
    }
}

#[inline]
#[track_caller]
fn check_cast<T>(offset: usize) {
    assert!(
        offset + size_of::<T>() <= BLOCK_SIZE,
        "cast out of block bounds"
    );
    assert!(offset % align_of::<T>() == 0, "misaligned cast");
    assert!(align_of::<T>() <= align_of::<BlockData>());
}
