use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use crate::BlockDevice;

/// 内存盘：以一段连续内存模拟块设备，并统计读写次数
#[derive(Debug)]
pub struct RamDisk {
    block_size: usize,
    data: Mutex<Vec<u8>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RamDisk {
    pub fn new(block_size: usize, blocks: usize) -> Self {
        Self {
            block_size,
            data: Mutex::new(vec![0; block_size * blocks]),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// 设备实际发生的读块次数
    #[inline]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// 设备实际发生的写块次数
    #[inline]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// 绕过计数直接查看某块的内容
    pub fn peek(&self, block_id: usize) -> Vec<u8> {
        let start = block_id * self.block_size;
        self.data.lock()[start..start + self.block_size].to_vec()
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        assert_eq!(buf.len(), self.block_size, "not a complete block!");
        let start = block_id * self.block_size;
        let data = self.data.lock();
        assert!(start + self.block_size <= data.len(), "block {block_id} out of range");
        buf.copy_from_slice(&data[start..start + self.block_size]);
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        assert_eq!(buf.len(), self.block_size, "not a complete block!");
        let start = block_id * self.block_size;
        let mut data = self.data.lock();
        assert!(start + self.block_size <= data.len(), "block {block_id} out of range");
        data[start..start + self.block_size].copy_from_slice(buf);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn block_count(&self) -> Option<usize> {
        Some(self.data.lock().len() / self.block_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_independent() {
        let disk = RamDisk::new(16, 4);
        disk.write_block(2, &[7; 16]);

        let mut buf = [0; 16];
        disk.read_block(1, &mut buf);
        assert_eq!(buf, [0; 16]);
        disk.read_block(2, &mut buf);
        assert_eq!(buf, [7; 16]);
        assert_eq!((disk.reads(), disk.writes()), (2, 1));
        assert_eq!(disk.block_count(), Some(4));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn read_past_end() {
        let disk = RamDisk::new(16, 4);
        disk.read_block(4, &mut [0; 16]);
    }
}
