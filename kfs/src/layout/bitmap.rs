use super::BitmapBlock;
use crate::{BLOCK_BITS, BufferCache};

/// 位图区域：第 `n` 位为 1 当且仅当第 `n` 个 inode 或数据块已被分配。
///
/// 位与位之间的互斥由所在块缓冲的内容锁保证。
#[derive(Debug, Clone, Copy)]
pub struct Bitmap {
    start_block_id: u32,
    blocks: u32,
    /// 可分配的位数，不一定填满最后一块
    capacity: u32,
}

impl Bitmap {
    #[inline]
    pub fn new(start_block_id: u32, blocks: u32, capacity: u32) -> Self {
        assert!(capacity as usize <= blocks as usize * BLOCK_BITS);

        Self {
            start_block_id,
            blocks,
            capacity,
        }
    }

    /// 首次适配：找到第一个 0 位置 1 并立即写回，返回其序号
    pub fn alloc(&self, cache: &BufferCache) -> Option<u32> {
        for block_pos in 0..self.blocks {
            let mut bitmap_block = cache.read(self.start_block_id + block_pos);
            let found = bitmap_block.map_mut(0, |bits: &mut BitmapBlock| {
                let (byte_pos, byte) = bits
                    .iter_mut()
                    .enumerate()
                    .find(|(_, byte)| **byte != u8::MAX)?;
                let bit_pos = byte.trailing_ones();
                let pos = block_pos * BLOCK_BITS as u32 + byte_pos as u32 * 8 + bit_pos;
                (pos < self.capacity).then(|| {
                    *byte |= 1 << bit_pos;
                    pos
                })
            });

            if let Some(pos) = found {
                bitmap_block.write();
                return Some(pos);
            }
        }

        None
    }

    /// 释放一个已分配的位；释放空闲位是调用方的错误
    pub fn dealloc(&self, cache: &BufferCache, bit: u32) {
        assert!(bit < self.capacity, "bit {bit} beyond bitmap");
        let (block_pos, byte_pos, bit_pos) = decomposition(bit);

        let mut bitmap_block = cache.read(self.start_block_id + block_pos);
        bitmap_block.map_mut(0, |bits: &mut BitmapBlock| {
            assert!(bits[byte_pos] & (1 << bit_pos) != 0, "bit {bit} freed twice");
            bits[byte_pos] &= !(1 << bit_pos);
        });
        bitmap_block.write();
    }

    /// 该位是否已被分配
    pub fn test(&self, cache: &BufferCache, bit: u32) -> bool {
        let (block_pos, byte_pos, bit_pos) = decomposition(bit);
        cache
            .read(self.start_block_id + block_pos)
            .map(0, |bits: &BitmapBlock| bits[byte_pos] & (1 << bit_pos) != 0)
    }
}

/// 位序号分解为块序号、块内字节序号与字节内位序号
#[inline]
fn decomposition(bit: u32) -> (u32, usize, u32) {
    let block_pos = bit / BLOCK_BITS as u32;
    let bit = bit as usize % BLOCK_BITS;
    (block_pos, bit / 8, (bit % 8) as u32)
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use alloc::vec::Vec;

    use block_dev::RamDisk;

    use super::*;
    use crate::{BLOCK_SIZE, SpinScheduler};

    fn fixture(capacity: u32) -> (BufferCache, Bitmap) {
        let blocks = (capacity as usize).div_ceil(BLOCK_BITS) as u32;
        let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 1 + blocks as usize));
        let cache = BufferCache::new(disk, Arc::new(SpinScheduler), 4);
        (cache, Bitmap::new(1, blocks, capacity))
    }

    #[test]
    fn first_fit_and_unique() {
        let (cache, bitmap) = fixture(5000);

        let bits: Vec<_> = (0..5000).map(|_| bitmap.alloc(&cache).unwrap()).collect();
        assert!(bits.iter().copied().eq(0..5000));
        assert_eq!(bitmap.alloc(&cache), None);

        bitmap.dealloc(&cache, 4097);
        bitmap.dealloc(&cache, 3);
        assert!(!bitmap.test(&cache, 3));
        assert_eq!(bitmap.alloc(&cache), Some(3));
        assert_eq!(bitmap.alloc(&cache), Some(4097));
        assert_eq!(bitmap.alloc(&cache), None);
    }

    #[test]
    fn capacity_limits_partial_block() {
        let (cache, bitmap) = fixture(10);
        for expected in 0..10 {
            assert_eq!(bitmap.alloc(&cache), Some(expected));
        }
        assert_eq!(bitmap.alloc(&cache), None);
    }

    #[test]
    #[should_panic(expected = "freed twice")]
    fn double_free() {
        let (cache, bitmap) = fixture(16);
        let bit = bitmap.alloc(&cache).unwrap();
        bitmap.dealloc(&cache, bit);
        bitmap.dealloc(&cache, bit);
    }
}
