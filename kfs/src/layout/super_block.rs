use vfs::Error;

use super::{DiskInode, INODES_PER_BLOCK};
use crate::{BLOCK_BITS, BLOCK_SIZE, MAGIC, SUPER_BLOCK_ID};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位其它连续区域
///
/// 挂载时读入一次，此后只读。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    pub block_size: u32,
    /// 文件系统占据块数
    pub total_blocks: u32,
    /// inode 总数
    pub inodes: u32,
    pub inode_bitmap_start: u32,
    pub inode_bitmap_blocks: u32,
    pub inode_start: u32,
    pub inode_blocks: u32,
    pub data_bitmap_start: u32,
    pub data_bitmap_blocks: u32,
    pub data_start: u32,
    pub data_blocks: u32,
}

/// 格式化时选定的磁盘规模
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub total_blocks: u32,
    pub inodes: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            total_blocks: 16 * 2048,
            inodes: 1024,
        }
    }
}

impl Geometry {
    /// 排布各区域；放不下元数据区外加至少一个数据块时拒绝
    pub fn validate(&self) -> Result<SuperBlock, Error> {
        // 目录项以 u16 记录 inode 编号，且 u16::MAX 被用作空槽标记
        if self.inodes == 0 || self.inodes >= u16::MAX as u32 {
            return Err(Error::InvalidGeometry);
        }

        let inode_bitmap_blocks = self.inodes.div_ceil(BLOCK_BITS as u32);
        let inode_blocks = self.inodes.div_ceil(INODES_PER_BLOCK as u32);
        let meta_blocks = 1 + inode_bitmap_blocks + inode_blocks;
        let Some(data_total_blocks) = self.total_blocks.checked_sub(meta_blocks) else {
            return Err(Error::InvalidGeometry);
        };

        // 每个位图块管理 BLOCK_BITS 个数据块，自身占一块
        let data_bitmap_blocks = data_total_blocks.div_ceil(BLOCK_BITS as u32 + 1);
        let data_blocks = data_total_blocks - data_bitmap_blocks;
        if data_blocks == 0 {
            return Err(Error::InvalidGeometry);
        }

        let inode_bitmap_start = SUPER_BLOCK_ID + 1;
        let inode_start = inode_bitmap_start + inode_bitmap_blocks;
        let data_bitmap_start = inode_start + inode_blocks;
        let data_start = data_bitmap_start + data_bitmap_blocks;

        Ok(SuperBlock {
            magic: MAGIC,
            block_size: BLOCK_SIZE as u32,
            total_blocks: self.total_blocks,
            inodes: self.inodes,
            inode_bitmap_start,
            inode_bitmap_blocks,
            inode_start,
            inode_blocks,
            data_bitmap_start,
            data_bitmap_blocks,
            data_start,
            data_blocks,
        })
    }
}

impl SuperBlock {
    /// 校验魔数、块大小以及各区域互不重叠且依次排列
    pub fn is_valid(&self) -> bool {
        let region_end = |start: u32, blocks: u32| start.checked_add(blocks);

        self.magic == MAGIC
            && self.block_size == BLOCK_SIZE as u32
            && self.inodes > 0
            && self.inodes < u16::MAX as u32
            && self.data_blocks > 0
            && self.inode_bitmap_start > SUPER_BLOCK_ID
            && self.inodes as usize <= self.inode_bitmap_blocks as usize * BLOCK_BITS
            && self.inodes as usize <= self.inode_blocks as usize * INODES_PER_BLOCK
            && self.data_blocks as usize <= self.data_bitmap_blocks as usize * BLOCK_BITS
            && region_end(self.inode_bitmap_start, self.inode_bitmap_blocks)
                .is_some_and(|end| end <= self.inode_start)
            && region_end(self.inode_start, self.inode_blocks)
                .is_some_and(|end| end <= self.data_bitmap_start)
            && region_end(self.data_bitmap_start, self.data_bitmap_blocks)
                .is_some_and(|end| end <= self.data_start)
            && region_end(self.data_start, self.data_blocks)
                .is_some_and(|end| end <= self.total_blocks)
    }

    /// 通过编号获取 inode 在磁盘上的位置：**块ID**以及**块内偏移**
    #[inline]
    pub fn inode_pos(&self, inode_id: u32) -> (u32, usize) {
        let block_id = self.inode_start + inode_id / INODES_PER_BLOCK as u32;
        let block_offset = inode_id as usize % INODES_PER_BLOCK * size_of::<DiskInode>();

        (block_id, block_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_are_ordered() {
        let sb = Geometry {
            total_blocks: 4096,
            inodes: 200,
        }
        .validate()
        .unwrap();

        assert!(sb.is_valid());
        assert_eq!(sb.inode_bitmap_start, 1);
        assert_eq!(sb.inode_start, 2);
        assert_eq!(sb.inode_blocks, 25);
        assert_eq!(sb.data_bitmap_start, 27);
        assert_eq!(sb.data_start, sb.data_bitmap_start + sb.data_bitmap_blocks);
        assert_eq!(sb.data_start + sb.data_blocks, sb.total_blocks);
    }

    #[test]
    fn rejects_tiny_disk() {
        let geometry = Geometry {
            total_blocks: 3,
            inodes: 8,
        };
        assert_eq!(geometry.validate(), Err(Error::InvalidGeometry));
    }

    #[test]
    fn rejects_inode_count_beyond_dir_entry() {
        let geometry = Geometry {
            total_blocks: 1 << 16,
            inodes: u16::MAX as u32,
        };
        assert_eq!(geometry.validate(), Err(Error::InvalidGeometry));
    }

    #[test]
    fn detects_bad_magic() {
        let mut sb = Geometry::default().validate().unwrap();
        sb.magic = 0;
        assert!(!sb.is_valid());
    }

    #[test]
    fn detects_overlapping_regions() {
        let mut sb = Geometry::default().validate().unwrap();
        sb.data_bitmap_start = sb.inode_start;
        assert!(!sb.is_valid());
    }
}
