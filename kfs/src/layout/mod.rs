//! # 磁盘数据结构层
//!
//! kfs 的磁盘布局：
//! 超级块 | 索引节点位图 | 索引节点区域 | 数据块位图 | 数据块区域

mod super_block;
pub use super_block::{Geometry, SuperBlock};

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{
    DiskInode, IndirectBlock, InodeKind, DIRECT_CAP, ENTRY_PER_BLOCK, INDIRECT_CAP, INODE_SIZE,
    INODES_PER_BLOCK, MAX_BLOCKS, MAX_FILE_SIZE, N_ADDRS, N_DIRECT, N_DOUBLE, N_INDIRECT,
};

/// 文件项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::{DirBlock, DirEntry, DIRENTS_PER_BLOCK, UNUSED_INODE};

use crate::BLOCK_SIZE;

/// 位图区域内块的结构
pub type BitmapBlock = [u8; BLOCK_SIZE];
/// 原始数据块
pub type DataBlock = [u8; BLOCK_SIZE];

/// 可以直接叠放在块缓存字节上的磁盘结构。
///
/// # Safety
///
/// 实现者必须是 `#[repr(C)]` 或整数数组，任意位模式都合法，且对齐不超过 8。
pub unsafe trait Pod: Sized {}

unsafe impl Pod for DataBlock {}
unsafe impl Pod for IndirectBlock {}
unsafe impl Pod for SuperBlock {}
unsafe impl Pod for DiskInode {}
unsafe impl Pod for DirBlock {}
