//! # 块设备接口层
//!
//! 块设备是以**块**为单位存储数据的设备，例如磁盘、光盘、U盘等；
//! [`BlockDevice`] 就是对读写块设备的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 文件系统只通过块设备驱动读写块设备，每次读写恰好一整块。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod ram_disk;

use core::any::Any;

pub use self::ram_disk::RamDisk;

/// 块设备驱动特质
pub trait BlockDevice: Send + Sync + Any {
    /// 读出第 `block_id` 块，`buf` 的长度即块大小
    fn read_block(&self, block_id: usize, buf: &mut [u8]);

    /// 写入第 `block_id` 块，同步完成后才返回
    fn write_block(&self, block_id: usize, buf: &[u8]);

    /// 设备的总块数，无从得知时为 `None`
    fn block_count(&self) -> Option<usize> {
        None
    }
}
