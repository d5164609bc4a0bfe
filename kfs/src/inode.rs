//! # 索引节点层
//!
//! 内存中的 inode 缓存。[`InodeRef`] 是对缓存槽位的引用，
//! 克隆即增加引用计数，析构即归还；
//! [`InodeGuard`] 持有 inode 的内容锁，文件内容与元数据只能经由它访问。
//!
//! 最后一个引用归还时，若链接计数已为 0，则回收磁盘上的 inode 及其全部数据块。

use alloc::{boxed::Box, sync::Arc, vec::Vec};
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;
use vfs::{Stat, StatKind};

use crate::{
    BLOCK_SIZE, DstBuf, Exhausted, FileSystem, SrcBuf,
    error::fatal,
    layout::{
        DIRECT_CAP, DiskInode, ENTRY_PER_BLOCK, INDIRECT_CAP, IndirectBlock, InodeKind,
        MAX_BLOCKS, MAX_FILE_SIZE, N_ADDRS, N_DIRECT, N_INDIRECT,
    },
    sync::{SleepGuard, SleepLock},
};

#[derive(Debug, Default, Clone, Copy)]
struct InodeSlot {
    inum: Option<u32>,
    refs: u32,
}

struct CachedInode {
    /// 内容是否已从磁盘读入
    valid: AtomicBool,
    disk: SleepLock<DiskInode>,
}

pub(crate) struct InodeCache {
    index: Mutex<Vec<InodeSlot>>,
    inodes: Box<[CachedInode]>,
}

impl InodeCache {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "inode cache cannot be empty");

        Self {
            index: Mutex::new(alloc::vec![InodeSlot::default(); capacity]),
            inodes: (0..capacity)
                .map(|_| CachedInode {
                    valid: AtomicBool::new(false),
                    disk: SleepLock::new(DiskInode::default()),
                })
                .collect(),
        }
    }

    /// 找到编号为 `inum` 的槽位，找不到时占用一个无人引用的槽位，不读盘
    fn get(&self, inum: u32) -> Result<usize, Exhausted> {
        let mut index = self.index.lock();

        if let Some(slot) = index.iter().position(|s| s.inum == Some(inum)) {
            index[slot].refs += 1;
            return Ok(slot);
        }

        let slot = index
            .iter()
            .position(|s| s.refs == 0)
            .ok_or(Exhausted::InodeCache)?;
        index[slot] = InodeSlot {
            inum: Some(inum),
            refs: 1,
        };
        self.inodes[slot].valid.store(false, Ordering::Release);

        Ok(slot)
    }

    fn dup(&self, slot: usize) {
        let mut index = self.index.lock();
        assert!(index[slot].refs > 0);
        index[slot].refs += 1;
    }

    /// 不是最后一个引用时直接归还并返回 `false`；
    /// 是最后一个时保留计数并返回 `true`，由调用者回收后再 [`put`](Self::put)
    fn release(&self, slot: usize) -> bool {
        let mut index = self.index.lock();
        let entry = &mut index[slot];
        assert!(entry.refs > 0, "double release of inode");
        if entry.refs > 1 {
            entry.refs -= 1;
            return false;
        }
        true
    }

    fn put(&self, slot: usize) {
        let mut index = self.index.lock();
        assert!(index[slot].refs > 0, "double release of inode");
        index[slot].refs -= 1;
    }

    /// 被引用的槽位数
    pub fn pinned(&self) -> usize {
        self.index.lock().iter().filter(|s| s.refs > 0).count()
    }
}

impl FileSystem {
    /// 获取 inode 的引用，不上锁也不读盘；缓存槽位耗尽时停机
    pub fn inode(self: &Arc<Self>, inum: u32) -> InodeRef {
        self.try_inode(inum).unwrap_or_else(|err| fatal(err))
    }

    pub fn try_inode(self: &Arc<Self>, inum: u32) -> Result<InodeRef, Exhausted> {
        assert!(inum < self.super_block().inodes, "inode {inum} out of range");
        let slot = self.icache.get(inum)?;

        Ok(InodeRef {
            fs: self.clone(),
            slot,
            inum,
        })
    }

    /// 已被引用的内存 inode 个数
    pub fn inodes_in_use(&self) -> usize {
        self.icache.pinned()
    }
}

/// 对内存 inode 的一份引用
pub struct InodeRef {
    fs: Arc<FileSystem>,
    slot: usize,
    inum: u32,
}

impl InodeRef {
    #[inline]
    pub fn inum(&self) -> u32 {
        self.inum
    }

    #[inline]
    pub fn fs(&self) -> &Arc<FileSystem> {
        &self.fs
    }

    /// 获取内容锁，首次上锁时从磁盘读入
    pub fn lock(&self) -> InodeGuard<'_> {
        let cached = &self.fs.icache.inodes[self.slot];
        let mut disk = cached.disk.lock(self.fs.scheduler());
        if !cached.valid.load(Ordering::Acquire) {
            let (block_id, offset) = self.fs.super_block().inode_pos(self.inum);
            *disk = self.fs.cache.read(block_id).map(offset, |d: &DiskInode| *d);
            cached.valid.store(true, Ordering::Release);
        }

        InodeGuard { inode: self, disk }
    }

    /// 是否与 `other` 指向同一个 inode
    #[inline]
    pub fn same(&self, other: &InodeRef) -> bool {
        Arc::ptr_eq(&self.fs, &other.fs) && self.inum == other.inum
    }
}

impl Clone for InodeRef {
    fn clone(&self) -> Self {
        self.fs.icache.dup(self.slot);

        Self {
            fs: self.fs.clone(),
            slot: self.slot,
            inum: self.inum,
        }
    }
}

impl Drop for InodeRef {
    fn drop(&mut self) {
        let icache = &self.fs.icache;
        if !icache.release(self.slot) {
            return;
        }

        // 只剩自己持有，且没有目录项指向它时，其他人无法再拿到这把内容锁
        if icache.inodes[self.slot].valid.load(Ordering::Acquire) {
            let mut inode = self.lock();
            if inode.links() == 0 && inode.kind() != InodeKind::Unused {
                inode.reclaim();
            }
        }

        icache.put(self.slot);
    }
}

impl core::fmt::Debug for InodeRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InodeRef")
            .field("inum", &self.inum)
            .finish_non_exhaustive()
    }
}

/// 持有 inode 内容锁的凭证
pub struct InodeGuard<'a> {
    inode: &'a InodeRef,
    disk: SleepGuard<'a, DiskInode>,
}

impl InodeGuard<'_> {
    #[inline]
    pub fn inum(&self) -> u32 {
        self.inode.inum
    }

    #[inline]
    pub fn kind(&self) -> InodeKind {
        self.disk.kind()
    }

    #[inline]
    pub fn links(&self) -> u16 {
        self.disk.nlink
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.disk.size
    }

    #[inline]
    pub fn major(&self) -> u16 {
        self.disk.major
    }

    #[inline]
    pub fn minor(&self) -> u16 {
        self.disk.minor
    }

    /// 磁盘 inode 的快照，可用于查看地址表
    #[inline]
    pub fn disk(&self) -> &DiskInode {
        &self.disk
    }

    #[inline]
    pub fn direct(&self) -> &[u32] {
        self.disk.direct()
    }

    #[inline]
    pub fn indirect(&self) -> &[u32] {
        self.disk.indirect()
    }

    #[inline]
    pub fn double_indirect(&self) -> &[u32] {
        self.disk.double_indirect()
    }

    pub fn inc_links(&mut self) {
        self.disk.nlink += 1;
        self.sync();
    }

    pub fn dec_links(&mut self) {
        assert!(self.disk.nlink > 0, "inode {} has no links", self.inum());
        self.disk.nlink -= 1;
        self.sync();
    }

    #[inline]
    pub(crate) fn fs(&self) -> &FileSystem {
        &self.inode.fs
    }

    /// 覆盖元数据并写回
    pub(crate) fn init(&mut self, disk: DiskInode) {
        *self.disk = disk;
        self.sync();
    }

    /// 把元数据写回 inode 区域
    pub fn sync(&self) {
        let (block_id, offset) = self.fs().super_block().inode_pos(self.inum());
        let mut block = self.fs().cache.read(block_id);
        *block.get_mut::<DiskInode>(offset) = *self.disk;
        block.write();
    }

    pub fn stat(&self) -> Stat {
        let kind = match self.kind() {
            InodeKind::Directory => StatKind::DIR,
            InodeKind::Device => StatKind::CHAR,
            InodeKind::File | InodeKind::Unused => StatKind::FILE,
        };

        Stat {
            dev: 0,
            inode: self.inum(),
            kind,
            links: self.links() as u32,
            size: self.size() as u64,
        }
    }

    /// 从 `offset` 处读出数据，不越过文件末尾，返回读出的字节数
    pub fn read_at<'b>(&self, offset: usize, dst: impl Into<DstBuf<'b>>) -> usize {
        let mut dst = dst.into();
        let size = self.size() as usize;
        if offset >= size {
            return 0;
        }
        let end = offset.saturating_add(dst.len()).min(size);

        let mut pos = offset;
        while pos < end {
            let inner = pos % BLOCK_SIZE;
            let n = (BLOCK_SIZE - inner).min(end - pos);
            match self.lookup_block(pos / BLOCK_SIZE) {
                Some(block_id) => {
                    let block = self.fs().cache.read(block_id);
                    dst.copy_from(pos - offset, &block.bytes()[inner..inner + n]);
                }
                // 空洞
                None => dst.fill_zero(pos - offset, n),
            }
            pos += n;
        }

        end - offset
    }

    /// 在 `offset` 处写入数据，按需分配数据块与索引块。
    ///
    /// 写入范围超出文件大小上限时什么也不写，返回 0。
    pub fn write_at<'b>(&mut self, offset: usize, src: impl Into<SrcBuf<'b>>) -> usize {
        let src = src.into();
        if src.is_empty() {
            return 0;
        }
        let Some(end) = offset
            .checked_add(src.len())
            .filter(|&end| end <= MAX_FILE_SIZE)
        else {
            log::debug!(
                "kfs: write of {} bytes at {offset} beyond max file size of inode {}",
                src.len(),
                self.inum()
            );
            return 0;
        };

        let before = *self.disk;
        let mut pos = offset;
        while pos < end {
            let inner = pos % BLOCK_SIZE;
            let n = (BLOCK_SIZE - inner).min(end - pos);
            let block_id = self.provide_block(pos / BLOCK_SIZE);
            let mut block = self.fs().cache.read(block_id);
            src.copy_to(pos - offset, &mut block.bytes_mut()[inner..inner + n]);
            block.write();
            pos += n;
        }

        if end > self.disk.size as usize {
            self.disk.size = end as u32;
        }
        if *self.disk != before {
            self.sync();
        }

        end - offset
    }

    /// 释放全部数据块，大小清零
    pub fn truncate(&mut self) {
        for slot in 0..N_ADDRS {
            let block_id = self.disk.addrs[slot];
            if block_id != 0 {
                free_tree(self.fs(), block_id, depth_of(slot));
                self.disk.addrs[slot] = 0;
            }
        }
        self.disk.size = 0;
        self.sync();
    }

    /// 回收磁盘 inode：释放内容、类型清为未使用、归还编号
    fn reclaim(&mut self) {
        let inum = self.inum();
        self.truncate();
        self.disk.set_kind(InodeKind::Unused);
        self.disk.major = 0;
        self.disk.minor = 0;
        self.sync();
        self.fs().free_inode(inum);
        self.fs().icache.inodes[self.inode.slot]
            .valid
            .store(false, Ordering::Release);
        log::debug!("kfs: reclaimed inode {inum}");
    }

    /// 文件内第 `index` 块对应的磁盘块，空洞返回 `None`
    fn lookup_block(&self, index: usize) -> Option<u32> {
        let (slot, rest) = locate(index);
        lookup(self.fs(), self.disk.addrs[slot], depth_of(slot), rest)
    }

    fn provide_block(&mut self, index: usize) -> u32 {
        let (slot, rest) = locate(index);
        let mut entry = self.disk.addrs[slot];
        let block_id = provide(self.fs(), &mut entry, depth_of(slot), rest);
        self.disk.addrs[slot] = entry;
        block_id
    }
}

/// 块序号所在的地址表槽位，以及在该槽位子树内的序号
#[track_caller]
fn locate(index: usize) -> (usize, usize) {
    assert!(index < MAX_BLOCKS, "block index {index} beyond max file size");

    if index < DIRECT_CAP {
        (index, 0)
    } else if index < INDIRECT_CAP {
        let index = index - DIRECT_CAP;
        (N_DIRECT + index / ENTRY_PER_BLOCK, index % ENTRY_PER_BLOCK)
    } else {
        let index = index - INDIRECT_CAP;
        let span = ENTRY_PER_BLOCK * ENTRY_PER_BLOCK;
        (N_DIRECT + N_INDIRECT + index / span, index % span)
    }
}

/// 地址表槽位指向的索引树深度，0 表示直接指向数据块
#[inline]
fn depth_of(slot: usize) -> u32 {
    if slot < N_DIRECT {
        0
    } else if slot < N_DIRECT + N_INDIRECT {
        1
    } else {
        2
    }
}

/// 一棵深度为 `depth` 的子树中，每个子项覆盖的数据块个数
#[inline]
fn child_span(depth: u32) -> usize {
    ENTRY_PER_BLOCK.pow(depth - 1)
}

fn lookup(fs: &FileSystem, entry: u32, depth: u32, index: usize) -> Option<u32> {
    if entry == 0 {
        return None;
    }
    if depth == 0 {
        return Some(entry);
    }

    let span = child_span(depth);
    let child = fs
        .cache
        .read(entry)
        .map(0, |table: &IndirectBlock| table[index / span]);
    lookup(fs, child, depth - 1, index % span)
}

/// 与 [`lookup`] 相同，但沿途缺失的索引块与数据块都被分配
fn provide(fs: &FileSystem, entry: &mut u32, depth: u32, index: usize) -> u32 {
    if *entry == 0 {
        *entry = fs.alloc_block();
    }
    if depth == 0 {
        return *entry;
    }

    let span = child_span(depth);
    let pos = index / span;
    let old = fs
        .cache
        .read(*entry)
        .map(0, |table: &IndirectBlock| table[pos]);
    let mut child = old;
    let block_id = provide(fs, &mut child, depth - 1, index % span);
    if child != old {
        let mut table = fs.cache.read(*entry);
        table.get_mut::<IndirectBlock>(0)[pos] = child;
        table.write();
    }

    block_id
}

/// 自底向上释放一棵索引树
fn free_tree(fs: &FileSystem, block_id: u32, depth: u32) {
    if depth > 0 {
        let children = fs
            .cache
            .read(block_id)
            .map(0, |table: &IndirectBlock| *table);
        for child in children.into_iter().filter(|&c| c != 0) {
            free_tree(fs, child, depth - 1);
        }
    }
    fs.free_block(block_id);
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use block_dev::RamDisk;

    use super::*;
    use crate::{CacheConfig, Geometry, SpinScheduler};

    fn fs() -> Arc<FileSystem> {
        let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 32 * 1024));
        let geometry = Geometry {
            total_blocks: 32 * 1024,
            inodes: 128,
        };
        FileSystem::format(disk, Arc::new(SpinScheduler), geometry, CacheConfig::default())
            .unwrap()
    }

    #[test]
    fn round_trip() {
        let fs = fs();
        let file = fs.create_inode(InodeKind::File, 0, 0);
        let mut inode = file.lock();

        let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(inode.write_at(700, &data[..]), data.len());
        assert_eq!(inode.size(), 3700);

        let mut out = vec![0u8; data.len()];
        assert_eq!(inode.read_at(700, &mut out[..]), data.len());
        assert_eq!(out, data);
    }

    #[test]
    fn read_clips_to_size() {
        let fs = fs();
        let file = fs.create_inode(InodeKind::File, 0, 0);
        let mut inode = file.lock();
        inode.write_at(0, b"hello world");

        let mut out = [0u8; 32];
        assert_eq!(inode.read_at(6, &mut out), 5);
        assert_eq!(&out[..5], b"world");
        assert_eq!(inode.read_at(11, &mut out), 0);
        assert_eq!(inode.read_at(100, &mut out), 0);
    }

    #[test]
    fn holes_read_as_zero() {
        let fs = fs();
        let file = fs.create_inode(InodeKind::File, 0, 0);
        let mut inode = file.lock();
        inode.write_at(BLOCK_SIZE * 3, b"tail");

        assert_eq!(inode.direct()[..3], [0, 0, 0]);
        let mut out = vec![0xCCu8; BLOCK_SIZE * 3 + 4];
        assert_eq!(inode.read_at(0, &mut out[..]), out.len());
        assert!(out[..BLOCK_SIZE * 3].iter().all(|&b| b == 0));
        assert_eq!(&out[BLOCK_SIZE * 3..], b"tail");
    }

    #[test]
    fn address_table_boundaries() {
        let fs = fs();
        let file = fs.create_inode(InodeKind::File, 0, 0);
        let mut inode = file.lock();
        let at = |index: usize| index * BLOCK_SIZE;

        inode.write_at(at(DIRECT_CAP - 1), b"d");
        assert_ne!(inode.direct()[N_DIRECT - 1], 0);
        assert_eq!(inode.indirect(), [0, 0]);

        inode.write_at(at(DIRECT_CAP), b"i");
        assert_ne!(inode.indirect()[0], 0);
        assert_eq!(inode.indirect()[1], 0);

        inode.write_at(at(INDIRECT_CAP - 1), b"I");
        assert_ne!(inode.indirect()[1], 0);
        assert_eq!(inode.double_indirect(), [0]);

        inode.write_at(at(INDIRECT_CAP), b"j");
        assert_ne!(inode.double_indirect()[0], 0);

        // 叶子确实落在各自索引块的首尾
        let last_single = fs
            .cache
            .read(inode.indirect()[1])
            .map(0, |t: &IndirectBlock| *t);
        assert_ne!(last_single[ENTRY_PER_BLOCK - 1], 0);
        assert!(last_single[..ENTRY_PER_BLOCK - 1].iter().all(|&b| b == 0));

        let level1 = fs
            .cache
            .read(inode.double_indirect()[0])
            .map(0, |t: &IndirectBlock| t[0]);
        let leaf = fs.cache.read(level1).map(0, |t: &IndirectBlock| t[0]);
        assert_eq!(inode.lookup_block(INDIRECT_CAP), Some(leaf));

        let mut out = [0u8; 1];
        inode.read_at(at(INDIRECT_CAP), &mut out);
        assert_eq!(&out, b"j");
    }

    #[test]
    fn write_beyond_max_size() {
        let fs = fs();
        let file = fs.create_inode(InodeKind::File, 0, 0);
        let mut inode = file.lock();

        assert_eq!(inode.write_at(MAX_FILE_SIZE - 1, b"ab"), 0);
        assert_eq!(inode.size(), 0);
        assert_eq!(inode.write_at(MAX_FILE_SIZE - 1, b"a"), 1);
        assert_eq!(inode.size() as usize, MAX_FILE_SIZE);

        assert_eq!(inode.write_at(usize::MAX, b"x"), 0);
        let mut out = [0u8; 4];
        assert_eq!(inode.read_at(usize::MAX, &mut out), 0);
        assert_eq!(inode.size() as usize, MAX_FILE_SIZE);
    }

    #[test]
    fn truncate_frees_every_block() {
        let fs = fs();
        let file = fs.create_inode(InodeKind::File, 0, 0);
        let mut inode = file.lock();

        inode.write_at(INDIRECT_CAP * BLOCK_SIZE, b"deep");
        let top = inode.double_indirect()[0];
        let level1 = fs.cache.read(top).map(0, |t: &IndirectBlock| t[0]);
        let leaf = fs.cache.read(level1).map(0, |t: &IndirectBlock| t[0]);

        inode.truncate();
        assert_eq!(inode.size(), 0);
        assert!(inode.disk().addrs.iter().all(|&b| b == 0));
        for block_id in [top, level1, leaf] {
            assert!(!fs.block_allocated(block_id));
        }
    }

    #[test]
    fn last_release_reclaims_unlinked_inode() {
        let fs = fs();
        let file = fs.create_inode(InodeKind::File, 0, 0);
        let inum = file.inum();
        let block_id = {
            let mut inode = file.lock();
            inode.write_at(0, b"bye");
            inode.dec_links();
            inode.direct()[0]
        };

        let other = file.clone();
        drop(file);
        // 仍有引用，未回收
        assert!(fs.inode_allocated(inum));

        drop(other);
        assert!(!fs.inode_allocated(inum));
        assert!(!fs.block_allocated(block_id));
        assert_eq!(fs.inodes_in_use(), 0);

        let again = fs.create_inode(InodeKind::File, 0, 0);
        assert_eq!(again.inum(), inum);
        assert_eq!(again.lock().size(), 0);
    }

    #[test]
    fn unallocated_inode_is_left_alone() {
        let fs = fs();
        let inum = 5;
        assert!(!fs.inode_allocated(inum));

        let free = fs.inode(inum);
        assert_eq!(free.lock().kind(), InodeKind::Unused);
        drop(free);

        assert!(!fs.inode_allocated(inum));
        assert_eq!(fs.inodes_in_use(), 0);
    }

    #[test]
    fn metadata_survives_release() {
        let fs = fs();
        let file = fs.create_inode(InodeKind::File, 4, 2);
        let inum = file.inum();
        file.lock().write_at(0, b"persist");
        drop(file);

        let file = fs.inode(inum);
        let inode = file.lock();
        assert_eq!((inode.major(), inode.minor()), (4, 2));
        assert_eq!(inode.stat().size, 7);
        assert_eq!(inode.stat().kind, StatKind::FILE);
    }

    #[test]
    fn inode_cache_exhaustion() {
        let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 256));
        let geometry = Geometry {
            total_blocks: 256,
            inodes: 16,
        };
        let config = CacheConfig {
            inodes: 2,
            ..Default::default()
        };
        let fs = FileSystem::format(disk, Arc::new(SpinScheduler), geometry, config).unwrap();

        let a = fs.inode(1);
        let b = fs.inode(2);
        assert_eq!(fs.try_inode(3).err(), Some(Exhausted::InodeCache));
        // 已缓存的编号仍能命中
        let c = fs.try_inode(1).unwrap();
        drop((a, b, c));
        assert!(fs.try_inode(3).is_ok());
    }
}
