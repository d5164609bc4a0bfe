//! # 目录层
//!
//! 目录内容是一个数据块中的 [`DirEntry`] 数组，目录大小记录用到过的最高槽位。
//! 以下操作都要求持有目录 inode 的内容锁。

use alloc::vec::Vec;

use vfs::Error;

use crate::{
    DstBuf, InodeGuard, InodeKind,
    layout::{DIRENTS_PER_BLOCK, DirBlock, DirEntry},
};

impl InodeGuard<'_> {
    #[track_caller]
    fn assert_dir(&self) {
        assert_eq!(
            self.kind(),
            InodeKind::Directory,
            "inode {} is not a directory",
            self.inum()
        );
    }

    /// 逐个查看已用槽位，`f` 返回 `Some` 时停止
    fn scan<V>(&self, mut f: impl FnMut(usize, &DirEntry) -> Option<V>) -> Option<V> {
        self.assert_dir();
        let block_id = self.direct()[0];
        if block_id == 0 {
            return None;
        }

        let used = self.size() as usize / DirEntry::SIZE;
        self.fs().cache.read(block_id).map(0, |entries: &DirBlock| {
            entries[..used.min(DIRENTS_PER_BLOCK)]
                .iter()
                .enumerate()
                .find_map(|(slot, entry)| f(slot, entry))
        })
    }

    /// 按名字查找目录项，返回其 inode 编号
    pub fn search(&self, name: &[u8]) -> Option<u32> {
        self.scan(|_, entry| entry.matches(name).then(|| entry.inode_id()))
    }

    /// 新增目录项，返回其在目录中的字节偏移
    pub fn add(&mut self, name: &[u8], inum: u32) -> Result<usize, Error> {
        if name.is_empty() {
            return Err(Error::InvalidPath);
        }
        if self.search(name).is_some() {
            return Err(Error::AlreadyExists);
        }

        let slot = self
            .scan(|slot, entry| entry.is_free().then_some(slot))
            .unwrap_or(self.size() as usize / DirEntry::SIZE);
        if slot >= DIRENTS_PER_BLOCK {
            return Err(Error::DirectoryFull);
        }

        let offset = slot * DirEntry::SIZE;
        self.write_at(offset, DirEntry::new(name, inum).as_bytes());
        Ok(offset)
    }

    /// 删除目录项并返回其 inode 编号；链接计数由调用者维护
    pub fn delete(&mut self, name: &[u8]) -> Option<u32> {
        let (slot, inum) =
            self.scan(|slot, entry| entry.matches(name).then(|| (slot, entry.inode_id())))?;
        self.write_at(slot * DirEntry::SIZE, DirEntry::EMPTY.as_bytes());
        Some(inum)
    }

    /// 把非空目录项按 32 字节记录依次拷出，最多拷满 `dst`，返回拷出的字节数
    pub fn list<'b>(&self, dst: impl Into<DstBuf<'b>>) -> usize {
        let mut dst = dst.into();
        let max = dst.len() / DirEntry::SIZE * DirEntry::SIZE;

        let mut copied = 0;
        self.scan(|_, entry| {
            if copied >= max {
                return Some(());
            }
            if !entry.is_free() {
                dst.copy_from(copied, entry.as_bytes());
                copied += DirEntry::SIZE;
            }
            None
        });

        copied
    }

    /// 全部非空目录项
    pub fn entries(&self) -> Vec<DirEntry> {
        let mut entries = Vec::new();
        self.scan(|_, entry| {
            if !entry.is_free() {
                entries.push(*entry);
            }
            None::<()>
        });
        entries
    }

    /// 除 `.` 与 `..` 外没有其它目录项
    pub fn is_empty_dir(&self) -> bool {
        self.scan(|_, entry| (!entry.is_free() && !is_reserved(entry.name())).then_some(()))
            .is_none()
    }
}

/// `.` 与 `..`
#[inline]
pub(crate) fn is_reserved(name: &[u8]) -> bool {
    name == b"." || name == b".."
}
