use core::{ptr, slice};

use crate::{BLOCK_SIZE, DIR_NAME_LEN};

/// 空槽标记；名字首字节为 0 的槽同样视为空
pub const UNUSED_INODE: u16 = u16::MAX;

pub const DIRENTS_PER_BLOCK: usize = BLOCK_SIZE / DirEntry::SIZE;

/// 目录块：一个目录的全部目录项
pub type DirBlock = [DirEntry; DIRENTS_PER_BLOCK];

/// 目录项，名字不要求以 \0 结尾
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DirEntry {
    name: [u8; DIR_NAME_LEN],
    inode_id: u16,
}

impl Default for DirEntry {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl DirEntry {
    /// 目录项大小恒为32字节
    pub const SIZE: usize = 32;

    pub const EMPTY: Self = Self {
        name: [0; DIR_NAME_LEN],
        inode_id: 0,
    };

    /// 超长的名字被截断
    pub fn new(name: &[u8], inode_id: u32) -> Self {
        let name = truncate(name);
        let mut raw = [0; DIR_NAME_LEN];
        raw[..name.len()].copy_from_slice(name);

        Self {
            name: raw,
            inode_id: inode_id as u16,
        }
    }

    pub fn name(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(DIR_NAME_LEN);
        &self.name[..len]
    }

    #[inline]
    pub fn inode_id(&self) -> u32 {
        self.inode_id as u32
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.name[0] == 0 || self.inode_id == UNUSED_INODE
    }

    /// 以截断后的名字比较
    #[inline]
    pub fn matches(&self, name: &[u8]) -> bool {
        !self.is_free() && self.name() == truncate(name)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(ptr::from_ref(self).cast(), Self::SIZE) }
    }
}

#[inline]
fn truncate(name: &[u8]) -> &[u8] {
    &name[..name.len().min(DIR_NAME_LEN)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_names_are_truncated() {
        let long = [b'x'; DIR_NAME_LEN + 5];
        let entry = DirEntry::new(&long, 3);

        assert_eq!(entry.name(), &long[..DIR_NAME_LEN]);
        assert!(entry.matches(&long));
        assert!(entry.matches(&long[..DIR_NAME_LEN]));
        assert!(!entry.matches(&long[..DIR_NAME_LEN - 1]));
    }

    #[test]
    fn free_slots() {
        assert!(DirEntry::EMPTY.is_free());
        assert!(DirEntry::new(b"a", UNUSED_INODE as u32).is_free());
        // 根目录的编号为 0，与空槽无关
        assert!(!DirEntry::new(b"..", 0).is_free());
    }
}
