use crate::BLOCK_SIZE;

/// 直接索引个数
pub const N_DIRECT: usize = 10;
/// 一级间接索引个数
pub const N_INDIRECT: usize = 2;
/// 二级间接索引个数
pub const N_DOUBLE: usize = 1;
pub const N_ADDRS: usize = N_DIRECT + N_INDIRECT + N_DOUBLE;

/// 一个索引块容纳的块号个数
pub const ENTRY_PER_BLOCK: usize = BLOCK_SIZE / size_of::<u32>();
/// 直接索引覆盖的块数
pub const DIRECT_CAP: usize = N_DIRECT;
/// 直接索引与一级间接索引共同覆盖的块数
pub const INDIRECT_CAP: usize = DIRECT_CAP + N_INDIRECT * ENTRY_PER_BLOCK;
/// 单个文件的最大块数
pub const MAX_BLOCKS: usize = INDIRECT_CAP + N_DOUBLE * ENTRY_PER_BLOCK * ENTRY_PER_BLOCK;
pub const MAX_FILE_SIZE: usize = MAX_BLOCKS * BLOCK_SIZE;

pub const INODE_SIZE: usize = 64;
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;

/// 索引块：块号数组，0 表示尚未分配
pub type IndirectBlock = [u32; ENTRY_PER_BLOCK];

/// 磁盘上的 inode
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct DiskInode {
    kind: u16,
    pub major: u16,
    pub minor: u16,
    /// 硬链接计数
    pub nlink: u16,
    /// 文件字节数
    pub size: u32,
    /// 直接 | 一级间接 | 二级间接
    pub addrs: [u32; N_ADDRS],
}

#[repr(u16)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    #[default]
    Unused = 0,
    Directory = 1,
    File = 2,
    Device = 3,
}

impl DiskInode {
    pub fn new(kind: InodeKind, major: u16, minor: u16) -> Self {
        Self {
            kind: kind as u16,
            major,
            minor,
            nlink: 1,
            ..Default::default()
        }
    }

    pub fn kind(&self) -> InodeKind {
        match self.kind {
            0 => InodeKind::Unused,
            1 => InodeKind::Directory,
            2 => InodeKind::File,
            3 => InodeKind::Device,
            other => panic!("corrupted inode kind {other}"),
        }
    }

    #[inline]
    pub fn set_kind(&mut self, kind: InodeKind) {
        self.kind = kind as u16;
    }

    #[inline]
    pub fn direct(&self) -> &[u32] {
        &self.addrs[..N_DIRECT]
    }

    #[inline]
    pub fn indirect(&self) -> &[u32] {
        &self.addrs[N_DIRECT..N_DIRECT + N_INDIRECT]
    }

    #[inline]
    pub fn double_indirect(&self) -> &[u32] {
        &self.addrs[N_DIRECT + N_INDIRECT..]
    }
}
