use enumflags2::bitflags;

/// 文件状态，由内核拷贝给用户
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub dev: u32,
    /// Inode number
    pub inode: u32,
    pub kind: StatKind,
    /// 硬链接个数
    pub links: u32,
    /// File size
    pub size: u64,
}

#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatKind {
    CHAR = 0o020000,
    DIR = 0o040000,
    #[default]
    FILE = 0o100000,
}
