//! Constants used in kfs

/// 块大小，也是所有 I/O 的单位
pub const BLOCK_SIZE: usize = 512;
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;

/// 超级块的魔数
pub const MAGIC: u32 = 0x12345678;
/// 超级块所在块
pub const SUPER_BLOCK_ID: u32 = 0;
/// 根目录的 inode 编号
pub const ROOT_INODE: u32 = 0;

/// 目录项名字的最大字节数，超出部分被截断
pub const DIR_NAME_LEN: usize = 30;

/// 块缓存池大小
pub const NBUF: usize = 64;
/// 内存 inode 缓存池大小
pub const NINODE: usize = 32;
/// 同时打开的文件上限
pub const NFILE: usize = 32;
/// 设备主号上限
pub const NDEV: usize = 10;

/// 挂载时决定的各缓存池容量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub buffers: usize,
    pub inodes: usize,
    pub files: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            buffers: NBUF,
            inodes: NINODE,
            files: NFILE,
        }
    }
}
