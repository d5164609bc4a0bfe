//! # 文件层
//!
//! 打开的文件与设备表，供系统调用层使用。

use alloc::sync::Arc;
use core::sync::atomic::{AtomicUsize, Ordering};

use enumflags2::{BitFlags, bitflags};
use vfs::{Error, Stat};

use crate::{
    DstBuf, Exhausted, FileSystem, InodeKind, InodeRef, NDEV, SrcBuf, error::fatal,
};

#[rustfmt::skip]
#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    /// 只写
    WRONLY = 0b0000_0000_0001,
    /// 读写兼备
    RDWR   = 0b0000_0000_0010,
    /// 文件不存在时创建
    CREATE = 0b0010_0000_0000,
    /// 先清空文件，再交给用户
    TRUNC  = 0b0100_0000_0000,
}

impl OpenFlag {
    // enumflags2拒绝值为0的标志
    /// 只读
    pub const RDONLY: u32 = 0b0000_0000_0000;

    #[inline]
    pub fn read_only() -> BitFlags<OpenFlag> {
        BitFlags::from_bits_truncate(Self::RDONLY)
    }
}

/// 调整偏移量的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// 绝对偏移
    Set,
    /// 向后移动，不超过 `usize::MAX`
    Add,
    /// 向前移动，不小于 0
    Sub,
}

/// 字符设备驱动，按主设备号登记
pub trait CharDevice: Send + Sync {
    fn read(&self, dst: DstBuf<'_>) -> usize;

    fn write(&self, src: SrcBuf<'_>) -> usize;
}

/// 表示打开的文件、目录或设备
pub struct OpenFile {
    readable: bool,
    writable: bool,
    kind: InodeKind,
    major: u16,
    /// **文件**内的偏移量，只在 inode 内容锁之下修改
    offset: AtomicUsize,
    inode: InodeRef,
}

impl FileSystem {
    /// 登记主设备号为 `major` 的驱动
    pub fn register_device(&self, major: u16, device: Arc<dyn CharDevice>) {
        assert!((major as usize) < NDEV, "major {major} out of range");
        self.devices.lock()[major as usize] = Some(device);
    }

    fn device(&self, major: u16) -> Result<Arc<dyn CharDevice>, Error> {
        self.devices
            .lock()
            .get(major as usize)
            .and_then(Option::clone)
            .ok_or(Error::NoDevice)
    }

    /// 打开文件；文件表已满时停机
    pub fn open(
        self: &Arc<Self>,
        path: &str,
        flags: BitFlags<OpenFlag>,
        cwd: Option<&InodeRef>,
    ) -> Result<Arc<OpenFile>, Error> {
        let [readable, writable] = if flags.is_empty() {
            [true, false]
        } else if flags.contains(OpenFlag::WRONLY) {
            [false, true]
        } else {
            [true, true]
        };

        let inode = if flags.contains(OpenFlag::CREATE) {
            self.create(path, cwd, InodeKind::File, 0, 0)?
        } else {
            self.lookup(path, cwd)?
        };

        let (kind, major) = {
            let mut guard = inode.lock();
            let kind = guard.kind();
            if kind == InodeKind::Directory && writable {
                return Err(Error::IsADirectory);
            }
            if kind == InodeKind::File && flags.contains(OpenFlag::TRUNC) {
                guard.truncate();
            }
            (kind, guard.major())
        };

        self.reserve_file();
        log::trace!("kfs: open {path} as inode {}", inode.inum());

        Ok(Arc::new(OpenFile {
            readable,
            writable,
            kind,
            major,
            offset: AtomicUsize::new(0),
            inode,
        }))
    }

    pub fn mkdir(self: &Arc<Self>, path: &str, cwd: Option<&InodeRef>) -> Result<(), Error> {
        self.create(path, cwd, InodeKind::Directory, 0, 0)
            .map(|_| ())
    }

    pub fn mknod(
        self: &Arc<Self>,
        path: &str,
        major: u16,
        minor: u16,
        cwd: Option<&InodeRef>,
    ) -> Result<(), Error> {
        self.create(path, cwd, InodeKind::Device, major, minor)
            .map(|_| ())
    }

    fn reserve_file(&self) {
        let reserved = self
            .open_files
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_files).then_some(n + 1)
            });
        if reserved.is_err() {
            fatal(Exhausted::FileTable);
        }
    }

    /// 当前打开的文件数
    pub fn open_files(&self) -> usize {
        self.open_files.load(Ordering::Acquire)
    }
}

impl OpenFile {
    #[inline]
    pub fn readable(&self) -> bool {
        self.readable
    }

    #[inline]
    pub fn writable(&self) -> bool {
        self.writable
    }

    #[inline]
    pub fn kind(&self) -> InodeKind {
        self.kind
    }

    #[inline]
    pub fn inode(&self) -> &InodeRef {
        &self.inode
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset.load(Ordering::Acquire)
    }

    /// 自当前偏移读出，偏移随之后移
    pub fn read<'b>(&self, dst: impl Into<DstBuf<'b>>) -> Result<usize, Error> {
        if !self.readable {
            return Err(Error::NotReadable);
        }
        let dst = dst.into();

        if self.kind == InodeKind::Device {
            return Ok(self.inode.fs().device(self.major)?.read(dst));
        }

        let inode = self.inode.lock();
        let offset = self.offset.load(Ordering::Acquire);
        let read = inode.read_at(offset, dst);
        self.offset.store(offset + read, Ordering::Release);

        Ok(read)
    }

    /// 自当前偏移写入，偏移随之后移
    pub fn write<'b>(&self, src: impl Into<SrcBuf<'b>>) -> Result<usize, Error> {
        if !self.writable {
            return Err(Error::NotWritable);
        }
        let src = src.into();

        if self.kind == InodeKind::Device {
            return Ok(self.inode.fs().device(self.major)?.write(src));
        }

        let mut inode = self.inode.lock();
        let offset = self.offset.load(Ordering::Acquire);
        let written = inode.write_at(offset, src);
        self.offset.store(offset + written, Ordering::Release);

        Ok(written)
    }

    /// 调整偏移量并返回新值，仅支持普通文件
    pub fn seek(&self, offset: usize, whence: Whence) -> Result<usize, Error> {
        if self.kind != InodeKind::File {
            return Err(Error::NotSeekable);
        }

        let _inode = self.inode.lock();
        let current = self.offset.load(Ordering::Acquire);
        let new = match whence {
            Whence::Set => offset,
            Whence::Add => current.saturating_add(offset),
            Whence::Sub => current.saturating_sub(offset),
        };
        self.offset.store(new, Ordering::Release);

        Ok(new)
    }

    pub fn stat(&self) -> Stat {
        self.inode.lock().stat()
    }

    /// 以 32 字节记录列出目录项，返回拷出的字节数
    pub fn read_dir<'b>(&self, dst: impl Into<DstBuf<'b>>) -> Result<usize, Error> {
        if self.kind != InodeKind::Directory {
            return Err(Error::NotADirectory);
        }
        if !self.readable {
            return Err(Error::NotReadable);
        }

        Ok(self.inode.lock().list(dst))
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        self.inode
            .fs()
            .open_files
            .fetch_sub(1, Ordering::AcqRel);
    }
}

impl core::fmt::Debug for OpenFile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OpenFile")
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .field("kind", &self.kind)
            .field("offset", &self.offset())
            .field("inode", &self.inode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use block_dev::RamDisk;

    use super::*;
    use crate::{BLOCK_SIZE, CacheConfig, Geometry, SpinScheduler, layout::DirEntry};

    fn fs_with(config: CacheConfig) -> Arc<FileSystem> {
        let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 1024));
        let geometry = Geometry {
            total_blocks: 1024,
            inodes: 64,
        };
        FileSystem::format(disk, Arc::new(SpinScheduler), geometry, config).unwrap()
    }

    fn fs() -> Arc<FileSystem> {
        fs_with(CacheConfig::default())
    }

    #[test]
    fn open_flags() {
        let fs = fs();
        assert_eq!(
            fs.open("/f", OpenFlag::read_only(), None).err(),
            Some(Error::NotFound)
        );

        let file = fs.open("/f", OpenFlag::CREATE | OpenFlag::WRONLY, None).unwrap();
        assert!(!file.readable() && file.writable());
        assert_eq!(file.write(b"hello"), Ok(5));
        assert_eq!(file.read(&mut [0u8; 4]), Err(Error::NotReadable));

        let file = fs.open("/f", OpenFlag::read_only(), None).unwrap();
        assert_eq!(file.write(b"x"), Err(Error::NotWritable));
        let mut buf = [0u8; 8];
        assert_eq!(file.read(&mut buf), Ok(5));
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(file.read(&mut buf), Ok(0));

        let file = fs.open("/f", OpenFlag::RDWR | OpenFlag::TRUNC, None).unwrap();
        assert_eq!(file.stat().size, 0);
        assert!(file.readable() && file.writable());
    }

    #[test]
    fn offsets_and_seek() {
        let fs = fs();
        let file = fs.open("/f", OpenFlag::CREATE | OpenFlag::RDWR, None).unwrap();
        file.write(b"0123456789").unwrap();
        assert_eq!(file.offset(), 10);

        assert_eq!(file.seek(2, Whence::Set), Ok(2));
        assert_eq!(file.seek(3, Whence::Add), Ok(5));
        let mut buf = [0u8; 3];
        file.read(&mut buf).unwrap();
        assert_eq!(&buf, b"567");
        assert_eq!(file.seek(100, Whence::Sub), Ok(0));

        // 共享偏移量
        let dup = file.clone();
        dup.read(&mut buf).unwrap();
        assert_eq!(file.offset(), 3);
    }

    #[test]
    fn huge_offsets_degrade() {
        let fs = fs();
        let file = fs.open("/f", OpenFlag::CREATE | OpenFlag::RDWR, None).unwrap();
        file.write(b"data").unwrap();

        assert_eq!(file.seek(usize::MAX, Whence::Set), Ok(usize::MAX));
        assert_eq!(file.write(b"x"), Ok(0));
        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf), Ok(0));
        assert_eq!(file.seek(1, Whence::Add), Ok(usize::MAX));
        assert_eq!(file.offset(), usize::MAX);
        assert_eq!(file.stat().size, 4);
    }

    #[test]
    fn directories() {
        let fs = fs();
        fs.mkdir("/d", None).unwrap();
        fs.mkdir("/d/e", None).unwrap();

        assert_eq!(
            fs.open("/d", OpenFlag::RDWR.into(), None).err(),
            Some(Error::IsADirectory)
        );
        let dir = fs.open("/d", OpenFlag::read_only(), None).unwrap();
        assert_eq!(dir.seek(0, Whence::Set), Err(Error::NotSeekable));
        assert_eq!(dir.stat().kind, vfs::StatKind::DIR);
        assert_eq!(dir.stat().links, 2);

        let mut buf = [0u8; 4 * DirEntry::SIZE];
        assert_eq!(dir.read_dir(&mut buf), Ok(3 * DirEntry::SIZE));
        assert_eq!(&buf[2 * DirEntry::SIZE..2 * DirEntry::SIZE + 1], b"e");

        let file = fs.open("/d/f", OpenFlag::CREATE.into(), None).unwrap();
        assert_eq!(file.read_dir(&mut buf), Err(Error::NotADirectory));
    }

    struct Echo(Mutex<std::vec::Vec<u8>>);

    impl CharDevice for Echo {
        fn read(&self, mut dst: DstBuf<'_>) -> usize {
            let data = self.0.lock().unwrap();
            let n = data.len().min(dst.len());
            dst.copy_from(0, &data[..n]);
            n
        }

        fn write(&self, src: SrcBuf<'_>) -> usize {
            let mut buf = std::vec![0u8; src.len()];
            src.copy_to(0, &mut buf);
            *self.0.lock().unwrap() = buf;
            src.len()
        }
    }

    #[test]
    fn device_files() {
        let fs = fs();
        fs.mknod("/console", 1, 0, None).unwrap();
        fs.mknod("/null", 2, 0, None).unwrap();
        fs.register_device(1, Arc::new(Echo(Mutex::new(std::vec::Vec::new()))));

        let console = fs.open("/console", OpenFlag::RDWR.into(), None).unwrap();
        assert_eq!(console.write(b"ping"), Ok(4));
        let mut buf = [0u8; 8];
        assert_eq!(console.read(&mut buf), Ok(4));
        assert_eq!(&buf[..4], b"ping");
        assert_eq!(console.seek(0, Whence::Set), Err(Error::NotSeekable));
        assert_eq!(console.stat().kind, vfs::StatKind::CHAR);

        let null = fs.open("/null", OpenFlag::RDWR.into(), None).unwrap();
        assert_eq!(null.write(b"x"), Err(Error::NoDevice));

        // 以 CREATE 打开已有设备得到设备本身
        let again = fs.open("/console", OpenFlag::CREATE | OpenFlag::RDWR, None).unwrap();
        assert_eq!(again.kind(), InodeKind::Device);
    }

    #[test]
    fn close_releases_table_slot() {
        let fs = fs_with(CacheConfig {
            files: 2,
            ..Default::default()
        });
        let a = fs.open("/a", OpenFlag::CREATE.into(), None).unwrap();
        let b = fs.open("/b", OpenFlag::CREATE.into(), None).unwrap();
        assert_eq!(fs.open_files(), 2);

        drop(a);
        let c = fs.open("/c", OpenFlag::CREATE.into(), None).unwrap();
        drop((b, c));
        assert_eq!(fs.open_files(), 0);
    }

    #[test]
    #[should_panic(expected = "run out of open files")]
    fn file_table_exhaustion() {
        let fs = fs_with(CacheConfig {
            files: 1,
            ..Default::default()
        });
        let _a = fs.open("/a", OpenFlag::CREATE.into(), None).unwrap();
        let _ = fs.open("/b", OpenFlag::CREATE.into(), None);
    }

    #[test]
    fn unlinked_file_lives_until_close() {
        let fs = fs();
        let file = fs.open("/f", OpenFlag::CREATE | OpenFlag::RDWR, None).unwrap();
        file.write(b"still here").unwrap();
        let inum = file.inode().inum();

        fs.unlink("/f", None).unwrap();
        file.seek(0, Whence::Set).unwrap();
        let mut buf = [0u8; 10];
        assert_eq!(file.read(&mut buf), Ok(10));
        assert!(fs.inode_allocated(inum));

        drop(file);
        assert!(!fs.inode_allocated(inum));
    }
}
