//! # 路径解析
//!
//! 以 `/` 分隔的路径自根目录（绝对路径）或当前目录（相对路径）出发，逐级查找。
//!
//! 加锁次序：目录严格自根向叶，任何时刻至多持有父目录与一个子 inode 的内容锁；
//! 持有非目录 inode 的内容锁时不去获取其它 inode 的锁。

use alloc::sync::Arc;

use vfs::Error;

use crate::{FileSystem, InodeKind, InodeRef, dir::is_reserved};

/// 路径中的非空分量
fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|name| !name.is_empty())
}

impl FileSystem {
    fn start(self: &Arc<Self>, path: &str, cwd: Option<&InodeRef>) -> InodeRef {
        match cwd {
            Some(cwd) if !path.starts_with('/') => cwd.clone(),
            _ => self.root(),
        }
    }

    /// 进入目录 `dir` 下名为 `name` 的项
    fn step(self: &Arc<Self>, dir: &InodeRef, name: &str) -> Result<InodeRef, Error> {
        let dir = dir.lock();
        if dir.kind() != InodeKind::Directory {
            return Err(Error::NotADirectory);
        }
        let inum = dir.search(name.as_bytes()).ok_or(Error::NotFound)?;

        // 父目录仍被锁住，子项不会在此期间被回收
        Ok(self.inode(inum))
    }

    /// 解析到路径指向的 inode
    pub fn lookup(self: &Arc<Self>, path: &str, cwd: Option<&InodeRef>) -> Result<InodeRef, Error> {
        let mut inode = self.start(path, cwd);
        for name in components(path) {
            inode = self.step(&inode, name)?;
        }

        Ok(inode)
    }

    /// 解析到最后一个分量所在的目录，返回该目录与最后一个分量
    pub fn lookup_parent<'p>(
        self: &Arc<Self>,
        path: &'p str,
        cwd: Option<&InodeRef>,
    ) -> Result<(InodeRef, &'p str), Error> {
        let mut inode = self.start(path, cwd);
        let mut names = components(path).peekable();

        while let Some(name) = names.next() {
            if names.peek().is_none() {
                return Ok((inode, name));
            }
            inode = self.step(&inode, name)?;
        }

        Err(Error::InvalidPath)
    }

    /// 创建路径指向的 inode；同名项已存在时：
    /// - 要创建文件，而已有的是文件或设备：返回已有的；
    /// - 要创建设备，而已有的是同主号的设备：返回已有的；
    /// - 其余情况报错。
    pub fn create(
        self: &Arc<Self>,
        path: &str,
        cwd: Option<&InodeRef>,
        kind: InodeKind,
        major: u16,
        minor: u16,
    ) -> Result<InodeRef, Error> {
        assert_ne!(kind, InodeKind::Unused);

        let (parent, name) = self.lookup_parent(path, cwd)?;
        let mut dir = parent.lock();
        if dir.kind() != InodeKind::Directory {
            return Err(Error::NotADirectory);
        }

        if let Some(inum) = dir.search(name.as_bytes()) {
            let existing = self.inode(inum);
            drop(dir);

            let (existing_kind, existing_major) = {
                let inode = existing.lock();
                (inode.kind(), inode.major())
            };
            return match (kind, existing_kind) {
                (InodeKind::File, InodeKind::File | InodeKind::Device) => Ok(existing),
                (InodeKind::Device, InodeKind::Device) if existing_major == major => Ok(existing),
                (InodeKind::File | InodeKind::Device, InodeKind::Directory) => {
                    Err(Error::IsADirectory)
                }
                _ => Err(Error::AlreadyExists),
            };
        }

        let inode = self.create_inode(kind, major, minor);
        if kind == InodeKind::Directory {
            let mut child = inode.lock();
            child.add(b".", inode.inum())?;
            child.add(b"..", parent.inum())?;
        }

        if let Err(err) = dir.add(name.as_bytes(), inode.inum()) {
            // 新 inode 没有链接，随最后一个引用一起回收
            inode.lock().dec_links();
            log::debug!("kfs: cannot create {path}: {err}");
            return Err(err);
        }
        if kind == InodeKind::Directory {
            dir.inc_links();
        }
        drop(dir);

        Ok(inode)
    }

    /// 为 `old` 指向的文件建立新名字 `new`；目录不可硬链接
    pub fn link(self: &Arc<Self>, old: &str, new: &str, cwd: Option<&InodeRef>) -> Result<(), Error> {
        let inode = self.lookup(old, cwd)?;
        {
            let mut inode = inode.lock();
            if inode.kind() == InodeKind::Directory {
                return Err(Error::IsADirectory);
            }
            inode.inc_links();
        }

        // 先行增加的链接计数在失败时撤销
        if let Err(err) = self.add_name(new, cwd, inode.inum()) {
            inode.lock().dec_links();
            return Err(err);
        }

        Ok(())
    }

    fn add_name(self: &Arc<Self>, path: &str, cwd: Option<&InodeRef>, inum: u32) -> Result<(), Error> {
        let (parent, name) = self.lookup_parent(path, cwd)?;
        let mut dir = parent.lock();
        if dir.kind() != InodeKind::Directory {
            return Err(Error::NotADirectory);
        }

        dir.add(name.as_bytes(), inum).map(|_| ())
    }

    /// 删除路径对应的目录项；目录仅在只剩 `.` 与 `..` 时才能删除
    pub fn unlink(self: &Arc<Self>, path: &str, cwd: Option<&InodeRef>) -> Result<(), Error> {
        let (parent, name) = self.lookup_parent(path, cwd)?;
        if is_reserved(name.as_bytes()) {
            return Err(Error::InvalidPath);
        }

        let mut dir = parent.lock();
        if dir.kind() != InodeKind::Directory {
            return Err(Error::NotADirectory);
        }
        let inum = dir.search(name.as_bytes()).ok_or(Error::NotFound)?;

        let inode = self.inode(inum);
        let mut target = inode.lock();
        let is_dir = target.kind() == InodeKind::Directory;
        if is_dir && !target.is_empty_dir() {
            return Err(Error::DirectoryNotEmpty);
        }

        dir.delete(name.as_bytes());
        if is_dir {
            // 子目录的 `..` 随之消失
            dir.dec_links();
        }
        target.dec_links();
        drop(target);
        drop(dir);

        Ok(())
    }

    /// 切换当前目录
    pub fn chdir(self: &Arc<Self>, path: &str, cwd: &mut InodeRef) -> Result<(), Error> {
        let inode = self.lookup(path, Some(&*cwd))?;
        if inode.lock().kind() != InodeKind::Directory {
            return Err(Error::NotADirectory);
        }
        *cwd = inode;

        Ok(())
    }
}
