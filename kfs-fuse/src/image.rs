use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use kfs::{DIR_NAME_LEN, DirEntry, FileSystem, InodeKind};
use vfs::{Error, Stat};

/// 目录中的一项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub name: String,
    pub stat: Stat,
}

/// 把文件系统错误转换为宿主 I/O 错误
#[inline]
pub fn to_io(err: Error) -> io::Error {
    io::Error::other(err.to_string())
}

/// 把宿主目录 `source` 下的文件树复制到镜像中的目录 `target`，返回复制的文件数
pub fn pack(fs: &Arc<FileSystem>, source: &Path, target: &str) -> io::Result<usize> {
    let mut files = 0;

    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            log::warn!("skip non-UTF-8 name {:?}", entry.file_name());
            continue;
        };
        if name.len() > DIR_NAME_LEN {
            log::warn!("name {name:?} truncated to {DIR_NAME_LEN} bytes");
        }
        let path = format!("{}/{name}", target.trim_end_matches('/'));

        if entry.file_type()?.is_dir() {
            fs.mkdir(&path, None).map_err(to_io)?;
            files += pack(fs, &entry.path(), &path)?;
        } else {
            let mut data = Vec::new();
            File::open(entry.path())?.read_to_end(&mut data)?;

            let inode = fs
                .create(&path, None, InodeKind::File, 0, 0)
                .map_err(to_io)?;
            let written = inode.lock().write_at(0, &data[..]);
            if written != data.len() {
                return Err(io::Error::other(format!("{path} is too large")));
            }
            log::info!("packed {path} ({written} bytes)");
            files += 1;
        }
    }

    Ok(files)
}

/// 列出镜像中目录 `path` 的全部目录项
pub fn list(fs: &Arc<FileSystem>, path: &str) -> Result<Vec<Listing>, Error> {
    let dir = fs.lookup(path, None)?;
    let entries: Vec<DirEntry> = {
        let dir = dir.lock();
        if dir.kind() != InodeKind::Directory {
            return Err(Error::NotADirectory);
        }
        dir.entries()
    };

    entries
        .iter()
        .map(|entry| {
            let stat = fs.inode(entry.inode_id()).lock().stat();
            Ok(Listing {
                name: String::from_utf8_lossy(entry.name()).into_owned(),
                stat,
            })
        })
        .collect()
}

/// 读出镜像中文件 `path` 的全部内容
pub fn cat(fs: &Arc<FileSystem>, path: &str) -> Result<Vec<u8>, Error> {
    let inode = fs.lookup(path, None)?;
    let inode = inode.lock();
    if inode.kind() == InodeKind::Directory {
        return Err(Error::IsADirectory);
    }

    let mut data = vec![0; inode.size() as usize];
    let read = inode.read_at(0, &mut data[..]);
    data.truncate(read);

    Ok(data)
}
