#![cfg_attr(not(test), no_std)]

extern crate alloc;

/* kfs 的整体架构，自上而下 */

// 文件层：打开的文件、设备表
mod file;
pub use file::{CharDevice, OpenFile, OpenFlag, Whence};

// 路径解析：查找、创建、链接与删除
mod path;

// 目录层：单块目录的目录项操作
mod dir;

// 索引节点层：内存 inode 缓存与文件内容读写
mod inode;
pub use inode::{InodeGuard, InodeRef};

// 磁盘块管理器层
mod efs;
pub use efs::FileSystem;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
pub mod layout;
pub use layout::{DirEntry, Geometry, InodeKind, SuperBlock};

// 块缓存层：内存上的磁盘块数据缓存
mod block_cache;
pub use block_cache::{BlockData, BufferCache, BufferGuard};

// 同步原语：短锁与睡眠锁
mod sync;
pub use sync::{Scheduler, SleepGuard, SleepLock, SpinScheduler, TaskId};

// 与调用者内存之间的拷贝
mod mem;
pub use mem::{DstBuf, SrcBuf, UserSpace};

mod error;
pub use error::Exhausted;

pub mod config;
pub use config::*;

pub use block_dev::BlockDevice;
