//! 宿主机一侧的 kfs：文件块设备、线程调度器，以及镜像的打包与查看


mod block_file;
mod image;
mod scheduler;

pub use self::{
    block_file::BlockFile,
    image::{Listing, cat, list, pack, to_io},
    scheduler::ThreadScheduler,
};
