use derive_more::Display;

/// 交给系统调用层的可恢复错误；资源耗尽与契约违背不在此列
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[display(fmt = "no such file or directory")]
    NotFound,
    #[display(fmt = "file exists")]
    AlreadyExists,
    #[display(fmt = "not a directory")]
    NotADirectory,
    #[display(fmt = "is a directory")]
    IsADirectory,
    #[display(fmt = "directory not empty")]
    DirectoryNotEmpty,
    /// 目录仅占一块，块内目录项已满
    #[display(fmt = "directory full")]
    DirectoryFull,
    #[display(fmt = "invalid path")]
    InvalidPath,
    #[display(fmt = "file not opened for reading")]
    NotReadable,
    #[display(fmt = "file not opened for writing")]
    NotWritable,
    #[display(fmt = "file does not support seeking")]
    NotSeekable,
    #[display(fmt = "no driver for device")]
    NoDevice,
    #[display(fmt = "invalid super block")]
    InvalidSuperBlock,
    #[display(fmt = "invalid disk geometry")]
    InvalidGeometry,
}
