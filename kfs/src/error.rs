use derive_more::Display;

/// 固定容量资源被耗尽。
///
/// 引擎没有排队与背压机制，内部调用者遇到它时直接停机（见 [`fatal`]）；
/// 各组件的 `try_*` 接口把它交还调用者，便于测试容量边界。
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Exhausted {
    #[display(fmt = "run out of block buffers")]
    BufferPool,
    #[display(fmt = "run out of in-memory inodes")]
    InodeCache,
    #[display(fmt = "run out of inodes on disk")]
    InodeBitmap,
    #[display(fmt = "run out of data blocks")]
    DataBitmap,
    #[display(fmt = "run out of open files")]
    FileTable,
}

/// 资源耗尽即停机
#[cold]
#[track_caller]
pub(crate) fn fatal(err: Exhausted) -> ! {
    log::error!("kfs halted: {err}");
    panic!("{err}")
}
