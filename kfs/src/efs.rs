//! # 磁盘块管理器层
//!
//! 构建出磁盘的布局并使用，管理 inode 与数据块的分配。

use alloc::sync::Arc;
use core::sync::atomic::AtomicUsize;

use block_dev::BlockDevice;
use spin::Mutex;
use vfs::Error;

use crate::{
    BLOCK_SIZE, BufferCache, CacheConfig, CharDevice, Exhausted, InodeKind, InodeRef, NDEV,
    ROOT_INODE, SUPER_BLOCK_ID,
    error::fatal,
    inode::InodeCache,
    layout::{Bitmap, DataBlock, DiskInode, Geometry, SuperBlock},
    sync::Scheduler,
};

pub struct FileSystem {
    sb: SuperBlock,
    pub(crate) cache: BufferCache,
    inode_bitmap: Bitmap,
    data_bitmap: Bitmap,
    pub(crate) icache: InodeCache,
    pub(crate) sched: Arc<dyn Scheduler>,
    /// 按主设备号登记的字符设备驱动
    pub(crate) devices: Mutex<[Option<Arc<dyn CharDevice>>; NDEV]>,
    /// 已打开的文件数
    pub(crate) open_files: AtomicUsize,
    pub(crate) max_files: usize,
}

impl FileSystem {
    fn new(
        sb: SuperBlock,
        cache: BufferCache,
        sched: Arc<dyn Scheduler>,
        config: CacheConfig,
    ) -> Self {
        let inode_bitmap = Bitmap::new(sb.inode_bitmap_start, sb.inode_bitmap_blocks, sb.inodes);
        let data_bitmap = Bitmap::new(
            sb.data_bitmap_start,
            sb.data_bitmap_blocks,
            sb.data_blocks,
        );

        Self {
            sb,
            cache,
            inode_bitmap,
            data_bitmap,
            icache: InodeCache::new(config.inodes),
            sched,
            devices: Mutex::new([const { None }; NDEV]),
            open_files: AtomicUsize::new(0),
            max_files: config.files,
        }
    }

    /// 在块设备上建立新的文件系统，仅含根目录
    pub fn format(
        device: Arc<dyn BlockDevice>,
        sched: Arc<dyn Scheduler>,
        geometry: Geometry,
        config: CacheConfig,
    ) -> Result<Arc<Self>, Error> {
        let sb = geometry.validate()?;
        if let Some(blocks) = device.block_count()
            && sb.total_blocks as usize > blocks
        {
            log::warn!(
                "kfs: geometry needs {} blocks but device has {blocks}",
                sb.total_blocks
            );
            return Err(Error::InvalidGeometry);
        }

        // 缓存建立之前直接清零元数据区
        let zeros: DataBlock = [0; BLOCK_SIZE];
        for block_id in 0..sb.data_start {
            device.write_block(block_id as usize, &zeros);
        }

        let cache = BufferCache::new(device, sched.clone(), config.buffers);
        {
            let mut sb_block = cache.read(SUPER_BLOCK_ID);
            *sb_block.get_mut::<SuperBlock>(0) = sb;
            sb_block.write();
        }

        let fs = Arc::new(Self::new(sb, cache, sched, config));

        let root = fs.create_inode(InodeKind::Directory, 0, 0);
        assert_eq!(root.inum(), ROOT_INODE);
        {
            let mut root = root.lock();
            root.add(b".", ROOT_INODE)?;
            root.add(b"..", ROOT_INODE)?;
        }
        drop(root);

        log::info!(
            "kfs formatted: {} blocks, {} inodes, {} data blocks from block {}",
            sb.total_blocks,
            sb.inodes,
            sb.data_blocks,
            sb.data_start,
        );

        Ok(fs)
    }

    /// 挂载块设备上已有的文件系统
    pub fn mount(
        device: Arc<dyn BlockDevice>,
        sched: Arc<dyn Scheduler>,
        config: CacheConfig,
    ) -> Result<Arc<Self>, Error> {
        let cache = BufferCache::new(device, sched.clone(), config.buffers);
        let sb = cache
            .read(SUPER_BLOCK_ID)
            .map(0, |sb: &SuperBlock| *sb);
        if !sb.is_valid() {
            log::warn!("kfs: invalid super block {sb:?}");
            return Err(Error::InvalidSuperBlock);
        }

        log::info!(
            "kfs mounted: {} blocks, {} inodes",
            sb.total_blocks,
            sb.inodes
        );

        Ok(Arc::new(Self::new(sb, cache, sched, config)))
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.sb
    }

    #[inline]
    pub fn cache(&self) -> &BufferCache {
        &self.cache
    }

    #[inline]
    pub fn scheduler(&self) -> &dyn Scheduler {
        self.sched.as_ref()
    }

    pub fn root(self: &Arc<Self>) -> InodeRef {
        self.inode(ROOT_INODE)
    }

    /// 分配新的 inode 并写入初始元数据，链接计数为 1
    pub fn create_inode(self: &Arc<Self>, kind: InodeKind, major: u16, minor: u16) -> InodeRef {
        self.try_create_inode(kind, major, minor)
            .unwrap_or_else(|err| fatal(err))
    }

    pub fn try_create_inode(
        self: &Arc<Self>,
        kind: InodeKind,
        major: u16,
        minor: u16,
    ) -> Result<InodeRef, Exhausted> {
        let inum = self.try_alloc_inode()?;
        let inode = match self.try_inode(inum) {
            Ok(inode) => inode,
            Err(err) => {
                self.free_inode(inum);
                return Err(err);
            }
        };

        {
            let mut guard = inode.lock();
            guard.init(DiskInode::new(kind, major, minor));
        }
        log::debug!("kfs: created inode {inum} as {kind:?}");

        Ok(inode)
    }

    /// 在磁盘上分配新的 inode 并返回其编号
    pub fn alloc_inode(&self) -> u32 {
        self.try_alloc_inode().unwrap_or_else(|err| fatal(err))
    }

    pub fn try_alloc_inode(&self) -> Result<u32, Exhausted> {
        self.inode_bitmap
            .alloc(&self.cache)
            .ok_or(Exhausted::InodeBitmap)
    }

    pub fn free_inode(&self, inum: u32) {
        log::trace!("kfs: free inode {inum}");
        self.inode_bitmap.dealloc(&self.cache, inum);
    }

    /// 在磁盘上分配新的数据块并返回其块号，内容已清零
    pub fn alloc_block(&self) -> u32 {
        self.try_alloc_block().unwrap_or_else(|err| fatal(err))
    }

    pub fn try_alloc_block(&self) -> Result<u32, Exhausted> {
        let bit = self
            .data_bitmap
            .alloc(&self.cache)
            .ok_or(Exhausted::DataBitmap)?;
        let block_id = self.sb.data_start + bit;

        let mut block = self.cache.read(block_id);
        block.bytes_mut().fill(0);
        block.write();
        log::trace!("kfs: alloc block {block_id}");

        Ok(block_id)
    }

    pub fn free_block(&self, block_id: u32) {
        assert!(
            (self.sb.data_start..self.sb.data_start + self.sb.data_blocks).contains(&block_id),
            "block {block_id} is not a data block"
        );
        log::trace!("kfs: free block {block_id}");
        self.data_bitmap
            .dealloc(&self.cache, block_id - self.sb.data_start);
    }

    /// 数据块是否已分配
    pub fn block_allocated(&self, block_id: u32) -> bool {
        block_id >= self.sb.data_start
            && self
                .data_bitmap
                .test(&self.cache, block_id - self.sb.data_start)
    }

    /// inode 编号是否已分配
    pub fn inode_allocated(&self, inum: u32) -> bool {
        self.inode_bitmap.test(&self.cache, inum)
    }
}
