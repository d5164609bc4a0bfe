use std::mem;

use kfs::{
    BLOCK_SIZE, DIR_NAME_LEN,
    layout::{
        DiskInode, DirEntry, ENTRY_PER_BLOCK, INDIRECT_CAP, INODES_PER_BLOCK, MAX_BLOCKS,
        N_ADDRS, SuperBlock,
    },
};

#[test]
fn sizes() {
    assert_eq!(64, mem::size_of::<DiskInode>());
    assert_eq!(32, mem::size_of::<DirEntry>());
    assert_eq!(DIR_NAME_LEN + 2, mem::size_of::<DirEntry>());
    assert!(mem::size_of::<SuperBlock>() <= BLOCK_SIZE);
}

#[test]
fn address_table() {
    assert_eq!(13, N_ADDRS);
    assert_eq!(128, ENTRY_PER_BLOCK);
    assert_eq!(8, INODES_PER_BLOCK);
    assert_eq!(10 + 2 * 128, INDIRECT_CAP);
    assert_eq!(10 + 2 * 128 + 128 * 128, MAX_BLOCKS);
}
