use crate::{BlkId, InodeId};

/// Written at the start of the super block.
pub const TINY_FS_MAGIC: u32 = 0x5C3A;

/// The inode id of the root directory
pub const TINY_FS_ROOT_INO: InodeId = 0;

/// Number of direct blocks in inode
pub const INODE_DIRECT_BLK_COUNT: usize = 16;

pub const SUPER_BLK_ID: BlkId = 0;
pub const INODE_BITMAP_BLK_ID: BlkId = SUPER_BLK_ID + 1;

/// Maximum length of a directory entry name.
pub const DIR_ENTRY_NAME_CAP: usize = 252;

/// On-disk size of a directory entry.
pub const DIR_ENTRY_LEN: usize = 256;

pub const MIN_BLK_SIZE: u32 = 512;
pub const MAX_BLK_SIZE: u32 = 64 * 1024;
pub const DEFAULT_BLK_SIZE: u32 = 4096;
pub const DEFAULT_INODES_COUNT: u16 = 1024;
pub const DEFAULT_DATA_BLKS_COUNT: u32 = 16384;

/// Unit of `RawInode::blocks`.
pub const STAT_BLK_SIZE: u32 = 512;
