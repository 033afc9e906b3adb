#![no_std]

#[allow(unused_imports)]
#[macro_use]
extern crate alloc;
#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

mod allocator;
mod blk_device;
pub mod consts;
mod data;
pub mod dir;
mod format;
pub mod inode;
mod namespace;
pub mod path;
mod ram_disk;
mod super_blk;

use inode::Inode;

pub type Result<T> = core::result::Result<T, Error>;

pub use blk_device::{BlkDevice, Disk, DiskError, DiskResult, FromBytes, ToBytes};
pub use dir::{DirEntryName, RawDirEntry};
pub use format::FormatOptions;
pub use inode::{FileType, Mode, RawInode};
pub use path::Path;
pub use ram_disk::RamDisk;
pub use super_blk::{RawSuperBlk, SuperBlk};

pub type BlkId = u32;
pub type InodeId = u16;

/// Source of the current time, in seconds since the Unix epoch.
pub type Clock = fn() -> u32;

#[derive(Debug)]
pub enum Error {
    /// The inode bitmap has no clear bit.
    OutOfInodes,
    /// The data bitmap has no clear bit.
    OutOfSpace,
    InvalidInodeId(InodeId),
    /// The record claims more blocks than it has direct pointers.
    CorruptInode(InodeId),
    NotFound,
    AlreadyExists,
    NotDir,
    IsDir,
    /// Every direct pointer of the directory is in use and no slot is free.
    DirFull,
    /// The write would need more than `INODE_DIRECT_BLK_COUNT` blocks.
    FileTooLarge,
    /// The read extends past the blocks owned by the inode.
    OutOfRange,
    DirNotEmpty,
    NameTooLong,
    InvalidDirEntryName,
    /// The bit being cleared was not set.
    DoubleFree,
    BadMagic,
    DiskTooSmall,
    InvalidBlkSize(u32),
    DiskError(DiskError),
}

#[macro_export]
macro_rules! div_round_up {
    ($n:expr, $d:expr) => {
        ($n + ($d - 1)) / $d
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Addr {
    pub blk_id: BlkId,
    pub offset_of_blk: u32,
}

impl Addr {
    pub fn new(blk_id: BlkId, offset_of_blk: u32) -> Self {
        Self {
            blk_id,
            offset_of_blk,
        }
    }

    /// Calculating absolute offset
    pub fn abs_offset(&self, blk_size: BlkSize) -> u64 {
        ((self.blk_id as u64) << blk_size.blk_size_log2) + self.offset_of_blk as u64
    }
}

/// The block size type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlkSize {
    /// log2(blk_size)
    pub blk_size_log2: u8,
}

impl BlkSize {
    /// Create BlkSize, `blk_size` must be a power of 2.
    pub fn new(blk_size: u32) -> Result<Self> {
        if !blk_size.is_power_of_two() {
            return Err(Error::InvalidBlkSize(blk_size));
        }
        Ok(Self::with_blk_size_log2(blk_size.trailing_zeros() as u8))
    }

    /// Create BlkSize with log2(blk_size) value.
    pub fn with_blk_size_log2(blk_size_log2: u8) -> Self {
        Self { blk_size_log2 }
    }

    /// Returns block size.
    pub fn size(&self) -> u32 {
        1 << self.blk_size_log2
    }

    /// Performs `dividend` / `blk_size`.
    pub fn div_by(&self, dividend: u32) -> u32 {
        dividend >> self.blk_size_log2
    }

    /// Performs `dividend` / `blk_size` and round up to the nearest integer if not evenly divisable.
    pub fn div_round_up_by(&self, dividend: u32) -> u32 {
        div_round_up!(dividend as u64, self.size() as u64) as u32
    }

    /// Performs `m` * `blk_size`.
    pub fn mul(&self, m: u32) -> u32 {
        m << self.blk_size_log2
    }

    /// Performs `dividend` % `blk_size`.
    pub fn mod_by(&self, dividend: u32) -> u32 {
        dividend & (self.size() - 1)
    }
}

/// Returns root inode id.
pub fn root_inode_id() -> InodeId {
    consts::TINY_FS_ROOT_INO
}

pub struct TinyFs<MutexType, DK> {
    super_blk: SuperBlk<MutexType>,
    blk_device: BlkDevice<DK>,
    clock: Clock,
}

impl<MutexType, DK> TinyFs<MutexType, DK>
where
    MutexType: lock_api::RawMutex,
    DK: Disk,
{
    /// Mounts a formatted disk.
    pub fn open(disk: DK, clock: Clock) -> Result<Self> {
        let raw_super_blk = RawSuperBlk::load(&disk)?;
        let blk_device = BlkDevice::new(disk, raw_super_blk.blk_size());
        let super_blk = SuperBlk::load(raw_super_blk, &blk_device)?;
        debug!(
            "opened tiny_fs: {} inodes ({} free), {} data blocks ({} free)",
            raw_super_blk.inodes_count,
            super_blk.free_inodes(),
            raw_super_blk.data_blks_count,
            super_blk.free_blks()
        );
        Ok(Self {
            super_blk,
            blk_device,
            clock,
        })
    }

    /// Loads the root directory.
    pub fn root(&self) -> Result<Inode> {
        self.load_inode(root_inode_id())
    }

    pub fn super_blk(&self) -> &SuperBlk<MutexType> {
        &self.super_blk
    }

    pub fn blk_device(&self) -> &BlkDevice<DK> {
        &self.blk_device
    }

    pub fn blk_size(&self) -> u32 {
        self.blk_device.blk_size.size()
    }

    /// Flushes the underlying disk.
    pub fn sync(&self) -> Result<()> {
        self.blk_device.sync()
    }

    pub(crate) fn now(&self) -> u32 {
        (self.clock)()
    }

    /// `st_blocks` style block count for `blks` file system blocks.
    pub(crate) fn stat_blocks(&self, blks: u16) -> u32 {
        self.blk_device.blk_size.mul(blks as u32) / consts::STAT_BLK_SIZE
    }

    /// Consumes the file system and returns its disk.
    pub fn into_disk(self) -> DK {
        self.blk_device.into_disk()
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::{FormatOptions, RamDisk, TinyFs};

    pub type TestFs = TinyFs<spin::Mutex<()>, RamDisk<spin::RwLock<()>>>;

    pub const NOW: u32 = 1_600_000_000;

    pub fn clock() -> u32 {
        NOW
    }

    /// 16 inodes and 64 data blocks of 512 bytes.
    pub fn small_opts() -> FormatOptions {
        FormatOptions {
            blk_size: 512,
            inodes_count: 16,
            data_blks_count: 64,
        }
    }

    pub fn create_tiny_fs(opts: FormatOptions) -> TestFs {
        let disk = RamDisk::new(opts.disk_size_hint().unwrap());
        TinyFs::format(disk, opts, clock).unwrap()
    }
}
