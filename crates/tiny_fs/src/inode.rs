use crate::{
    blk_device::{Disk, FromBytes, ToBytes},
    consts, BlkId, Error, InodeId, Result, TinyFs,
};
use byte_struct::*;

/// RawInode
#[derive(ByteStruct, Debug, Clone, Copy, PartialEq, Eq)]
#[byte_struct_le]
pub struct RawInode {
    /// Position of this record in the inode table.
    pub ino: InodeId,
    /// Zero once the inode has been freed.
    pub valid: u8,
    /// See `FileType`.
    pub file_type: u8,
    /// how many directory entries refer to this inode.
    /// A directory also counts its own "." and the ".." of each subdirectory.
    pub links_count: u16,
    /// Number of occupied direct blocks.
    pub size: u16,
    /// Direct block that points to the data Block id of this inode.
    pub direct_blks: [BlkId; consts::INODE_DIRECT_BLK_COUNT],

    pub mode: u16,
    /// user id associated with the file.
    pub uid: u32,
    /// group id
    pub gid: u32,
    /// Size in bytes.
    pub byte_size: u32,
    /// Allocated space in `STAT_BLK_SIZE` units.
    pub blocks: u32,
    /// the number of seconds since january 1st 1970 of the last time this inode was accessed.
    pub atime: u32,
    /// the number of seconds since january 1st 1970, of the last time this inode was modified.
    pub mtime: u32,
    /// the number of seconds since january 1st 1970, of the last change of the inode itself.
    pub ctime: u32,
}

impl FromBytes for RawInode {
    const BYTES_LEN: usize = Self::BYTE_LEN;

    fn from_bytes(bytes: &[u8]) -> Self {
        Self::read_bytes(bytes)
    }
}

impl ToBytes for RawInode {
    fn to_bytes(&self, out: &mut [u8]) {
        self.write_bytes(out);
    }

    fn bytes_len(&self) -> usize {
        Self::BYTE_LEN
    }
}

impl Default for RawInode {
    fn default() -> Self {
        Self {
            ino: 0,
            valid: 0,
            file_type: 0,
            links_count: 0,
            size: 0,
            direct_blks: [0; consts::INODE_DIRECT_BLK_COUNT],
            mode: 0,
            uid: 0,
            gid: 0,
            byte_size: 0,
            blocks: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
        }
    }
}

impl RawInode {
    pub fn new(
        ino: InodeId,
        file_type: FileType,
        mode: Mode,
        uid: u32,
        gid: u32,
        create_unix_timestamp: u32,
    ) -> Self {
        Self {
            ino,
            valid: 1,
            file_type: file_type.to_primitive(),
            links_count: 1,
            mode: (mode - Mode::TY_MASK | file_type.mode_bits()).bits(),
            uid,
            gid,
            atime: create_unix_timestamp,
            mtime: create_unix_timestamp,
            ctime: create_unix_timestamp,
            ..Default::default()
        }
    }

    pub fn valid(&self) -> bool {
        self.valid != 0
    }
}

num_enum::num_enum! {
    /// Kind of object an inode holds, stored in `RawInode::file_type`
    pub FileType: u8 {
        RegFile = 1,
        Dir = 2,
    }
}

impl FileType {
    pub fn mode_bits(self) -> Mode {
        match self {
            FileType::RegFile => Mode::TY_REG,
            FileType::Dir => Mode::TY_DIR,
        }
    }
}

bitflags! {
    pub struct Mode: u16 {
        // File type
        /// Regular File
        const TY_REG = 0x8000;
        /// Directory File
        const TY_DIR = 0x4000;
        /// Every file type bit.
        const TY_MASK = 0xF000;

        /// This bit is 1. The user id of the file needs to be used to override the user id of the process.
        const S_UID = 0x0800;
        ///  This bit is 1 The group id of the file to be used overrides the group id of the process
        const S_SGID = 0x0400;
        /// Sticky bit
        const S_VTX = 0x0200;

        // File access permissions
        /// Readable by the file owner
        const PERM_R_USR = 0x0100;
        /// File owner writable
        const PERM_W_USR = 0x0080;
        /// File owners executable
        const PERM_X_USR = 0x0040;
        /// Readable and writable by the file owner
        const PERM_RW_USR = Self::PERM_R_USR.bits | Self::PERM_W_USR.bits;
        /// Readable and executable by the file owner
        const PERM_RX_USR = Self::PERM_R_USR.bits | Self::PERM_X_USR.bits;
        /// Readable, writable and executable by the file owner
        const PERM_RWX_USR = Self::PERM_RW_USR.bits | Self::PERM_X_USR.bits;

        /// Same group readable
        const PERM_R_GRP = 0x0020;
        /// Same group writable
        const PERM_W_GRP = 0x0010;
        /// Same group executable
        const PERM_X_GRP = 0x0008;
        /// Same group readable and executable
        const PERM_RX_GRP = Self::PERM_R_GRP.bits | Self::PERM_X_GRP.bits;

        /// Others readable
        const PERM_R_OTH = 0x0004;
        /// Others writable
        const PERM_W_OTH = 0x0002;
        /// Others executable
        const PERM_X_OTH = 0x0001;
        /// Others readable and executable
        const PERM_RX_OTH = Self::PERM_R_OTH.bits | Self::PERM_X_OTH.bits;
    }
}

impl Mode {
    pub fn is_dir(&self) -> bool {
        *self & Mode::TY_MASK == Mode::TY_DIR
    }

    pub fn is_file(&self) -> bool {
        *self & Mode::TY_MASK == Mode::TY_REG
    }

    /// rwxr-xr-x
    pub fn dir_default() -> Self {
        Mode::PERM_RWX_USR | Mode::PERM_RX_GRP | Mode::PERM_RX_OTH
    }
}

/// An inode record together with its number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub inode_id: InodeId,
    pub raw: RawInode,
}

impl Inode {
    pub fn new(inode_id: InodeId, raw: RawInode) -> Self {
        Self { inode_id, raw }
    }

    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_primitive(self.raw.file_type)
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == Some(FileType::Dir)
    }

    pub fn is_file(&self) -> bool {
        self.file_type() == Some(FileType::RegFile)
    }

    pub fn mode(&self) -> Mode {
        Mode::from_bits_truncate(self.raw.mode)
    }

    /// The occupied direct blocks, in file order.
    pub fn blks(&self) -> &[BlkId] {
        let size = (self.raw.size as usize).min(consts::INODE_DIRECT_BLK_COUNT);
        &self.raw.direct_blks[..size]
    }

    pub fn byte_size(&self) -> u32 {
        self.raw.byte_size
    }
}

impl<MutexType, DK> TinyFs<MutexType, DK>
where
    MutexType: lock_api::RawMutex,
    DK: Disk,
{
    /// Reads the record of `inode_id` from the inode table, valid or not.
    pub fn read_inode(&self, inode_id: InodeId) -> Result<Inode> {
        let addr = self.super_blk.raw_inode_addr(inode_id)?;
        let raw = self.blk_device.read_val_at::<RawInode>(addr)?;
        if raw.size as usize > consts::INODE_DIRECT_BLK_COUNT {
            return Err(Error::CorruptInode(inode_id));
        }
        Ok(Inode::new(inode_id, raw))
    }

    /// Like `read_inode`, but a freed inode is reported as `NotFound`.
    pub fn load_inode(&self, inode_id: InodeId) -> Result<Inode> {
        let inode = self.read_inode(inode_id)?;
        if !inode.raw.valid() {
            return Err(Error::NotFound);
        }
        Ok(inode)
    }

    /// Stores `inode` into its slot of the inode table.
    pub fn write_inode(&self, inode: &Inode) -> Result<()> {
        let addr = self.super_blk.raw_inode_addr(inode.inode_id)?;
        self.blk_device.write_val_at(addr, &inode.raw)
    }

    /// Allocates a data block, fills it with `content` (zeros for `None`)
    /// and appends it to the block list of `inode`. The inode is not written.
    pub(crate) fn append_blk(&self, inode: &mut Inode, content: Option<&[u8]>) -> Result<BlkId> {
        let size = inode.raw.size as usize;
        if size >= consts::INODE_DIRECT_BLK_COUNT {
            return Err(Error::FileTooLarge);
        }
        let blk_id = self.super_blk.alloc_blk(&self.blk_device)?;
        let res = match content {
            Some(content) => self.blk_device.write_blk(blk_id, content),
            None => self.blk_device.zero_blk(blk_id),
        };
        if let Err(e) = res {
            self.super_blk.dealloc_blk(&self.blk_device, blk_id)?;
            return Err(e);
        }
        inode.raw.direct_blks[size] = blk_id;
        inode.raw.size += 1;
        inode.raw.blocks = self.stat_blocks(inode.raw.size);
        Ok(blk_id)
    }

    /// Frees every data block and the inode itself.
    /// The record is tombstoned on disk before its bit is cleared.
    pub(crate) fn release_inode(&self, inode: &mut Inode) -> Result<()> {
        for &blk_id in inode.blks() {
            self.super_blk.dealloc_blk(&self.blk_device, blk_id)?;
        }
        inode.raw.size = 0;
        inode.raw.blocks = 0;
        inode.raw.byte_size = 0;
        inode.raw.links_count = 0;
        inode.raw.valid = 0;
        self.write_inode(inode)?;
        self.super_blk.dealloc_inode(&self.blk_device, inode.inode_id)
    }
}
