use bitmap::Bitmap;
use lock_api::Mutex;

use crate::{
    allocator::Allocator,
    blk_device::{BlkDevice, Disk, FromBytes, ToBytes},
    consts,
    inode::RawInode,
    Addr, BlkId, BlkSize, Error, FormatOptions, InodeId, Result,
};
use byte_struct::*;

/// RawSuperBlock
#[derive(ByteStruct, Debug, Clone, Copy, PartialEq, Eq)]
#[byte_struct_le]
pub struct RawSuperBlk {
    pub magic: u32,
    /// Block size = 1 << blk_size_log2;
    pub blk_size_log2: u8,
    /// Capacity of the inode table
    pub inodes_count: u16,
    /// Number of blocks in the data region
    pub data_blks_count: u32,
    /// First block of the inode bitmap
    pub inode_bitmap_blk: BlkId,
    /// First block of the data block bitmap
    pub data_bitmap_blk: BlkId,
    /// First block of the inode table
    pub inode_table_blk: BlkId,
    /// First block of the data region
    pub data_region_blk: BlkId,
}

impl FromBytes for RawSuperBlk {
    const BYTES_LEN: usize = Self::BYTE_LEN;

    fn from_bytes(bytes: &[u8]) -> Self {
        Self::read_bytes(bytes)
    }
}

impl ToBytes for RawSuperBlk {
    fn to_bytes(&self, out: &mut [u8]) {
        self.write_bytes(out);
    }

    fn bytes_len(&self) -> usize {
        Self::BYTE_LEN
    }
}

impl RawSuperBlk {
    /// Lays out the regions for `opts`:
    /// super block, inode bitmap, data bitmap, inode table, data region.
    pub fn with_layout(opts: &FormatOptions) -> Result<Self> {
        let blk_size = BlkSize::new(opts.blk_size)?;
        if !(consts::MIN_BLK_SIZE..=consts::MAX_BLK_SIZE).contains(&opts.blk_size) {
            return Err(Error::InvalidBlkSize(opts.blk_size));
        }

        let inode_bitmap_blks =
            blk_size.div_round_up_by(crate::div_round_up!(opts.inodes_count as u32, u8::BITS));
        let data_bitmap_blks = blk_size
            .div_round_up_by(crate::div_round_up!(opts.data_blks_count as u64, 8) as u32);
        let inodes_per_blk = opts.blk_size / RawInode::BYTE_LEN as u32;
        let inode_table_blks = crate::div_round_up!(opts.inodes_count as u32, inodes_per_blk);

        let inode_bitmap_blk = consts::INODE_BITMAP_BLK_ID;
        let data_bitmap_blk = inode_bitmap_blk + inode_bitmap_blks.max(1);
        let inode_table_blk = data_bitmap_blk + data_bitmap_blks.max(1);
        let data_region_blk = inode_table_blk + inode_table_blks.max(1);

        Ok(Self {
            magic: consts::TINY_FS_MAGIC,
            blk_size_log2: blk_size.blk_size_log2,
            inodes_count: opts.inodes_count,
            data_blks_count: opts.data_blks_count,
            inode_bitmap_blk,
            data_bitmap_blk,
            inode_table_blk,
            data_region_blk,
        })
    }

    /// Reads and checks the super block at the start of `disk`.
    pub fn load<DK: Disk>(disk: &DK) -> Result<Self> {
        let mut bytes = [0; RawSuperBlk::BYTE_LEN];
        let read_len = disk.read_at(0, &mut bytes).map_err(Error::DiskError)?;
        if read_len < Self::BYTE_LEN {
            return Err(Error::BadMagic);
        }
        let raw_super_blk = Self::read_bytes(&bytes);
        if !raw_super_blk.is_valid() {
            return Err(Error::BadMagic);
        }
        Ok(raw_super_blk)
    }

    pub fn is_valid(&self) -> bool {
        self.magic == consts::TINY_FS_MAGIC
            && (self.blk_size_log2 as u32) < u32::BITS
            && (consts::MIN_BLK_SIZE..=consts::MAX_BLK_SIZE)
                .contains(&(1u32 << self.blk_size_log2))
            && self.inode_bitmap_blk >= 1
            && self.data_bitmap_blk > self.inode_bitmap_blk
            && self.inode_table_blk > self.data_bitmap_blk
            && self.data_region_blk > self.inode_table_blk
    }

    pub fn blk_size(&self) -> BlkSize {
        BlkSize::with_blk_size_log2(self.blk_size_log2)
    }

    pub fn inodes_per_blk(&self) -> u32 {
        self.blk_size().size() / RawInode::BYTE_LEN as u32
    }

    /// Number of blocks the layout occupies on disk.
    pub fn total_blks(&self) -> u64 {
        self.data_region_blk as u64 + self.data_blks_count as u64
    }
}

pub(crate) struct Allocators {
    pub inode_id: Allocator,
    pub blk_id: Allocator,
}

pub struct SuperBlk<MutexType> {
    pub raw_super_blk: RawSuperBlk,
    /// Both bitmaps behind one lock, so a scan and the following set are atomic.
    allocators: Mutex<MutexType, Allocators>,
}

impl<MutexType: lock_api::RawMutex> SuperBlk<MutexType> {
    /// A super block whose bitmaps are all clear.
    pub(crate) fn create_blank(raw_super_blk: RawSuperBlk) -> Self {
        let inode_id = Allocator::new(
            Bitmap::new(raw_super_blk.inodes_count as u32),
            raw_super_blk.inode_bitmap_blk,
            0,
        );
        let blk_id = Allocator::new(
            Bitmap::new(raw_super_blk.data_blks_count),
            raw_super_blk.data_bitmap_blk,
            raw_super_blk.data_region_blk,
        );
        Self {
            raw_super_blk,
            allocators: Mutex::new(Allocators { inode_id, blk_id }),
        }
    }

    pub(crate) fn load<DK: Disk>(
        raw_super_blk: RawSuperBlk,
        blk_device: &BlkDevice<DK>,
    ) -> Result<Self> {
        let inode_id = Allocator::load(
            blk_device,
            raw_super_blk.inode_bitmap_blk,
            raw_super_blk.inodes_count as u32,
            0,
        )?;
        let blk_id = Allocator::load(
            blk_device,
            raw_super_blk.data_bitmap_blk,
            raw_super_blk.data_blks_count,
            raw_super_blk.data_region_blk,
        )?;
        Ok(Self {
            raw_super_blk,
            allocators: Mutex::new(Allocators { inode_id, blk_id }),
        })
    }

    /// Writes the super block and both bitmaps.
    pub(crate) fn sync<DK: Disk>(&self, blk_device: &BlkDevice<DK>) -> Result<()> {
        blk_device.zero_blk(consts::SUPER_BLK_ID)?;
        blk_device.write_val_at(Addr::new(consts::SUPER_BLK_ID, 0), &self.raw_super_blk)?;
        let allocators = self.allocators.lock();
        allocators.inode_id.sync(blk_device)?;
        allocators.blk_id.sync(blk_device)
    }

    pub(crate) fn alloc_inode<DK: Disk>(&self, blk_device: &BlkDevice<DK>) -> Result<InodeId> {
        let inode_id = self
            .allocators
            .lock()
            .inode_id
            .alloc(blk_device)?
            .ok_or(Error::OutOfInodes)? as InodeId;
        trace!("alloc inode {}", inode_id);
        Ok(inode_id)
    }

    pub(crate) fn alloc_blk<DK: Disk>(&self, blk_device: &BlkDevice<DK>) -> Result<BlkId> {
        let blk_id = self
            .allocators
            .lock()
            .blk_id
            .alloc(blk_device)?
            .ok_or(Error::OutOfSpace)?;
        trace!("alloc blk {}", blk_id);
        Ok(blk_id)
    }

    pub(crate) fn dealloc_inode<DK: Disk>(
        &self,
        blk_device: &BlkDevice<DK>,
        inode_id: InodeId,
    ) -> Result<()> {
        if !self
            .allocators
            .lock()
            .inode_id
            .dealloc(blk_device, inode_id as u32)?
        {
            warn!("inode {} freed twice", inode_id);
            return Err(Error::DoubleFree);
        }
        trace!("dealloc inode {}", inode_id);
        Ok(())
    }

    pub(crate) fn dealloc_blk<DK: Disk>(
        &self,
        blk_device: &BlkDevice<DK>,
        blk_id: BlkId,
    ) -> Result<()> {
        if !self.allocators.lock().blk_id.dealloc(blk_device, blk_id)? {
            warn!("blk {} freed twice", blk_id);
            return Err(Error::DoubleFree);
        }
        trace!("dealloc blk {}", blk_id);
        Ok(())
    }

    pub fn free_inodes(&self) -> u32 {
        self.allocators.lock().inode_id.free()
    }

    pub fn free_blks(&self) -> u32 {
        self.allocators.lock().blk_id.free()
    }

    pub fn is_inode_allocated(&self, inode_id: InodeId) -> bool {
        self.allocators.lock().inode_id.contains(inode_id as u32)
    }

    pub fn is_blk_allocated(&self, blk_id: BlkId) -> bool {
        self.allocators.lock().blk_id.contains(blk_id)
    }
}

impl<MutexType> SuperBlk<MutexType> {
    /// Location of the inode record `inode_id` inside the inode table.
    pub fn raw_inode_addr(&self, inode_id: InodeId) -> Result<Addr> {
        if inode_id >= self.raw_super_blk.inodes_count {
            return Err(Error::InvalidInodeId(inode_id));
        }
        let inodes_per_blk = self.raw_super_blk.inodes_per_blk();
        let blk_id = inode_id as u32 / inodes_per_blk + self.raw_super_blk.inode_table_blk;
        let offset_of_blk = (inode_id as u32 % inodes_per_blk) * RawInode::BYTE_LEN as u32;
        Ok(Addr::new(blk_id, offset_of_blk))
    }
}

#[cfg(test)]
mod test {
    use super::RawSuperBlk;
    use crate::{consts, inode::RawInode, Error, FormatOptions, RamDisk, ToBytes};
    use byte_struct::ByteStructLen;

    #[test]
    fn test_layout() {
        let raw = RawSuperBlk::with_layout(&FormatOptions {
            blk_size: 4096,
            inodes_count: 1024,
            data_blks_count: 16384,
        })
        .unwrap();
        let inode_table_blks = crate::div_round_up!(1024, 4096 / RawInode::BYTE_LEN as u32);
        assert_eq!(raw.inode_bitmap_blk, 1);
        assert_eq!(raw.data_bitmap_blk, 2);
        assert_eq!(raw.inode_table_blk, 3);
        assert_eq!(raw.data_region_blk, 3 + inode_table_blks);
        assert!(raw.is_valid());

        let raw = RawSuperBlk::with_layout(&FormatOptions {
            blk_size: 512,
            inodes_count: 16,
            data_blks_count: 5000,
        })
        .unwrap();
        // 5000 bits need two 512 byte blocks
        assert_eq!(raw.data_bitmap_blk, 2);
        assert_eq!(raw.inode_table_blk, 4);
        // 5 inodes per 512 byte block
        assert_eq!(raw.data_region_blk, 4 + 4);
        assert_eq!(raw.total_blks(), 8 + 5000);
    }

    #[test]
    fn test_invalid_blk_size() {
        for blk_size in [0, 100, 256, 3000] {
            let res = RawSuperBlk::with_layout(&FormatOptions {
                blk_size,
                inodes_count: 16,
                data_blks_count: 64,
            });
            assert!(matches!(res, Err(Error::InvalidBlkSize(size)) if size == blk_size));
        }
    }

    #[test]
    fn test_load_rejects_blank_disk() {
        let disk = RamDisk::<spin::RwLock<()>>::new(4096);
        assert!(matches!(RawSuperBlk::load(&disk), Err(Error::BadMagic)));
    }

    #[test]
    fn test_load_round_trip() {
        use crate::Disk;

        let raw = RawSuperBlk::with_layout(&FormatOptions::default()).unwrap();
        let disk = RamDisk::<spin::RwLock<()>>::new(4096);
        let mut bytes = [0; RawSuperBlk::BYTE_LEN];
        raw.to_bytes(&mut bytes);
        disk.write_at(0, &bytes).unwrap();
        assert_eq!(RawSuperBlk::load(&disk).unwrap(), raw);
        assert_eq!(raw.magic, consts::TINY_FS_MAGIC);
    }
}
