use bitmap::Bitmap;

use crate::{
    blk_device::{BlkDevice, Disk},
    BlkId, Result,
};

use alloc::vec::Vec;

/// First-fit id allocator over a bitmap that lives in consecutive blocks
/// starting at `bitmap_blk`. Every change is written through immediately.
pub(crate) struct Allocator {
    bitmap: Bitmap,
    bitmap_blk: BlkId,
    /// Added to a bit position to form the id handed out.
    base: u32,
    free: u32, // Number of unassigned ids
}

impl Allocator {
    pub(crate) fn new(bitmap: Bitmap, bitmap_blk: BlkId, base: u32) -> Self {
        let free = bitmap.capacity() - bitmap.count_ones();
        Self {
            bitmap,
            bitmap_blk,
            base,
            free,
        }
    }

    /// Reads a bitmap of `capacity` bits from disk.
    pub(crate) fn load<DK: Disk>(
        blk_device: &BlkDevice<DK>,
        bitmap_blk: BlkId,
        capacity: u32,
        base: u32,
    ) -> Result<Self> {
        let bytes_len = crate::div_round_up!(capacity as u64, 8) as usize;
        let blks = blk_device.blk_size.div_round_up_by(bytes_len as u32);
        let mut bytes = Vec::with_capacity(blk_device.blk_size.mul(blks) as usize);
        let mut buf = blk_device.blk_buf();
        for nth in 0..blks {
            blk_device.read_blk(bitmap_blk + nth, &mut buf)?;
            bytes.extend_from_slice(&buf);
        }
        Ok(Self::new(
            Bitmap::from_bytes(&bytes[..bytes_len], capacity),
            bitmap_blk,
            base,
        ))
    }

    /// Returns true which means `id` has been allocated.
    pub fn contains(&self, id: u32) -> bool {
        id >= self.base && id - self.base < self.capacity() && self.bitmap.test(id - self.base)
    }

    /// Allocates the lowest free id. `Ok(None)` means no ids are available.
    pub fn alloc<DK: Disk>(&mut self, blk_device: &BlkDevice<DK>) -> Result<Option<u32>> {
        let bit = match self.bitmap.find_next_zero(0, None) {
            Some(bit) => bit,
            None => return Ok(None),
        };
        self.bitmap.test_and_set(bit, true);
        if let Err(e) = self.persist(blk_device, bit) {
            self.bitmap.test_and_set(bit, false);
            return Err(e);
        }
        self.free -= 1;
        Ok(Some(bit + self.base))
    }

    /// dealloc id,
    /// returns false which means the id has been dealloc
    /// or has never been allocated
    pub fn dealloc<DK: Disk>(&mut self, blk_device: &BlkDevice<DK>, id: u32) -> Result<bool> {
        if !self.contains(id) {
            return Ok(false);
        }
        let bit = id - self.base;
        self.bitmap.test_and_set(bit, false);
        if let Err(e) = self.persist(blk_device, bit) {
            self.bitmap.test_and_set(bit, true);
            return Err(e);
        }
        self.free += 1;
        Ok(true)
    }

    pub fn free(&self) -> u32 {
        self.free
    }

    pub fn capacity(&self) -> u32 {
        self.bitmap.capacity()
    }

    /// Writes every block of the bitmap.
    pub fn sync<DK: Disk>(&self, blk_device: &BlkDevice<DK>) -> Result<()> {
        let bits_per_blk = (blk_device.blk_size.size() as u64) * u8::BITS as u64;
        let blks = crate::div_round_up!(self.capacity() as u64, bits_per_blk);
        for nth in 0..blks {
            self.persist(blk_device, (nth * bits_per_blk) as u32)?;
        }
        Ok(())
    }

    /// Writes the bitmap block holding `bit`.
    fn persist<DK: Disk>(&self, blk_device: &BlkDevice<DK>, bit: u32) -> Result<()> {
        let blk_size = blk_device.blk_size.size() as usize;
        let nth = (bit / u8::BITS) as usize / blk_size;
        let bytes = self.bitmap.as_bytes();
        let start = nth * blk_size;
        let end = (start + blk_size).min(bytes.len());

        let mut buf = blk_device.blk_buf();
        buf[..end - start].copy_from_slice(&bytes[start..end]);
        blk_device.write_blk(self.bitmap_blk + nth as BlkId, &buf)
    }
}

#[cfg(test)]
mod test {
    use super::Allocator;
    use crate::{BlkDevice, BlkSize, RamDisk};
    use bitmap::Bitmap;

    fn blk_device() -> BlkDevice<RamDisk<spin::RwLock<()>>> {
        BlkDevice::new(RamDisk::new(16 * 512), BlkSize::new(512).unwrap())
    }

    #[test]
    fn test_alloc_lowest_first() {
        let blk_device = blk_device();
        let mut allocator = Allocator::new(Bitmap::new(8), 1, 100);
        assert_eq!(allocator.alloc(&blk_device).unwrap(), Some(100));
        assert_eq!(allocator.alloc(&blk_device).unwrap(), Some(101));
        assert_eq!(allocator.alloc(&blk_device).unwrap(), Some(102));
        assert!(allocator.dealloc(&blk_device, 101).unwrap());
        assert_eq!(allocator.alloc(&blk_device).unwrap(), Some(101));
        assert_eq!(allocator.free(), 5);
    }

    #[test]
    fn test_alloc_exhausted() {
        let blk_device = blk_device();
        let mut allocator = Allocator::new(Bitmap::new(3), 1, 0);
        for expected in 0..3 {
            assert_eq!(allocator.alloc(&blk_device).unwrap(), Some(expected));
        }
        assert_eq!(allocator.alloc(&blk_device).unwrap(), None);
        assert_eq!(allocator.free(), 0);
    }

    #[test]
    fn test_dealloc_twice() {
        let blk_device = blk_device();
        let mut allocator = Allocator::new(Bitmap::new(8), 1, 10);
        let id = allocator.alloc(&blk_device).unwrap().unwrap();
        assert!(allocator.dealloc(&blk_device, id).unwrap());
        assert!(!allocator.dealloc(&blk_device, id).unwrap());
        // outside of the managed range
        assert!(!allocator.dealloc(&blk_device, 3).unwrap());
        assert!(!allocator.dealloc(&blk_device, 18).unwrap());
        assert_eq!(allocator.free(), 8);
    }

    #[test]
    fn test_alloc_persists() {
        let blk_device = blk_device();
        // 5000 bits span two 512 byte blocks
        let mut allocator = Allocator::new(Bitmap::new(5000), 2, 0);
        allocator.sync(&blk_device).unwrap();
        for _ in 0..3 {
            allocator.alloc(&blk_device).unwrap();
        }

        let loaded = Allocator::load(&blk_device, 2, 5000, 0).unwrap();
        assert!(loaded.contains(0) && loaded.contains(1) && loaded.contains(2));
        assert!(!loaded.contains(3));
        assert_eq!(loaded.free(), 4997);

        let mut buf = blk_device.blk_buf();
        blk_device.read_blk(2, &mut buf).unwrap();
        assert_eq!(buf[0], 0b0000_0111);
    }
}
