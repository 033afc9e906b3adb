use crate::{Addr, BlkId, BlkSize, Error, Result};
use alloc::{boxed::Box, vec::Vec};
use core::any::Any;

pub type DiskError = Box<dyn Any + Send>;

pub type DiskResult<T> = core::result::Result<T, DiskError>;

/// Fixed length records that can be decoded from a byte slice.
pub trait FromBytes {
    const BYTES_LEN: usize;

    fn from_bytes(bytes: &[u8]) -> Self;
}

pub trait ToBytes {
    fn bytes_len(&self) -> usize;

    fn to_bytes(&self, out: &mut [u8]);
}

/// Byte addressed backing store.
pub trait Disk {
    /// Reads into `buf` from `offset`, returns the number of bytes read.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> DiskResult<usize>;

    /// Writes `buf` at `offset`, returns the number of bytes written.
    fn write_at(&self, offset: u64, buf: &[u8]) -> DiskResult<usize>;

    fn sync(&self) -> DiskResult<()>;

    /// Size of the disk in bytes.
    fn capacity(&self) -> u64;
}

/// Logic block devices
pub struct BlkDevice<DK> {
    disk: DK,
    pub blk_size: BlkSize,
}

impl<DK: Disk> BlkDevice<DK> {
    pub fn new(disk: DK, blk_size: BlkSize) -> Self {
        Self { disk, blk_size }
    }

    /// Number of whole blocks on the disk.
    pub fn blks_count(&self) -> u64 {
        self.disk.capacity() >> self.blk_size.blk_size_log2
    }

    /// Returns a zeroed buffer of one block.
    pub fn blk_buf(&self) -> Vec<u8> {
        vec![0; self.blk_size.size() as usize]
    }

    /// Reads the whole block `blk_id` into `buf`.
    /// Bytes past the end of the disk read as zero.
    pub fn read_blk(&self, blk_id: BlkId, buf: &mut [u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.blk_size.size() as usize);
        let read_len = self
            .disk
            .read_at(Addr::new(blk_id, 0).abs_offset(self.blk_size), buf)
            .map_err(Error::DiskError)?;
        if read_len < buf.len() {
            buf[read_len..].fill(0);
        }
        Ok(())
    }

    pub fn write_blk(&self, blk_id: BlkId, buf: &[u8]) -> Result<()> {
        debug_assert_eq!(buf.len(), self.blk_size.size() as usize);
        self.disk
            .write_at(Addr::new(blk_id, 0).abs_offset(self.blk_size), buf)
            .map_err(Error::DiskError)?;
        Ok(())
    }

    pub fn zero_blk(&self, blk_id: BlkId) -> Result<()> {
        self.write_blk(blk_id, &self.blk_buf())
    }

    /// Reads a `T` stored at `addr`. `T` must not cross the block boundary.
    pub fn read_val_at<T: FromBytes>(&self, addr: Addr) -> Result<T> {
        let mut buf = self.blk_buf();
        self.read_blk(addr.blk_id, &mut buf)?;
        let start = addr.offset_of_blk as usize;
        Ok(T::from_bytes(&buf[start..start + T::BYTES_LEN]))
    }

    /// Stores `val` at `addr`.
    /// The containing block is read first so that sibling records survive.
    pub fn write_val_at<T: ToBytes>(&self, addr: Addr, val: &T) -> Result<()> {
        let mut buf = self.blk_buf();
        self.read_blk(addr.blk_id, &mut buf)?;
        let start = addr.offset_of_blk as usize;
        val.to_bytes(&mut buf[start..start + val.bytes_len()]);
        self.write_blk(addr.blk_id, &buf)
    }

    pub fn into_disk(self) -> DK {
        self.disk
    }

    pub fn sync(&self) -> Result<()> {
        self.disk.sync().map_err(Error::DiskError)
    }
}

#[cfg(test)]
mod test {
    use super::{BlkDevice, FromBytes, ToBytes};
    use crate::{Addr, BlkSize, RamDisk};

    struct Pair(u16, u16);

    impl FromBytes for Pair {
        const BYTES_LEN: usize = 4;

        fn from_bytes(bytes: &[u8]) -> Self {
            Pair(
                u16::from_le_bytes([bytes[0], bytes[1]]),
                u16::from_le_bytes([bytes[2], bytes[3]]),
            )
        }
    }

    impl ToBytes for Pair {
        fn bytes_len(&self) -> usize {
            4
        }

        fn to_bytes(&self, out: &mut [u8]) {
            out[..2].copy_from_slice(&self.0.to_le_bytes());
            out[2..4].copy_from_slice(&self.1.to_le_bytes());
        }
    }

    #[test]
    fn test_write_val_keeps_siblings() {
        let blk_device = BlkDevice::new(
            RamDisk::<spin::RwLock<()>>::new(4 * 512),
            BlkSize::new(512).unwrap(),
        );
        blk_device.write_val_at(Addr::new(2, 0), &Pair(1, 2)).unwrap();
        blk_device.write_val_at(Addr::new(2, 4), &Pair(3, 4)).unwrap();

        let first: Pair = blk_device.read_val_at(Addr::new(2, 0)).unwrap();
        let second: Pair = blk_device.read_val_at(Addr::new(2, 4)).unwrap();
        assert_eq!((first.0, first.1), (1, 2));
        assert_eq!((second.0, second.1), (3, 4));

        let mut buf = blk_device.blk_buf();
        blk_device.read_blk(1, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_blks_count() {
        let blk_device = BlkDevice::new(
            RamDisk::<spin::RwLock<()>>::new(4 * 512 + 100),
            BlkSize::new(512).unwrap(),
        );
        assert_eq!(blk_device.blks_count(), 4);
    }
}
