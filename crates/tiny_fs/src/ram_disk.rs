use alloc::{boxed::Box, vec::Vec};
use lock_api::RwLock;

use crate::blk_device::{Disk, DiskResult};

#[derive(Debug)]
pub enum Error {
    InvalidParam,
}

/// A disk based on RAM.
pub struct RamDisk<RwLockType> {
    data: RwLock<RwLockType, Vec<u8>>,
    capacity: u64,
}

impl<RwLockType> RamDisk<RwLockType>
where
    RwLockType: lock_api::RawRwLock,
{
    /// Constructs a new, zeroed `RamDisk`.
    pub fn new(capacity: u64) -> Self {
        let data = vec![0; capacity as usize];
        Self {
            data: RwLock::new(data),
            capacity,
        }
    }

    fn check_offset(&self, offset: u64) -> DiskResult<()> {
        if offset >= self.capacity {
            return Err(Box::new(Error::InvalidParam));
        }
        Ok(())
    }
}

impl<RwLockType> Disk for RamDisk<RwLockType>
where
    RwLockType: lock_api::RawRwLock,
{
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> DiskResult<usize> {
        self.check_offset(offset)?;
        let data = self.data.read();
        let end_pos = (offset + buf.len() as u64).min(self.capacity);
        let len = (end_pos - offset) as usize;
        buf[..len].copy_from_slice(&data[offset as usize..end_pos as usize]);
        Ok(len)
    }

    fn write_at(&self, offset: u64, src: &[u8]) -> DiskResult<usize> {
        self.check_offset(offset)?;
        let mut data = self.data.write();
        let end_pos = (offset + src.len() as u64).min(self.capacity);
        let len = (end_pos - offset) as usize;
        data[offset as usize..end_pos as usize].copy_from_slice(&src[..len]);
        Ok(len)
    }

    fn sync(&self) -> DiskResult<()> {
        Ok(())
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}
