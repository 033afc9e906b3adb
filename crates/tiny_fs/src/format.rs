use crate::{
    blk_device::{BlkDevice, Disk},
    consts,
    inode::{FileType, Inode, Mode, RawInode},
    root_inode_id, Clock, Error, RawSuperBlk, Result, SuperBlk, TinyFs,
};

/// Capacities a file system is formatted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// Bytes per block, a power of two in `MIN_BLK_SIZE..=MAX_BLK_SIZE`.
    pub blk_size: u32,
    pub inodes_count: u16,
    pub data_blks_count: u32,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            blk_size: consts::DEFAULT_BLK_SIZE,
            inodes_count: consts::DEFAULT_INODES_COUNT,
            data_blks_count: consts::DEFAULT_DATA_BLKS_COUNT,
        }
    }
}

impl FormatOptions {
    /// Options whose data region takes every block of a `capacity` byte disk
    /// left over by the metadata.
    pub fn fit(blk_size: u32, inodes_count: u16, capacity: u64) -> Result<Self> {
        let mut opts = Self {
            blk_size,
            inodes_count,
            data_blks_count: 0,
        };
        let total_blks = capacity / blk_size.max(1) as u64;
        // The data bitmap sized for every block is never smaller than the one
        // actually needed, so the resulting layout always fits.
        opts.data_blks_count = total_blks.min(u32::MAX as u64) as u32;
        let upper = RawSuperBlk::with_layout(&opts)?;
        if total_blks <= upper.data_region_blk as u64 {
            return Err(Error::DiskTooSmall);
        }
        opts.data_blks_count = (total_blks - upper.data_region_blk as u64) as u32;
        Ok(opts)
    }

    /// Bytes a disk needs to hold a file system formatted with these options.
    pub fn disk_size_hint(&self) -> Result<u64> {
        let raw_super_blk = RawSuperBlk::with_layout(self)?;
        Ok(raw_super_blk.total_blks() << raw_super_blk.blk_size_log2)
    }
}

impl<MutexType, DK> TinyFs<MutexType, DK>
where
    MutexType: lock_api::RawMutex,
    DK: Disk,
{
    /// Writes an empty file system to `disk`.
    ///
    /// Lays out the regions for `opts`, clears both bitmaps and the inode
    /// table, then creates the root directory as inode 0 holding "." and "..".
    pub fn format(disk: DK, opts: FormatOptions, clock: Clock) -> Result<Self> {
        let raw_super_blk = RawSuperBlk::with_layout(&opts)?;
        let blk_device = BlkDevice::new(disk, raw_super_blk.blk_size());
        if blk_device.blks_count() < raw_super_blk.total_blks() {
            return Err(Error::DiskTooSmall);
        }

        let super_blk = SuperBlk::create_blank(raw_super_blk);
        super_blk.sync(&blk_device)?;
        for blk_id in raw_super_blk.inode_table_blk..raw_super_blk.data_region_blk {
            blk_device.zero_blk(blk_id)?;
        }

        let fs = Self {
            super_blk,
            blk_device,
            clock,
        };
        fs.create_root()?;
        fs.sync()?;
        info!(
            "formatted tiny_fs: blk size {}, {} inodes, {} data blocks from blk {}",
            opts.blk_size, opts.inodes_count, opts.data_blks_count, raw_super_blk.data_region_blk
        );
        Ok(fs)
    }

    fn create_root(&self) -> Result<()> {
        let inode_id = self.super_blk.alloc_inode(&self.blk_device)?;
        debug_assert_eq!(inode_id, root_inode_id());
        let mut root = Inode::new(
            inode_id,
            RawInode::new(
                inode_id,
                FileType::Dir,
                Mode::dir_default(),
                0,
                0,
                self.now(),
            ),
        );
        self.init_dir(&mut root, inode_id)?;
        self.write_inode(&root)?;
        debug!("created root directory: {:?}", root.raw);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::FormatOptions;
    use crate::{
        consts,
        test_util::{clock, create_tiny_fs, small_opts, TestFs, NOW},
        Error, Mode, RamDisk, TinyFs,
    };

    #[test]
    fn test_format_small() {
        let fs = create_tiny_fs(small_opts());
        let super_blk = fs.super_blk();
        assert_eq!(super_blk.free_inodes(), 15);
        assert_eq!(super_blk.free_blks(), 63);
        assert!(super_blk.is_inode_allocated(0));
        let data_region_blk = super_blk.raw_super_blk.data_region_blk;
        assert!(super_blk.is_blk_allocated(data_region_blk));

        let root = fs.root().unwrap();
        assert!(root.is_dir());
        assert!(root.mode().is_dir());
        assert!(root.mode().contains(Mode::dir_default()));
        assert_eq!(root.raw.links_count, 2);
        assert_eq!(root.raw.size, 1);
        assert_eq!(root.blks(), &[data_region_blk]);
        assert_eq!(root.byte_size(), 2 * consts::DIR_ENTRY_LEN as u32);
        assert_eq!(root.raw.ctime, NOW);

        let entries = fs.list(&root).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name.as_slice(), b".");
        assert_eq!(entries[1].name.as_slice(), b"..");
        assert!(entries.iter().all(|entry| entry.inode_id == 0));
    }

    #[test]
    fn test_reopen() {
        let fs = create_tiny_fs(small_opts());
        let raw_super_blk = fs.super_blk().raw_super_blk;
        let mut root = fs.root().unwrap();
        let a = fs
            .create_entry(&mut root, b"a", crate::FileType::RegFile, Mode::PERM_RW_USR, 1, 1)
            .unwrap();

        let fs: TestFs = TinyFs::open(fs.into_disk(), clock).unwrap();
        assert_eq!(fs.super_blk().raw_super_blk, raw_super_blk);
        assert_eq!(fs.super_blk().free_inodes(), 14);
        assert_eq!(fs.resolve(crate::Path::new("/a")).unwrap().inode_id, a);
    }

    #[test]
    fn test_disk_too_small() {
        let opts = small_opts();
        let size = opts.disk_size_hint().unwrap();
        let disk = RamDisk::new(size - 1);
        assert!(matches!(
            TestFs::format(disk, opts, clock),
            Err(Error::DiskTooSmall)
        ));
    }

    #[test]
    fn test_fit() {
        let capacity = 32 << 20;
        let opts = FormatOptions::fit(4096, 1024, capacity).unwrap();
        let size = opts.disk_size_hint().unwrap();
        assert_eq!(size, capacity);

        assert!(matches!(
            FormatOptions::fit(512, 16, 512 * 4),
            Err(Error::DiskTooSmall)
        ));
        let fs = TestFs::format(RamDisk::new(capacity), opts, clock).unwrap();
        assert_eq!(fs.super_blk().free_blks(), opts.data_blks_count - 1);
    }

    /// Reports an unbounded capacity so only the layout checks can fail.
    struct UnboundedDisk;

    impl crate::Disk for UnboundedDisk {
        fn read_at(&self, _offset: u64, buf: &mut [u8]) -> crate::DiskResult<usize> {
            buf.fill(0);
            Ok(buf.len())
        }

        fn write_at(&self, _offset: u64, buf: &[u8]) -> crate::DiskResult<usize> {
            Ok(buf.len())
        }

        fn sync(&self) -> crate::DiskResult<()> {
            Ok(())
        }

        fn capacity(&self) -> u64 {
            u64::MAX
        }
    }

    #[test]
    fn test_blk_size_bounds() {
        for blk_size in [consts::MAX_BLK_SIZE * 2, 1 << 29, 1 << 31] {
            let opts = FormatOptions {
                blk_size,
                inodes_count: 16,
                data_blks_count: 64,
            };
            assert!(matches!(
                TinyFs::<spin::Mutex<()>, _>::format(UnboundedDisk, opts, clock),
                Err(Error::InvalidBlkSize(size)) if size == blk_size
            ));
            assert!(matches!(
                FormatOptions::fit(blk_size, 16, 8 << 30),
                Err(Error::InvalidBlkSize(_))
            ));
        }

        let opts = FormatOptions::fit(consts::MAX_BLK_SIZE, 16, 1 << 20).unwrap();
        let disk = RamDisk::new(opts.disk_size_hint().unwrap());
        let fs = TestFs::format(disk, opts, clock).unwrap();
        assert_eq!(fs.blk_size(), consts::MAX_BLK_SIZE);
        assert_eq!(fs.super_blk().free_blks(), opts.data_blks_count - 1);
    }
}
