use crate::{blk_device::Disk, consts, inode::Inode, BlkSize, Error, Result, TinyFs};

/// The part of a byte range that falls into the `nth` block of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Blk {
    nth: u32,
    offset_of_blk: u32,
    len: u32,
}

/// Splits `[pos, end)` at block boundaries.
struct BlksRange {
    blk_size: BlkSize,
    pos: u32,
    end: u32,
}

impl BlksRange {
    fn new(blk_size: BlkSize, offset: u32, end: u32) -> Self {
        Self {
            blk_size,
            pos: offset,
            end,
        }
    }
}

impl Iterator for BlksRange {
    type Item = Blk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        let offset_of_blk = self.blk_size.mod_by(self.pos);
        let len = (self.blk_size.size() - offset_of_blk).min(self.end - self.pos);
        let blk = Blk {
            nth: self.blk_size.div_by(self.pos),
            offset_of_blk,
            len,
        };
        self.pos += len;
        Some(blk)
    }
}

impl<MutexType, DK> TinyFs<MutexType, DK>
where
    MutexType: lock_api::RawMutex,
    DK: Disk,
{
    /// Reads `buf.len()` bytes of `file` starting at `offset`.
    ///
    /// The whole range must lie inside the blocks the file owns, otherwise
    /// `OutOfRange` is returned and nothing is read. Reads never extend a file.
    pub fn read_at(&self, file: &mut Inode, offset: u32, buf: &mut [u8]) -> Result<u32> {
        check_file(file)?;
        let blk_size = self.blk_device.blk_size;
        let end = offset as u64 + buf.len() as u64;
        let capacity = (file.raw.size as u64) << blk_size.blk_size_log2;
        if end > capacity {
            return Err(Error::OutOfRange);
        }

        let mut scratch = self.blk_device.blk_buf();
        let mut read_len = 0;
        for blk in BlksRange::new(blk_size, offset, end as u32) {
            let blk_id = file.raw.direct_blks[blk.nth as usize];
            let dst = &mut buf[read_len..read_len + blk.len as usize];
            if blk.len == blk_size.size() {
                self.blk_device.read_blk(blk_id, dst)?;
            } else {
                self.blk_device.read_blk(blk_id, &mut scratch)?;
                let start = blk.offset_of_blk as usize;
                dst.copy_from_slice(&scratch[start..start + blk.len as usize]);
            }
            read_len += blk.len as usize;
        }

        file.raw.atime = self.now();
        self.write_inode(file)?;
        Ok(read_len as u32)
    }

    /// Writes `buf` into `file` at `offset`, growing the file as needed.
    ///
    /// Blocks between the current end of the file and `offset` are allocated
    /// zero filled. A write is either done in full or fails up front with
    /// `FileTooLarge` or `OutOfSpace`.
    pub fn write_at(&self, file: &mut Inode, offset: u32, buf: &[u8]) -> Result<u32> {
        check_file(file)?;
        let blk_size = self.blk_device.blk_size;
        let end = offset as u64 + buf.len() as u64;
        let end_blks = crate::div_round_up!(end, blk_size.size() as u64);
        if end_blks > consts::INODE_DIRECT_BLK_COUNT as u64 || end > u32::MAX as u64 {
            return Err(Error::FileTooLarge);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let new_blks = end_blks.saturating_sub(file.raw.size as u64);
        if new_blks > self.super_blk.free_blks() as u64 {
            return Err(Error::OutOfSpace);
        }
        for _ in 0..new_blks {
            if let Err(e) = self.append_blk(file, None) {
                // keep the blocks we already got reachable from the inode
                self.write_inode(file)?;
                return Err(e);
            }
        }

        let mut scratch = self.blk_device.blk_buf();
        let mut write_len = 0;
        for blk in BlksRange::new(blk_size, offset, end as u32) {
            let blk_id = file.raw.direct_blks[blk.nth as usize];
            let src = &buf[write_len..write_len + blk.len as usize];
            if blk.len == blk_size.size() {
                self.blk_device.write_blk(blk_id, src)?;
            } else {
                self.blk_device.read_blk(blk_id, &mut scratch)?;
                let start = blk.offset_of_blk as usize;
                scratch[start..start + blk.len as usize].copy_from_slice(src);
                self.blk_device.write_blk(blk_id, &scratch)?;
            }
            write_len += blk.len as usize;
        }

        let now = self.now();
        file.raw.byte_size = file.raw.byte_size.max(end as u32);
        file.raw.atime = now;
        file.raw.mtime = now;
        file.raw.ctime = now;
        self.write_inode(file)?;
        trace!(
            "write {} bytes at {} to inode {}",
            write_len,
            offset,
            file.inode_id
        );
        Ok(write_len as u32)
    }
}

fn check_file(inode: &Inode) -> Result<()> {
    if inode.is_dir() {
        Err(Error::IsDir)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{Blk, BlksRange};
    use crate::{
        inode::Inode,
        test_util::{create_tiny_fs, small_opts, TestFs},
        BlkSize, Error, FileType, Mode,
    };
    use alloc::vec::Vec;

    fn new_file(fs: &TestFs, name: &str) -> Inode {
        let mut root = fs.root().unwrap();
        let inode_id = fs
            .create_entry(
                &mut root,
                name.as_bytes(),
                FileType::RegFile,
                Mode::PERM_RW_USR,
                0,
                0,
            )
            .unwrap();
        fs.load_inode(inode_id).unwrap()
    }

    fn blk(nth: u32, offset_of_blk: u32, len: u32) -> Blk {
        Blk {
            nth,
            offset_of_blk,
            len,
        }
    }

    #[test]
    fn test_blks_range() {
        let blk_size = BlkSize::new(32).unwrap();
        let cases = [
            (20, 65, vec![blk(0, 20, 12), blk(1, 0, 32), blk(2, 0, 21)]),
            (20, 1, vec![blk(0, 20, 1)]),
            (0, 1, vec![blk(0, 0, 1)]),
            (32, 64, vec![blk(1, 0, 32), blk(2, 0, 32)]),
            (31, 2, vec![blk(0, 31, 1), blk(1, 0, 1)]),
            (40, 0, vec![]),
        ];
        for (offset, len, expected) in cases {
            let blks: Vec<_> = BlksRange::new(blk_size, offset, offset + len).collect();
            assert_eq!(blks, expected, "offset {} len {}", offset, len);
        }
    }

    #[test]
    fn test_ten_bytes() {
        let fs = create_tiny_fs(small_opts());
        let mut file = new_file(&fs, "a.txt");
        assert_eq!(file.byte_size(), 0);

        assert_eq!(fs.write_at(&mut file, 0, b"0123456789").unwrap(), 10);
        let mut buf = [0; 10];
        assert_eq!(fs.read_at(&mut file, 0, &mut buf).unwrap(), 10);
        assert_eq!(&buf, b"0123456789");

        let file = fs.load_inode(file.inode_id).unwrap();
        assert_eq!(file.byte_size(), 10);
        assert_eq!(file.raw.size, 1);
        assert_eq!(file.raw.blocks, 1);
    }

    #[test]
    fn test_read_write_consistency() {
        let fs = create_tiny_fs(small_opts());
        let mut file = new_file(&fs, "f");
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        let cases = [(0, 1), (0, 512), (1, 511), (300, 1000), (511, 2), (1024, 3000), (4000, 96)];
        for (offset, len) in cases {
            let src = &data[..len];
            assert_eq!(fs.write_at(&mut file, offset, src).unwrap(), len as u32);
            let mut dst = vec![0; len];
            fs.read_at(&mut file, offset, &mut dst).unwrap();
            assert_eq!(dst, src, "offset {} len {}", offset, len);
        }
        // 4096 bytes span exactly 8 blocks
        assert_eq!(file.raw.size, 8);
        assert_eq!(file.byte_size(), 4096);
    }

    #[test]
    fn test_overwrite_keeps_neighbours() {
        let fs = create_tiny_fs(small_opts());
        let mut file = new_file(&fs, "f");
        fs.write_at(&mut file, 0, &[b'a'; 1024]).unwrap();
        fs.write_at(&mut file, 510, b"xyz").unwrap();

        let mut buf = [0; 1024];
        fs.read_at(&mut file, 0, &mut buf).unwrap();
        assert!(buf[..510].iter().all(|&c| c == b'a'));
        assert_eq!(&buf[510..513], b"xyz");
        assert!(buf[513..].iter().all(|&c| c == b'a'));
        assert_eq!(file.byte_size(), 1024);
    }

    #[test]
    fn test_gap_is_zero_filled() {
        let fs = create_tiny_fs(small_opts());
        let mut file = new_file(&fs, "f");
        fs.write_at(&mut file, 1500, b"end").unwrap();
        assert_eq!(file.raw.size, 3);
        assert_eq!(file.byte_size(), 1503);

        let mut buf = vec![0xff; 1500];
        fs.read_at(&mut file, 0, &mut buf).unwrap();
        assert!(buf.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_file_too_large() {
        let fs = create_tiny_fs(small_opts());
        let mut file = new_file(&fs, "f");
        let free_blks = fs.super_blk().free_blks();
        // 16 blocks of 512 bytes
        fs.write_at(&mut file, 8191, b"x").unwrap();
        assert!(matches!(
            fs.write_at(&mut file, 8191, b"xy"),
            Err(Error::FileTooLarge)
        ));
        assert!(matches!(
            fs.write_at(&mut file, u32::MAX, b"xy"),
            Err(Error::FileTooLarge)
        ));
        assert_eq!(fs.super_blk().free_blks(), free_blks - 16);
        assert_eq!(file.byte_size(), 8192);
    }

    #[test]
    fn test_out_of_space_is_all_or_nothing() {
        let fs = create_tiny_fs(small_opts());
        let mut files: Vec<_> = (0..4).map(|i| new_file(&fs, &format!("f{}", i))).collect();
        // root holds three blocks, three files take 48 of the remaining 61
        for file in files.iter_mut().take(3) {
            fs.write_at(file, 0, &[1; 8192]).unwrap();
        }
        let free_blks = fs.super_blk().free_blks();
        assert_eq!(free_blks, 13);

        assert!(matches!(
            fs.write_at(&mut files[3], 0, &[1; 8192]),
            Err(Error::OutOfSpace)
        ));
        assert_eq!(fs.super_blk().free_blks(), free_blks);
        assert_eq!(fs.load_inode(files[3].inode_id).unwrap().raw.size, 0);
    }

    #[test]
    fn test_out_of_range() {
        let fs = create_tiny_fs(small_opts());
        let mut file = new_file(&fs, "f");
        let mut buf = [0; 4];
        assert!(matches!(
            fs.read_at(&mut file, 0, &mut buf),
            Err(Error::OutOfRange)
        ));

        fs.write_at(&mut file, 0, b"ab").unwrap();
        // the rest of the block is readable, the next one is not
        fs.read_at(&mut file, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"ab\0\0");
        assert!(matches!(
            fs.read_at(&mut file, 510, &mut buf),
            Err(Error::OutOfRange)
        ));
    }

    #[test]
    fn test_dir_io() {
        let fs = create_tiny_fs(small_opts());
        let mut root = fs.root().unwrap();
        let mut buf = [0; 4];
        assert!(matches!(
            fs.read_at(&mut root, 0, &mut buf),
            Err(Error::IsDir)
        ));
        assert!(matches!(fs.write_at(&mut root, 0, &buf), Err(Error::IsDir)));
    }
}
