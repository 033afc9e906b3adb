//! Path based front end of a tiny_fs volume.
//!
//! Every call takes the whole file system lock, splits its path into parent
//! and leaf where needed and reports failures as errno codes.

#![no_std]

#[allow(unused_imports)]
#[macro_use]
extern crate alloc;
#[macro_use]
extern crate log;

mod errno;

use alloc::vec::Vec;
use lock_api::{Mutex, MutexGuard};
use tiny_fs::{
    inode::Inode, Clock, Disk, FileType, FormatOptions, InodeId, Mode, Path, RawDirEntry, TinyFs,
};

pub use errno::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// `Tfs` over spin locks, what hosted tools use.
pub type SpinTfs<DK> = Tfs<spin::Mutex<()>, DK>;

/// File attributes as reported by `getattr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Inode number
    pub ino: u64,
    /// Type and permission bits
    pub mode: u32,
    /// Number of hard links
    pub nlink: u32,
    /// User ID of the file
    pub uid: u32,
    /// Group ID of the file
    pub gid: u32,
    /// file size, in bytes
    pub size: u64,
    /// optimal blocksize for I/O
    pub blk_size: u32,
    /// 512 byte blocks allocated for file
    pub blk_cnt: u32,
    /// time of last access
    pub atime: u32,
    /// time of last modification
    pub mtime: u32,
    /// time of last status change
    pub ctime: u32,
}

pub struct Tfs<MutexType, DK> {
    fs: Mutex<MutexType, TinyFs<MutexType, DK>>,
    /// Owner of everything created through this handle.
    uid: u32,
    gid: u32,
}

impl<MutexType, DK> Tfs<MutexType, DK>
where
    MutexType: lock_api::RawMutex,
    DK: Disk,
{
    /// Formats `disk` and serves the new, empty volume.
    pub fn format(disk: DK, opts: FormatOptions, clock: Clock) -> Result<Self> {
        Ok(Self::new(TinyFs::format(disk, opts, clock)?))
    }

    /// Serves the volume already on `disk`.
    pub fn open(disk: DK, clock: Clock) -> Result<Self> {
        Ok(Self::new(TinyFs::open(disk, clock)?))
    }

    fn new(fs: TinyFs<MutexType, DK>) -> Self {
        Self {
            fs: Mutex::new(fs),
            uid: 0,
            gid: 0,
        }
    }

    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MutexType, TinyFs<MutexType, DK>> {
        self.fs.lock()
    }

    pub fn getattr(&self, path: &Path) -> Result<Stat> {
        let fs = self.lock();
        let inode = fs.resolve(path)?;
        Ok(Stat {
            ino: inode.inode_id as u64,
            mode: inode.raw.mode as u32,
            nlink: inode.raw.links_count as u32,
            uid: inode.raw.uid,
            gid: inode.raw.gid,
            size: inode.raw.byte_size as u64,
            blk_size: fs.blk_size(),
            blk_cnt: inode.raw.blocks,
            atime: inode.raw.atime,
            mtime: inode.raw.mtime,
            ctime: inode.raw.ctime,
        })
    }

    /// Checks that `path` is a directory and returns its inode number.
    pub fn opendir(&self, path: &Path) -> Result<InodeId> {
        let inode = self.lock().resolve(path)?;
        if !inode.is_dir() {
            return Err(Error::ENOTDIR);
        }
        Ok(inode.inode_id)
    }

    /// Entries of the directory `path`, "." and ".." first.
    pub fn readdir(&self, path: &Path) -> Result<Vec<RawDirEntry>> {
        let fs = self.lock();
        let dir = fs.resolve(path)?;
        Ok(fs.list(&dir)?)
    }

    pub fn releasedir(&self, path: &Path) -> Result<()> {
        self.opendir(path).map(|_| ())
    }

    pub fn mkdir(&self, path: &Path, mode: Mode) -> Result<InodeId> {
        self.create_entry(path, FileType::Dir, mode)
    }

    pub fn rmdir(&self, path: &Path) -> Result<()> {
        self.remove_entry(path, FileType::Dir)
    }

    /// Creates the empty regular file `path`.
    pub fn create(&self, path: &Path, mode: Mode) -> Result<InodeId> {
        self.create_entry(path, FileType::RegFile, mode)
    }

    /// Checks that `path` is a regular file and returns its inode number.
    pub fn open_file(&self, path: &Path) -> Result<InodeId> {
        let inode = self.lock().resolve(path)?;
        if inode.is_dir() {
            return Err(Error::EISDIR);
        }
        Ok(inode.inode_id)
    }

    /// Reads from `offset`, stopping at the end of the file.
    pub fn read(&self, path: &Path, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let fs = self.lock();
        let mut file = fs.resolve(path)?;
        if file.is_dir() {
            return Err(Error::EISDIR);
        }
        let byte_size = file.byte_size() as u64;
        if offset >= byte_size {
            return Ok(0);
        }
        let len = (byte_size - offset).min(buf.len() as u64) as usize;
        Ok(fs.read_at(&mut file, offset as u32, &mut buf[..len])? as usize)
    }

    pub fn write(&self, path: &Path, offset: u64, buf: &[u8]) -> Result<usize> {
        if offset > u32::MAX as u64 {
            return Err(Error::EFBIG);
        }
        let fs = self.lock();
        let mut file = fs.resolve(path)?;
        Ok(fs.write_at(&mut file, offset as u32, buf)? as usize)
    }

    pub fn unlink(&self, path: &Path) -> Result<()> {
        self.remove_entry(path, FileType::RegFile)
    }

    pub fn release(&self, path: &Path) -> Result<()> {
        self.open_file(path).map(|_| ())
    }

    /// Every write is already on the disk; this only flushes the disk itself.
    pub fn flush(&self, path: &Path) -> Result<()> {
        let fs = self.lock();
        fs.resolve(path)?;
        Ok(fs.sync()?)
    }

    pub fn utimens(&self, path: &Path, atime: u32, mtime: u32) -> Result<()> {
        let fs = self.lock();
        let mut inode = fs.resolve(path)?;
        Ok(fs.set_times(&mut inode, atime, mtime)?)
    }

    /// Flushes the disk and hands it back.
    pub fn into_disk(self) -> Result<DK> {
        let fs = self.fs.into_inner();
        fs.sync()?;
        Ok(fs.into_disk())
    }

    fn create_entry(&self, path: &Path, file_type: FileType, mode: Mode) -> Result<InodeId> {
        let (parent_path, name) = split_leaf(path, Error::EEXIST)?;
        let fs = self.lock();
        let mut parent = parent_dir(&fs, parent_path)?;
        let inode_id = fs.create_entry(&mut parent, name, file_type, mode, self.uid, self.gid)?;
        trace!("{:?}: created inode {}", path, inode_id);
        Ok(inode_id)
    }

    fn remove_entry(&self, path: &Path, file_type: FileType) -> Result<()> {
        let (parent_path, name) = split_leaf(path, Error::EBUSY)?;
        if name == b"." || name == b".." {
            return Err(Error::EINVAL);
        }
        let fs = self.lock();
        let mut parent = parent_dir(&fs, parent_path)?;
        let inode = fs.load_inode(fs.lookup(&parent, name)?)?;
        match (file_type, inode.is_dir()) {
            (FileType::Dir, false) => return Err(Error::ENOTDIR),
            (FileType::RegFile, true) => return Err(Error::EISDIR),
            _ => {}
        }
        fs.remove_entry(&mut parent, name)?;
        trace!("{:?}: removed", path);
        Ok(())
    }
}

/// Splits `path` into its parent and last component.
/// `on_root` is returned for a path naming the root itself.
fn split_leaf(path: &Path, on_root: Error) -> Result<(&Path, &[u8])> {
    match path.pop() {
        (_, None) => Err(on_root),
        // "/d//" resolves to nothing, so it creates and removes nothing either
        (_, Some(name)) if name.is_empty() => Err(Error::ENOENT),
        (parent_path, Some(name)) => Ok((parent_path, name)),
    }
}

fn parent_dir<MutexType, DK>(fs: &TinyFs<MutexType, DK>, path: &Path) -> Result<Inode>
where
    MutexType: lock_api::RawMutex,
    DK: Disk,
{
    let parent = fs.resolve(path)?;
    if !parent.is_dir() {
        return Err(Error::ENOTDIR);
    }
    Ok(parent)
}
