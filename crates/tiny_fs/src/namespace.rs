use crate::{
    blk_device::Disk,
    dir::DirEntryName,
    inode::{FileType, Inode, Mode, RawInode},
    Error, InodeId, Result, TinyFs,
};

impl<MutexType, DK> TinyFs<MutexType, DK>
where
    MutexType: lock_api::RawMutex,
    DK: Disk,
{
    /// Creates an empty file or directory called `name` inside `parent`.
    ///
    /// A new directory starts with "." and ".." and adds one link to
    /// `parent`. Nothing stays allocated if the entry cannot be inserted.
    pub fn create_entry(
        &self,
        parent: &mut Inode,
        name: &[u8],
        file_type: FileType,
        mode: Mode,
        uid: u32,
        gid: u32,
    ) -> Result<InodeId> {
        let name = DirEntryName::new(name)?;
        match self.lookup(parent, name.as_slice()) {
            Ok(_) => return Err(Error::AlreadyExists),
            Err(Error::NotFound) => {}
            Err(e) => return Err(e),
        }

        let inode_id = self.super_blk.alloc_inode(&self.blk_device)?;
        let mut inode = Inode::new(
            inode_id,
            RawInode::new(inode_id, file_type, mode, uid, gid, self.now()),
        );
        if let Err(e) = self.link_new_inode(parent, &name, &mut inode) {
            if let Err(release_err) = self.release_inode(&mut inode) {
                warn!(
                    "failed to release inode {} after {:?}: {:?}",
                    inode_id, e, release_err
                );
            }
            return Err(e);
        }

        if file_type == FileType::Dir {
            parent.raw.links_count += 1;
            self.write_inode(parent)?;
        }
        debug!(
            "created {:?} {:?} as inode {} in dir {}",
            file_type, name, inode_id, parent.inode_id
        );
        Ok(inode_id)
    }

    fn link_new_inode(
        &self,
        parent: &mut Inode,
        name: &DirEntryName,
        inode: &mut Inode,
    ) -> Result<()> {
        if inode.is_dir() {
            self.init_dir(inode, parent.inode_id)?;
        }
        self.write_inode(inode)?;
        self.insert(parent, name, inode.inode_id)
    }

    /// Removes the entry `name` from `parent` and frees what it refers to.
    ///
    /// Directories must be empty. The entry is tombstoned first, then the
    /// data blocks and the inode are released.
    pub fn remove_entry(&self, parent: &mut Inode, name: &[u8]) -> Result<()> {
        if name == b"." || name == b".." {
            return Err(Error::InvalidDirEntryName);
        }
        let inode_id = self.lookup(parent, name)?;
        let mut inode = self.load_inode(inode_id)?;
        if inode.is_dir() && !self.is_empty_dir(&inode)? {
            return Err(Error::DirNotEmpty);
        }

        self.remove(parent, name)?;
        if inode.is_dir() {
            parent.raw.links_count = parent.raw.links_count.saturating_sub(1);
            self.write_inode(parent)?;
        }
        self.release_inode(&mut inode)?;
        debug!("removed inode {} from dir {}", inode_id, parent.inode_id);
        Ok(())
    }

    /// Sets the access and modification times, ctime becomes now.
    pub fn set_times(&self, inode: &mut Inode, atime: u32, mtime: u32) -> Result<()> {
        inode.raw.atime = atime;
        inode.raw.mtime = mtime;
        inode.raw.ctime = self.now();
        self.write_inode(inode)
    }
}
