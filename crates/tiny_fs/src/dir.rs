use crate::{
    blk_device::{BlkDevice, Disk},
    consts::{DIR_ENTRY_LEN, DIR_ENTRY_NAME_CAP},
    inode::Inode,
    BlkId, Error, InodeId, Result, TinyFs,
};
use alloc::{string::String, vec::Vec};
use core::{fmt, str};

/// Layout of a directory entry on disk:
/// valid (u8), name_len (u8), inode_id (u16 le), name bytes.
const VALID_OFFSET: usize = 0;
const NAME_LEN_OFFSET: usize = 1;
const INODE_ID_OFFSET: usize = 2;
const NAME_OFFSET: usize = 4;

#[derive(Clone, PartialEq, Eq)]
pub struct DirEntryName {
    bytes: [u8; DIR_ENTRY_NAME_CAP],
    len: u8,
}

impl DirEntryName {
    /// Checks `name` and copies it.
    /// "." and ".." are reserved for the entries every directory starts with.
    pub fn new(name: &[u8]) -> Result<Self> {
        if name.len() > DIR_ENTRY_NAME_CAP {
            return Err(Error::NameTooLong);
        }
        if name.is_empty()
            || name == b"."
            || name == b".."
            || name.iter().any(|&c| c == b'/' || c == 0)
        {
            return Err(Error::InvalidDirEntryName);
        }
        Ok(Self::from_bytes_unchecked(name))
    }

    pub(crate) fn dot() -> Self {
        Self::from_bytes_unchecked(b".")
    }

    pub(crate) fn dotdot() -> Self {
        Self::from_bytes_unchecked(b"..")
    }

    fn from_bytes_unchecked(name: &[u8]) -> Self {
        let mut bytes = [0; DIR_ENTRY_NAME_CAP];
        bytes[..name.len()].copy_from_slice(name);
        Self {
            bytes,
            len: name.len() as u8,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.as_slice()).into_owned()
    }
}

impl fmt::Debug for DirEntryName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match str::from_utf8(self.as_slice()) {
            Ok(name) => write!(f, "{:?}", name),
            Err(_) => write!(f, "{:?}", self.as_slice()),
        }
    }
}

/// A valid directory entry. Free slots have no `RawDirEntry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDirEntry {
    pub inode_id: InodeId,
    pub name: DirEntryName,
}

impl RawDirEntry {
    pub fn new(inode_id: InodeId, name: DirEntryName) -> Self {
        Self { inode_id, name }
    }

    /// Decodes one slot, `None` for a free slot.
    pub fn decode(slot: &[u8]) -> Option<Self> {
        if slot[VALID_OFFSET] == 0 {
            return None;
        }
        let name_len = (slot[NAME_LEN_OFFSET] as usize).min(DIR_ENTRY_NAME_CAP);
        let inode_id = InodeId::from_le_bytes([slot[INODE_ID_OFFSET], slot[INODE_ID_OFFSET + 1]]);
        Some(Self::new(
            inode_id,
            DirEntryName::from_bytes_unchecked(&slot[NAME_OFFSET..NAME_OFFSET + name_len]),
        ))
    }

    pub fn encode(&self, slot: &mut [u8]) {
        slot.fill(0);
        slot[VALID_OFFSET] = 1;
        slot[NAME_LEN_OFFSET] = self.name.len;
        slot[INODE_ID_OFFSET..NAME_OFFSET].copy_from_slice(&self.inode_id.to_le_bytes());
        slot[NAME_OFFSET..NAME_OFFSET + DIR_ENTRY_NAME_CAP].copy_from_slice(&self.name.bytes);
    }
}

/// A directory data block viewed as an array of slots.
pub(crate) struct DirBlk {
    blk_id: BlkId,
    buf: Vec<u8>,
}

impl DirBlk {
    pub(crate) fn load<DK: Disk>(blk_device: &BlkDevice<DK>, blk_id: BlkId) -> Result<Self> {
        let mut buf = blk_device.blk_buf();
        blk_device.read_blk(blk_id, &mut buf)?;
        Ok(Self { blk_id, buf })
    }

    /// A block whose slots are all free.
    pub(crate) fn empty<DK: Disk>(blk_device: &BlkDevice<DK>) -> Self {
        Self {
            blk_id: 0,
            buf: blk_device.blk_buf(),
        }
    }

    /// The first block of a new directory: "." and "..".
    pub(crate) fn with_dots<DK: Disk>(
        blk_device: &BlkDevice<DK>,
        inode_id: InodeId,
        parent_inode_id: InodeId,
    ) -> Self {
        let mut dir_blk = Self::empty(blk_device);
        dir_blk.set(0, Some(&RawDirEntry::new(inode_id, DirEntryName::dot())));
        dir_blk.set(
            1,
            Some(&RawDirEntry::new(parent_inode_id, DirEntryName::dotdot())),
        );
        dir_blk
    }

    pub(crate) fn slots(&self) -> impl Iterator<Item = Option<RawDirEntry>> + '_ {
        self.buf.chunks_exact(DIR_ENTRY_LEN).map(RawDirEntry::decode)
    }

    /// Index of the valid entry called `name`.
    pub(crate) fn position(&self, name: &[u8]) -> Option<usize> {
        self.buf.chunks_exact(DIR_ENTRY_LEN).position(|slot| {
            slot[VALID_OFFSET] != 0
                && slot[NAME_LEN_OFFSET] as usize == name.len()
                && &slot[NAME_OFFSET..NAME_OFFSET + name.len()] == name
        })
    }

    pub(crate) fn first_free(&self) -> Option<usize> {
        self.buf
            .chunks_exact(DIR_ENTRY_LEN)
            .position(|slot| slot[VALID_OFFSET] == 0)
    }

    /// Fills slot `idx`, or only clears its valid flag for `None`.
    pub(crate) fn set(&mut self, idx: usize, entry: Option<&RawDirEntry>) {
        let slot = &mut self.buf[idx * DIR_ENTRY_LEN..(idx + 1) * DIR_ENTRY_LEN];
        match entry {
            Some(entry) => entry.encode(slot),
            None => slot[VALID_OFFSET] = 0,
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn store<DK: Disk>(&self, blk_device: &BlkDevice<DK>) -> Result<()> {
        blk_device.write_blk(self.blk_id, &self.buf)
    }
}

impl<MutexType, DK> TinyFs<MutexType, DK>
where
    MutexType: lock_api::RawMutex,
    DK: Disk,
{
    /// Finds the inode `name` refers to inside `dir`.
    pub fn lookup(&self, dir: &Inode, name: &[u8]) -> Result<InodeId> {
        check_dir(dir)?;
        for &blk_id in dir.blks() {
            let dir_blk = DirBlk::load(&self.blk_device, blk_id)?;
            if let Some(idx) = dir_blk.position(name) {
                if let Some(Some(entry)) = dir_blk.slots().nth(idx) {
                    return Ok(entry.inode_id);
                }
            }
        }
        Err(Error::NotFound)
    }

    /// Adds `name -> inode_id` to `dir`, reusing the first free slot if any.
    /// `dir` is updated and written back.
    pub fn insert(&self, dir: &mut Inode, name: &DirEntryName, inode_id: InodeId) -> Result<()> {
        check_dir(dir)?;
        let entry = RawDirEntry::new(inode_id, name.clone());

        let mut free_slot: Option<(DirBlk, usize)> = None;
        for &blk_id in dir.blks() {
            let dir_blk = DirBlk::load(&self.blk_device, blk_id)?;
            if dir_blk.position(name.as_slice()).is_some() {
                return Err(Error::AlreadyExists);
            }
            if free_slot.is_none() {
                if let Some(idx) = dir_blk.first_free() {
                    free_slot = Some((dir_blk, idx));
                }
            }
        }

        match free_slot {
            Some((mut dir_blk, idx)) => {
                dir_blk.set(idx, Some(&entry));
                dir_blk.store(&self.blk_device)?;
            }
            None => {
                let mut dir_blk = DirBlk::empty(&self.blk_device);
                dir_blk.set(0, Some(&entry));
                self.append_blk(dir, Some(dir_blk.as_bytes()))
                    .map_err(|e| match e {
                        Error::FileTooLarge => Error::DirFull,
                        e => e,
                    })?;
            }
        }

        let now = self.now();
        dir.raw.mtime = now;
        dir.raw.atime = now;
        dir.raw.byte_size += DIR_ENTRY_LEN as u32;
        self.write_inode(dir)?;
        debug!("insert {:?} -> {} into dir {}", name, inode_id, dir.inode_id);
        Ok(())
    }

    /// Tombstones the entry `name` of `dir` and returns the inode it referred to.
    /// The slot stays where it is and is reused by a later `insert`.
    pub fn remove(&self, dir: &mut Inode, name: &[u8]) -> Result<InodeId> {
        check_dir(dir)?;
        for &blk_id in dir.blks() {
            let mut dir_blk = DirBlk::load(&self.blk_device, blk_id)?;
            let idx = match dir_blk.position(name) {
                Some(idx) => idx,
                None => continue,
            };
            let inode_id = match dir_blk.slots().nth(idx) {
                Some(Some(entry)) => entry.inode_id,
                _ => continue,
            };
            dir_blk.set(idx, None);
            dir_blk.store(&self.blk_device)?;

            let now = self.now();
            dir.raw.mtime = now;
            dir.raw.atime = now;
            dir.raw.byte_size = dir.raw.byte_size.saturating_sub(DIR_ENTRY_LEN as u32);
            self.write_inode(dir)?;
            debug!(
                "remove {:?} -> {} from dir {}",
                str::from_utf8(name),
                inode_id,
                dir.inode_id
            );
            return Ok(inode_id);
        }
        Err(Error::NotFound)
    }

    /// Valid entries of `dir` in slot order, "." and ".." included.
    pub fn list(&self, dir: &Inode) -> Result<Vec<RawDirEntry>> {
        check_dir(dir)?;
        let mut entries = Vec::new();
        for &blk_id in dir.blks() {
            let dir_blk = DirBlk::load(&self.blk_device, blk_id)?;
            entries.extend(dir_blk.slots().flatten());
        }
        Ok(entries)
    }

    /// Gives the freshly created directory `dir` its first block holding
    /// "." and "..". The inode is not written.
    pub(crate) fn init_dir(&self, dir: &mut Inode, parent_inode_id: InodeId) -> Result<()> {
        let dir_blk = DirBlk::with_dots(&self.blk_device, dir.inode_id, parent_inode_id);
        self.append_blk(dir, Some(dir_blk.as_bytes()))?;
        dir.raw.links_count = 2;
        dir.raw.byte_size = 2 * DIR_ENTRY_LEN as u32;
        Ok(())
    }

    /// True if `dir` holds nothing but "." and "..".
    pub fn is_empty_dir(&self, dir: &Inode) -> Result<bool> {
        Ok(self
            .list(dir)?
            .iter()
            .all(|entry| matches!(entry.name.as_slice(), b"." | b"..")))
    }
}

fn check_dir(inode: &Inode) -> Result<()> {
    if !inode.is_dir() {
        Err(Error::NotDir)
    } else {
        Ok(())
    }
}
