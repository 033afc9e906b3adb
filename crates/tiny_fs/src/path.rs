use crate::{blk_device::Disk, inode::Inode, Error, Result, TinyFs};
use core::{fmt, str};

/// A `/` delimited path, borrowed.
#[repr(transparent)]
#[derive(PartialEq, Eq)]
pub struct Path([u8]);

impl Path {
    pub fn new<S: AsRef<[u8]> + ?Sized>(s: &S) -> &Self {
        Self::from_bytes(s.as_ref())
    }

    pub fn from_bytes(bytes: &[u8]) -> &Self {
        unsafe { &*(bytes as *const [u8] as *const Self) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Splits off the first component.
    ///
    /// Exactly one leading '/' is eaten, so "//a" yields an empty component.
    /// Returns `None` once nothing is left.
    pub fn shift(&self) -> Option<(&[u8], &Self)> {
        let bytes = self.0.strip_prefix(b"/").unwrap_or(&self.0);
        if bytes.is_empty() {
            return None;
        }
        let len = bytes.iter().position(|&c| c == b'/').unwrap_or(bytes.len());
        Some((&bytes[..len], Self::from_bytes(&bytes[len..])))
    }

    /// Splits off the last component.
    ///
    /// Mirrors `shift`: exactly one trailing '/' is ignored, so "/a//" yields
    /// an empty component. Returns `None` for a path naming the root.
    pub fn pop(&self) -> (&Self, Option<&[u8]>) {
        let bytes = self.0.strip_suffix(b"/").unwrap_or(&self.0);
        if bytes.is_empty() {
            return (self, None);
        }

        let start_pos = bytes
            .iter()
            .rposition(|&c| c == b'/')
            .map(|x| x + 1)
            .unwrap_or(0);

        (
            Self::from_bytes(&bytes[..start_pos]),
            Some(&bytes[start_pos..]),
        )
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match str::from_utf8(&self.0) {
            Ok(path) => write!(f, "{:?}", path),
            Err(_) => write!(f, "{:?}", &self.0),
        }
    }
}

impl<MutexType, DK> TinyFs<MutexType, DK>
where
    MutexType: lock_api::RawMutex,
    DK: Disk,
{
    /// Resolves `path` starting at the root directory.
    pub fn resolve(&self, path: &Path) -> Result<Inode> {
        self.resolve_from(path, self.root()?)
    }

    /// Walks `path` one component at a time starting at `start`.
    /// Nothing is written on the way.
    pub fn resolve_from(&self, path: &Path, start: Inode) -> Result<Inode> {
        let mut inode = start;
        let mut path = path;
        while let Some((name, rest)) = path.shift() {
            if name.is_empty() {
                return Err(Error::NotFound);
            }
            let inode_id = self.lookup(&inode, name)?;
            inode = self.load_inode(inode_id)?;
            path = rest;
        }
        Ok(inode)
    }
}
