num_enum::num_enum! {
    #[allow(clippy::upper_case_acronyms)]
    pub Error: u8 {
        /// No such file or directory
        ENOENT = 2,
        /// I/O error
        EIO = 5,
        /// Device or resource busy
        EBUSY = 16,
        /// File exists
        EEXIST = 17,
        /// Not a directory.
        ENOTDIR = 20,
        /// Is a directory
        EISDIR = 21,
        /// Invalid argument
        EINVAL = 22,
        /// File too large
        EFBIG = 27,
        /// No space left on device
        ENOSPC = 28,
        /// File name too long
        ENAMETOOLONG = 36,
        /// Directory not empty
        ENOTEMPTY = 39,
    }
}

impl Error {
    /// The negated code, as FUSE style callbacks return it.
    pub fn errno(self) -> i32 {
        -(self.to_primitive() as i32)
    }
}

impl From<tiny_fs::Error> for Error {
    fn from(fs_error: tiny_fs::Error) -> Self {
        match fs_error {
            tiny_fs::Error::OutOfInodes => Error::ENOSPC,
            tiny_fs::Error::OutOfSpace => Error::ENOSPC,
            tiny_fs::Error::DirFull => Error::ENOSPC,
            tiny_fs::Error::DiskTooSmall => Error::ENOSPC,
            tiny_fs::Error::NotFound => Error::ENOENT,
            tiny_fs::Error::AlreadyExists => Error::EEXIST,
            tiny_fs::Error::NotDir => Error::ENOTDIR,
            tiny_fs::Error::IsDir => Error::EISDIR,
            tiny_fs::Error::FileTooLarge => Error::EFBIG,
            tiny_fs::Error::DirNotEmpty => Error::ENOTEMPTY,
            tiny_fs::Error::NameTooLong => Error::ENAMETOOLONG,
            tiny_fs::Error::OutOfRange => Error::EINVAL,
            tiny_fs::Error::InvalidDirEntryName => Error::EINVAL,
            tiny_fs::Error::BadMagic => Error::EINVAL,
            tiny_fs::Error::InvalidBlkSize(_) => Error::EINVAL,
            tiny_fs::Error::InvalidInodeId(inode_id) => {
                error!("dangling reference to inode {}", inode_id);
                Error::EIO
            }
            tiny_fs::Error::CorruptInode(inode_id) => {
                error!("inode {} is corrupted", inode_id);
                Error::EIO
            }
            tiny_fs::Error::DoubleFree => Error::EIO,
            tiny_fs::Error::DiskError(_) => Error::EIO,
        }
    }
}
