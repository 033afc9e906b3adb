#[macro_use]
extern crate log;

use std::{
    fs::{self, File, Metadata, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};

use tiny_fs::{inode::Inode, DiskError, DiskResult, FileType, Mode};

pub type TinyFs = tiny_fs::TinyFs<spin::Mutex<()>, FileDisk>;

type SpinMutex<T> = lock_api::Mutex<spin::Mutex<()>, T>;

/// A disk image stored in a host file.
pub struct FileDisk {
    file: SpinMutex<File>,
    capacity: u64,
}

impl FileDisk {
    /// Creates a new zeroed image of `capacity` bytes.
    /// Fails if `path` already exists.
    pub fn create<P: AsRef<Path>>(path: P, capacity: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        file.set_len(capacity)?;
        Ok(Self {
            file: SpinMutex::new(file),
            capacity,
        })
    }

    /// Opens an existing image, `None` if there is none at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Option<Self>> {
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let capacity = file.metadata()?.len();
        Ok(Some(Self {
            file: SpinMutex::new(file),
            capacity,
        }))
    }
}

fn to_disk_err(e: io::Error) -> DiskError {
    Box::new(e)
}

impl tiny_fs::Disk for FileDisk {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> DiskResult<usize> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset)).map_err(to_disk_err)?;
        let mut read_len = 0;
        while read_len < buf.len() {
            match file.read(&mut buf[read_len..]) {
                Ok(0) => break,
                Ok(len) => read_len += len,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(to_disk_err(e)),
            }
        }
        Ok(read_len)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> DiskResult<usize> {
        if offset >= self.capacity {
            return Err(to_disk_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("offset {} past the end of the image", offset),
            )));
        }
        let len = (self.capacity - offset).min(buf.len() as u64) as usize;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset)).map_err(to_disk_err)?;
        file.write_all(&buf[..len]).map_err(to_disk_err)?;
        Ok(len)
    }

    fn sync(&self) -> DiskResult<()> {
        self.file.lock().sync_all().map_err(to_disk_err)
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }
}

/// Seconds since the Unix epoch, 0 if the host clock is before it.
pub fn now_unix_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Copies host `files` into the directory `parent`, recursing into
/// directories. Anything that is neither a file nor a directory is skipped.
pub fn copy_files(tiny_fs: &TinyFs, files: &[PathBuf], parent: &mut Inode) -> io::Result<()> {
    for file in files {
        let attr = fs::symlink_metadata(file)?;
        let filename = match file.file_name() {
            Some(filename) => filename.to_string_lossy().into_owned(),
            None => {
                warn!("Skipping {}: no file name", file.display());
                continue;
            }
        };

        if attr.is_dir() {
            let mut children = fs::read_dir(file)?
                .map(|entry| entry.map(|entry| entry.path()))
                .collect::<io::Result<Vec<_>>>()?;
            children.sort();

            let inode_id = tiny_fs
                .create_entry(
                    parent,
                    filename.as_bytes(),
                    FileType::Dir,
                    perm(&attr),
                    0,
                    0,
                )
                .map_err(tiny_fs_err_to_stdio_err)?;
            let mut dir = tiny_fs
                .load_inode(inode_id)
                .map_err(tiny_fs_err_to_stdio_err)?;
            copy_files(tiny_fs, &children, &mut dir)?;
        } else if attr.is_file() {
            let inode_id = tiny_fs
                .create_entry(
                    parent,
                    filename.as_bytes(),
                    FileType::RegFile,
                    perm(&attr),
                    0,
                    0,
                )
                .map_err(tiny_fs_err_to_stdio_err)?;
            let mut file_inode = tiny_fs
                .load_inode(inode_id)
                .map_err(tiny_fs_err_to_stdio_err)?;
            tiny_fs
                .write_at(&mut file_inode, 0, &fs::read(file)?)
                .map_err(tiny_fs_err_to_stdio_err)?;
        } else {
            warn!(
                "Skipping {}: not a regular file or directory",
                file.display()
            );
            continue;
        }
        debug!("Copied {}", file.display());
    }
    Ok(())
}

fn perm(metadata: &Metadata) -> Mode {
    let perm_usr = if metadata.permissions().readonly() {
        Mode::PERM_RX_USR
    } else {
        Mode::PERM_RWX_USR
    };
    perm_usr | Mode::PERM_RX_GRP | Mode::PERM_RX_OTH
}

pub fn tiny_fs_err_to_stdio_err(tfe: tiny_fs::Error) -> io::Error {
    match tfe {
        tiny_fs::Error::NotFound => io::ErrorKind::NotFound.into(),
        tiny_fs::Error::AlreadyExists => io::ErrorKind::AlreadyExists.into(),
        tiny_fs::Error::DiskError(e) => match e.downcast::<io::Error>() {
            Ok(e) => *e,
            Err(_) => io::ErrorKind::Other.into(),
        },
        e => io::Error::new(io::ErrorKind::Other, format!("{:?}", e)),
    }
}

#[cfg(test)]
mod test {
    use super::{copy_files, FileDisk, TinyFs};
    use std::{fs, path::PathBuf, process};
    use tiny_fs::{Disk, FormatOptions, Path};

    fn clock() -> u32 {
        1_600_000_000
    }

    /// A fresh scratch directory for one test.
    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mkfs-tiny-{}-{}", process::id(), name));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_file_disk() {
        let dir = scratch_dir("file_disk");
        let image = dir.join("disk.img");
        assert!(FileDisk::open(&image).unwrap().is_none());

        let disk = FileDisk::create(&image, 4096).unwrap();
        assert_eq!(disk.capacity(), 4096);
        assert_eq!(disk.write_at(4090, b"0123456789").unwrap(), 6);
        assert!(disk.write_at(4096, b"x").is_err());
        assert!(FileDisk::create(&image, 4096).is_err());
        drop(disk);

        let disk = FileDisk::open(&image).unwrap().unwrap();
        let mut buf = [0xff; 10];
        assert_eq!(disk.read_at(4090, &mut buf).unwrap(), 6);
        assert_eq!(&buf[..6], b"012345");
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_format_and_copy() {
        let dir = scratch_dir("copy");
        let host = dir.join("host");
        fs::create_dir_all(host.join("etc")).unwrap();
        fs::write(host.join("etc").join("hosts"), b"127.0.0.1 localhost\n").unwrap();
        fs::write(host.join("init"), b"#!/bin/sh\n").unwrap();

        let image = dir.join("disk.img");
        let capacity = 1 << 20;
        let opts = FormatOptions::fit(4096, 64, capacity).unwrap();
        let disk = FileDisk::create(&image, capacity).unwrap();
        let tiny_fs = TinyFs::format(disk, opts, clock).unwrap();
        let mut root = tiny_fs.root().unwrap();
        copy_files(
            &tiny_fs,
            &[host.join("etc"), host.join("init")],
            &mut root,
        )
        .unwrap();
        drop(tiny_fs);

        let disk = FileDisk::open(&image).unwrap().unwrap();
        let tiny_fs = TinyFs::open(disk, clock).unwrap();
        let mut hosts = tiny_fs.resolve(Path::new("/etc/hosts")).unwrap();
        let mut buf = vec![0; hosts.byte_size() as usize];
        tiny_fs.read_at(&mut hosts, 0, &mut buf).unwrap();
        assert_eq!(buf, b"127.0.0.1 localhost\n");
        assert!(tiny_fs.resolve(Path::new("/etc")).unwrap().is_dir());
        assert_eq!(tiny_fs.resolve(Path::new("/init")).unwrap().byte_size(), 10);
        fs::remove_dir_all(&dir).unwrap();
    }
}
