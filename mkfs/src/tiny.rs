#[macro_use]
extern crate log;

use std::{path::PathBuf, process};

use clap::Parser;
use mkfs::{copy_files, now_unix_timestamp, tiny_fs_err_to_stdio_err, FileDisk, TinyFs};
use tiny_fs::FormatOptions;

#[derive(Parser, Debug)]
#[clap(version, about = "Create a tiny_fs image or add files to an existing one")]
struct Opts {
    /// Place the output into <FILE>
    #[clap(name = "FILE", short = 'o', long = "output")]
    output: String,
    /// Set disk space (MB), used only when the image is created
    #[clap(long, default_value = "32")]
    disk_space: u64,
    /// Set block size (bytes)
    #[clap(long, default_value = "4096")]
    block_size: u32,
    /// Capacity of the inode table
    #[clap(long, default_value = "1024")]
    inodes: u16,
    /// Copy the initial files to the root of the target filesystem.
    /// init_files_path support glob style pattern.
    #[clap(long)]
    init_files_path: Option<String>,
}

struct TinyOpts {
    output: PathBuf,
    init_files: Vec<PathBuf>,
    disk_space: u64,
    block_size: u32,
    inodes: u16,
}

fn parse_opts() -> Result<TinyOpts, String> {
    let opts: Opts = Opts::parse();
    let disk_space = opts
        .disk_space
        .checked_mul(1024 * 1024)
        .ok_or_else(|| format!("Disk space {}MB is too large", opts.disk_space))?;

    let glob_paths = opts
        .init_files_path
        .map(|p| glob::glob(&p))
        .transpose()
        .map_err(|e| format!("Failed to read glob pattern. {}", e))?;

    let init_files = glob_paths
        .map(|p| p.into_iter().collect::<Result<Vec<_>, _>>())
        .transpose()
        .map_err(|e| format!("Failed to load glob pattern. {:?}", e))?
        .unwrap_or_default();

    Ok(TinyOpts {
        output: PathBuf::from(opts.output),
        init_files,
        disk_space,
        block_size: opts.block_size,
        inodes: opts.inodes,
    })
}

fn open_or_format(tiny_opts: &TinyOpts) -> Result<TinyFs, String> {
    let output = tiny_opts.output.display();
    match FileDisk::open(&tiny_opts.output) {
        Ok(Some(disk)) => {
            info!("Opening existing image {}", output);
            TinyFs::open(disk, now_unix_timestamp)
                .map_err(|e| format!("Failed to open {}. error: {:?}", output, e))
        }
        Ok(None) => {
            let format_opts = FormatOptions::fit(
                tiny_opts.block_size,
                tiny_opts.inodes,
                tiny_opts.disk_space,
            )
            .map_err(|e| format!("Invalid layout. error: {:?}", e))?;
            let disk = FileDisk::create(&tiny_opts.output, tiny_opts.disk_space)
                .map_err(|e| format!("Failed to create {}. error: {:?}", output, e))?;
            info!("Formatting {} with {:?}", output, format_opts);
            TinyFs::format(disk, format_opts, now_unix_timestamp)
                .map_err(|e| format!("Failed to format {}. error: {:?}", output, e))
        }
        Err(e) => Err(format!("Failed to open {}. error: {:?}", output, e)),
    }
}

fn run() -> Result<(), String> {
    let tiny_opts = parse_opts()?;
    let tiny_fs = open_or_format(&tiny_opts)?;

    if !tiny_opts.init_files.is_empty() {
        let mut root = tiny_fs
            .root()
            .map_err(|e| format!("Failed to load root directory. error: {:?}", e))?;
        copy_files(&tiny_fs, &tiny_opts.init_files, &mut root)
            .map_err(|e| format!("Failed to copy file. error: {:?}", e))?;
    }

    tiny_fs
        .sync()
        .map_err(tiny_fs_err_to_stdio_err)
        .map_err(|e| format!("Failed to sync. error: {:?}", e))
}

fn main() {
    env_logger::init();

    if let Err(err) = run() {
        error!("{}", err);
        process::exit(1);
    }
}
