mod cli;

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command};
use kfs::{BLOCK_SIZE, CacheConfig, FileSystem, Geometry};
use kfs_fuse::{BlockFile, ThreadScheduler, to_io};

fn main() -> io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Pack {
            source,
            out,
            blocks,
            inodes,
        } => {
            println!("source={source:?}\nout={out:?}");
            let block_file = Arc::new(BlockFile::new({
                let fd = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&out)?;
                fd.set_len(blocks as u64 * BLOCK_SIZE as u64)?;

                fd
            }));

            let geometry = Geometry {
                total_blocks: blocks,
                inodes,
            };
            let fs = FileSystem::format(
                block_file,
                Arc::new(ThreadScheduler::default()),
                geometry,
                CacheConfig::default(),
            )
            .map_err(to_io)?;

            let files = kfs_fuse::pack(&fs, &source, "/")?;
            println!("{files} files packed");
        }
        Command::Ls { image, path } => {
            let fs = mount(&image)?;
            for entry in kfs_fuse::list(&fs, &path).map_err(to_io)? {
                println!(
                    "{:>4} {:?} {:>2} {:>8} {}",
                    entry.stat.inode, entry.stat.kind, entry.stat.links, entry.stat.size, entry.name
                );
            }
        }
        Command::Cat { image, path } => {
            let fs = mount(&image)?;
            let data = kfs_fuse::cat(&fs, &path).map_err(to_io)?;
            io::stdout().write_all(&data)?;
        }
    }

    Ok(())
}

fn mount(image: &Path) -> io::Result<Arc<FileSystem>> {
    let fd = OpenOptions::new().read(true).write(true).open(image)?;
    FileSystem::mount(
        Arc::new(BlockFile::new(fd)),
        Arc::new(ThreadScheduler::default()),
        CacheConfig::default(),
    )
    .map_err(to_io)
}
