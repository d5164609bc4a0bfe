use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build a new image from a host directory
    Pack {
        /// Host directory to copy into the image root
        #[arg(long, short)]
        source: PathBuf,

        /// Image file to create
        #[arg(long, short)]
        out: PathBuf,

        /// Total blocks of the image
        #[arg(long, default_value_t = 16 * 2048)]
        blocks: u32,

        /// Number of on-disk inodes
        #[arg(long, default_value_t = 1024)]
        inodes: u32,
    },

    /// List a directory inside an image
    Ls {
        /// Image file to inspect
        #[arg(long, short)]
        image: PathBuf,

        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a file inside an image
    Cat {
        /// Image file to inspect
        #[arg(long, short)]
        image: PathBuf,

        path: String,
    },
}
