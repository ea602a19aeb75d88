use std::path::PathBuf;

use clap::Parser;

/// Interactive shell over an inodefs disk image.
#[derive(Parser, Debug, PartialEq)]
#[command(author, version, about, long_about = None)]
pub struct ShellArgs {
    /// the disk image; created if it does not exist
    pub image: PathBuf,
    /// the number of 4 KiB blocks in the image
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub blocks: u32,
    /// zero the whole image before starting, even if it already exists
    #[arg(short, long)]
    pub fresh: bool,
}
