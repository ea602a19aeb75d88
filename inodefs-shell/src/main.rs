use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};

use clap::Parser;
use inodefs::io::{FileBlockEmulator, FileBlockEmulatorBuilder};
use log::info;

mod cli;
mod shell;

use cli::ShellArgs;
use shell::{Command, Flow, Shell};

/// Opens the image named on the command line and runs shell commands read
/// from stdin until `quit` or end of input.
fn main() -> anyhow::Result<()> {
    env_logger::builder().format_timestamp_nanos().init();
    let args = ShellArgs::parse();
    let blocks = args.blocks as usize;

    let existed = args.image.exists();
    let dev = if existed && !args.fresh {
        FileBlockEmulator::open(&args.image, blocks)?
    } else {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&args.image)?;
        FileBlockEmulatorBuilder::from(file)
            .with_block_count(blocks)
            .build()?
    };
    info!(
        "opened {} with {} blocks (existing image: {})",
        args.image.display(),
        blocks,
        existed
    );

    let stdout = io::stdout();
    let mut shell = Shell::new(dev, stdout.lock());
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        shell.prompt()?;
        let line = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                if shell.execute(command)? == Flow::Quit {
                    break;
                }
            }
            Err(err) => shell.say(format_args!("{}", err))?,
        }
    }

    let dev = shell.close()?;
    let mut stdout = io::stdout();
    writeln!(stdout, "{} disk block reads", dev.reads())?;
    writeln!(stdout, "{} disk block writes", dev.writes())?;
    Ok(())
}
