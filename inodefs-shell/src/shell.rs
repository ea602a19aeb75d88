use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use inodefs::io::FileBlockEmulator;
use inodefs::FileSystem;
use log::warn;

/// File data moves between the host and the volume in chunks of this size.
const CHUNK_SIZE: usize = 16384;

const HELP: &str = "\
Commands are:
    format
    mount
    unmount
    debug
    create
    delete  <inode>
    getsize <inode>
    cat     <inode>
    copyin  <file> <inode>
    copyout <inode> <file>
    help
    quit
    exit";

#[derive(Debug, PartialEq)]
pub enum Command {
    Format,
    Mount,
    Unmount,
    Debug,
    Create,
    Delete(u32),
    GetSize(u32),
    Cat(u32),
    CopyIn { path: PathBuf, inumber: u32 },
    CopyOut { inumber: u32, path: PathBuf },
    Help,
    Quit,
}

fn inumber(arg: &str) -> anyhow::Result<u32> {
    arg.parse()
        .with_context(|| format!("`{}` is not an inode number", arg))
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let command = match words.as_slice() {
            ["format"] => Command::Format,
            ["mount"] => Command::Mount,
            ["unmount"] => Command::Unmount,
            ["debug"] => Command::Debug,
            ["create"] => Command::Create,
            ["delete", n] => Command::Delete(inumber(n)?),
            ["getsize", n] => Command::GetSize(inumber(n)?),
            ["cat", n] => Command::Cat(inumber(n)?),
            ["copyin", path, n] => Command::CopyIn {
                path: PathBuf::from(path),
                inumber: inumber(n)?,
            },
            ["copyout", n, path] => Command::CopyOut {
                inumber: inumber(n)?,
                path: PathBuf::from(path),
            },
            ["help"] => Command::Help,
            ["quit"] | ["exit"] => Command::Quit,
            [name, ..] => {
                return Err(anyhow!(
                    "unknown command or wrong arguments: {}\ntype 'help' for a list of commands.",
                    name
                ))
            }
            [] => return Err(anyhow!("empty command")),
        };
        Ok(command)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Flow {
    Continue,
    Quit,
}

enum Volume {
    Unmounted(FileBlockEmulator),
    Mounted(FileSystem<FileBlockEmulator>),
}

/// Runs commands against one disk image, reporting results the way the
/// classic simplefs shell does.
pub struct Shell<W: Write> {
    volume: Option<Volume>,
    out: W,
}

impl<W: Write> Shell<W> {
    pub fn new(dev: FileBlockEmulator, out: W) -> Self {
        Self {
            volume: Some(Volume::Unmounted(dev)),
            out,
        }
    }

    pub fn prompt(&mut self) -> anyhow::Result<()> {
        write!(self.out, " inodefs> ")?;
        self.out.flush()?;
        Ok(())
    }

    pub fn say(&mut self, message: fmt::Arguments) -> anyhow::Result<()> {
        writeln!(self.out, "{}", message)?;
        Ok(())
    }

    /// Unmounts if needed and hands the device back.
    pub fn close(mut self) -> anyhow::Result<FileBlockEmulator> {
        match self.volume.take() {
            Some(Volume::Unmounted(dev)) => Ok(dev),
            Some(Volume::Mounted(fs)) => Ok(fs.unmount()?),
            None => Err(anyhow!("block device was lost")),
        }
    }

    pub fn execute(&mut self, command: Command) -> anyhow::Result<Flow> {
        match command {
            Command::Format => self.format()?,
            Command::Mount => self.mount()?,
            Command::Unmount => self.unmount()?,
            Command::Debug => self.debug()?,
            Command::Create => match self.mounted().map(|fs| fs.create()) {
                Some(Ok(inumber)) => self.say(format_args!("created inode {}", inumber))?,
                _ => self.say(format_args!("create failed!"))?,
            },
            Command::Delete(inumber) => match self.mounted().map(|fs| fs.delete(inumber)) {
                Some(Ok(())) => self.say(format_args!("inode {} deleted.", inumber))?,
                _ => self.say(format_args!("delete failed!"))?,
            },
            Command::GetSize(inumber) => match self.mounted().map(|fs| fs.getsize(inumber)) {
                Some(Ok(size)) => {
                    self.say(format_args!("inode {} has size {}", inumber, size))?
                }
                _ => self.say(format_args!("getsize failed!"))?,
            },
            Command::Cat(inumber) => {
                let mut data = Vec::new();
                let copied = self.copy_out(inumber, &mut data)?;
                self.out.write_all(&data)?;
                self.say(format_args!("{} bytes copied", copied))?;
            }
            Command::CopyIn { path, inumber } => self.copyin(path, inumber)?,
            Command::CopyOut { inumber, path } => {
                let mut file = match File::create(&path) {
                    Ok(file) => file,
                    Err(err) => {
                        self.say(format_args!("couldn't open {}: {}", path.display(), err))?;
                        self.say(format_args!("copy failed!"))?;
                        return Ok(Flow::Continue);
                    }
                };
                let copied = self.copy_out(inumber, &mut file)?;
                self.say(format_args!("{} bytes copied", copied))?;
                self.say(format_args!(
                    "copied inode {} to file {}",
                    inumber,
                    path.display()
                ))?;
            }
            Command::Help => self.say(format_args!("{}", HELP))?,
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    fn mounted(&mut self) -> Option<&mut FileSystem<FileBlockEmulator>> {
        match self.volume.as_mut() {
            Some(Volume::Mounted(fs)) => Some(fs),
            _ => None,
        }
    }

    fn format(&mut self) -> anyhow::Result<()> {
        let result = match self.volume.as_mut() {
            Some(Volume::Unmounted(dev)) => Some(FileSystem::format(dev)),
            _ => None,
        };
        match result {
            Some(Ok(_)) => self.say(format_args!("disk formatted.")),
            Some(Err(err)) => {
                warn!("format: {}", err);
                self.say(format_args!("format failed!"))
            }
            None => self.say(format_args!("format failed!")),
        }
    }

    /// Mounting an already mounted volume rebuilds its free block map.
    fn mount(&mut self) -> anyhow::Result<()> {
        let mut dev = match self.volume.take() {
            Some(Volume::Unmounted(dev)) => dev,
            Some(Volume::Mounted(fs)) => fs.unmount()?,
            None => return Err(anyhow!("block device was lost")),
        };
        if let Err(err) = FileSystem::probe(&mut dev) {
            warn!("mount: {}", err);
            self.volume = Some(Volume::Unmounted(dev));
            return self.say(format_args!("mount failed!"));
        }
        let fs = FileSystem::mount(dev)?;
        self.volume = Some(Volume::Mounted(fs));
        self.say(format_args!("disk mounted."))
    }

    fn unmount(&mut self) -> anyhow::Result<()> {
        match self.volume.take() {
            Some(Volume::Mounted(fs)) => {
                self.volume = Some(Volume::Unmounted(fs.unmount()?));
                self.say(format_args!("disk unmounted."))
            }
            other => {
                self.volume = other;
                self.say(format_args!("unmount failed!"))
            }
        }
    }

    fn debug(&mut self) -> anyhow::Result<()> {
        let mut dump = Vec::new();
        match self.volume.as_mut() {
            Some(Volume::Unmounted(dev)) => FileSystem::dump(dev, &mut dump)?,
            Some(Volume::Mounted(fs)) => fs.debug(&mut dump)?,
            None => return Err(anyhow!("block device was lost")),
        }
        self.out.write_all(&dump)?;
        Ok(())
    }

    fn copyin(&mut self, path: PathBuf, inumber: u32) -> anyhow::Result<()> {
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(err) => {
                self.say(format_args!("couldn't open {}: {}", path.display(), err))?;
                return self.say(format_args!("copy failed!"));
            }
        };
        let fs = match self.mounted() {
            Some(fs) => fs,
            None => return self.say(format_args!("copy failed!")),
        };

        let mut buf = vec![0; CHUNK_SIZE];
        let mut offset = 0;
        let mut warning = None;
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            let written = fs.write(inumber, &buf[..n], offset).unwrap_or(0);
            offset += written;
            if written != n {
                warning = Some((written, n));
                break;
            }
        }

        if let Some((written, wanted)) = warning {
            self.say(format_args!(
                "WARNING: fs_write only wrote {} bytes, not {} bytes",
                written, wanted
            ))?;
        }
        self.say(format_args!("{} bytes copied", offset))?;
        self.say(format_args!(
            "copied file {} to inode {}",
            path.display(),
            inumber
        ))
    }

    /// Streams the whole file into `sink`, returning the byte count. Anything
    /// that stops the read early just ends the copy.
    fn copy_out<S: Write>(&mut self, inumber: u32, sink: &mut S) -> anyhow::Result<usize> {
        let fs = match self.mounted() {
            Some(fs) => fs,
            None => return Ok(0),
        };
        let mut buf = vec![0; CHUNK_SIZE];
        let mut offset = 0;
        loop {
            let n = fs.read(inumber, &mut buf, offset).unwrap_or(0);
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n])?;
            offset += n;
        }
        Ok(offset)
    }
}
