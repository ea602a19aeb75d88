use inodefs::io::FileBlockEmulatorBuilder;
use inodefs::FileSystem;

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempfile()?;
    let mut dev = FileBlockEmulatorBuilder::from(tmp)
        .with_block_count(64)
        .build()?;

    // format a new volume on the device, mount it and store one file
    FileSystem::format(&mut dev)?;
    let mut fs = FileSystem::mount(dev)?;
    let inumber = fs.create()?;
    fs.write(inumber, b"hello, inodefs\n", 0)?;

    let mut buf = vec![0; fs.getsize(inumber)? as usize];
    fs.read(inumber, &mut buf, 0)?;
    print!("{}", String::from_utf8_lossy(&buf));
    fs.debug(&mut std::io::stdout())?;
    Ok(())
}
