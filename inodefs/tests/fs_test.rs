use inodefs::io::{BlockStorage, FileBlockEmulator, FileBlockEmulatorBuilder};
use inodefs::{FileSystem, FsError, BLOCK_SIZE};
use tempfile::NamedTempFile;

fn new_device(disk: &NamedTempFile, blocks: usize) -> FileBlockEmulator {
    FileBlockEmulatorBuilder::from(disk.reopen().unwrap())
        .with_block_count(blocks)
        .build()
        .unwrap()
}

fn reopen_device(disk: &NamedTempFile, blocks: usize) -> FileBlockEmulator {
    FileBlockEmulator::open(disk.path(), blocks).unwrap()
}

#[test]
fn ten_block_volume_walkthrough() {
    let disk = NamedTempFile::new().unwrap();
    let mut dev = new_device(&disk, 10);

    let sb = FileSystem::format(&mut dev).unwrap();
    assert_eq!(sb.inode_blocks, 1);
    assert_eq!(sb.total_inodes, 128);

    let mut fs = FileSystem::mount(dev).unwrap();
    assert_eq!(fs.create().unwrap(), 1);
    assert_eq!(fs.write(1, &[b'A'; 4096], 0).unwrap(), 4096);

    let mut buf = vec![0; 4096];
    assert_eq!(fs.read(1, &mut buf, 0).unwrap(), 4096);
    assert!(buf.iter().all(|&b| b == b'A'));
    assert_eq!(fs.getsize(1).unwrap(), 4096);

    fs.delete(1).unwrap();
    assert_eq!(fs.create().unwrap(), 1);
    assert_eq!(fs.getsize(1).unwrap(), 0);
}

#[test]
fn files_survive_remount() {
    let disk = NamedTempFile::new().unwrap();
    let mut dev = new_device(&disk, 40);
    FileSystem::format(&mut dev).unwrap();

    let mut fs = FileSystem::mount(dev).unwrap();
    let small = fs.create().unwrap();
    let large = fs.create().unwrap();
    let small_data = b"a short file".to_vec();
    let large_data: Vec<u8> = (0..8 * BLOCK_SIZE + 123).map(|i| (i * 7) as u8).collect();
    fs.write(small, &small_data, 0).unwrap();
    fs.write(large, &large_data, 0).unwrap();
    let free_before = fs.free_map().free_count();
    fs.unmount().unwrap();

    let mut fs = FileSystem::mount(reopen_device(&disk, 40)).unwrap();
    assert_eq!(fs.free_map().free_count(), free_before);

    let mut buf = vec![0; large_data.len()];
    assert_eq!(fs.read(large, &mut buf, 0).unwrap(), large_data.len());
    assert_eq!(buf, large_data);
    let mut buf = vec![0; 64];
    let n = fs.read(small, &mut buf, 0).unwrap();
    assert_eq!(buf[..n].to_vec(), small_data);
}

#[test]
fn rebuilt_free_map_matches_allocations() {
    let disk = NamedTempFile::new().unwrap();
    let mut dev = new_device(&disk, 30);
    FileSystem::format(&mut dev).unwrap();
    let mut fs = FileSystem::mount(dev).unwrap();

    let a = fs.create().unwrap();
    let b = fs.create().unwrap();
    fs.write(a, &vec![1; 7 * BLOCK_SIZE], 0).unwrap();
    fs.write(b, &vec![2; 2 * BLOCK_SIZE], 0).unwrap();
    fs.delete(a).unwrap();
    fs.write(b, &vec![3; 3 * BLOCK_SIZE], 2 * BLOCK_SIZE).unwrap();

    let live: Vec<bool> = (0..30).map(|blk| fs.free_map().is_free(blk)).collect();
    let dev = fs.unmount().unwrap();
    let fs = FileSystem::mount(dev).unwrap();
    let rebuilt: Vec<bool> = (0..30).map(|blk| fs.free_map().is_free(blk)).collect();

    assert_eq!(live, rebuilt);
}

#[test]
fn writes_and_reads_agree_with_a_model() {
    let disk = NamedTempFile::new().unwrap();
    let mut dev = new_device(&disk, 128);
    FileSystem::format(&mut dev).unwrap();
    let mut fs = FileSystem::mount(dev).unwrap();
    let inumber = fs.create().unwrap();

    let mut model: Vec<u8> = Vec::new();
    let mut seed: u32 = 0x1234_5678;
    let mut next = move || {
        seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (seed >> 8) as usize
    };

    for round in 0..40 {
        let offset = if model.is_empty() { 0 } else { next() % (model.len() + 1) };
        let len = 1 + next() % (2 * BLOCK_SIZE);
        let data: Vec<u8> = (0..len).map(|i| (i + round) as u8).collect();

        assert_eq!(fs.write(inumber, &data, offset).unwrap(), len);
        let end = offset + len;
        if end > model.len() {
            model.resize(end, 0);
        }
        model[offset..end].copy_from_slice(&data);
        assert_eq!(fs.getsize(inumber).unwrap() as usize, model.len());

        let read_at = next() % model.len();
        let mut buf = vec![0; 1 + next() % (3 * BLOCK_SIZE)];
        let n = fs.read(inumber, &mut buf, read_at).unwrap();
        let expect_n = buf.len().min(model.len() - read_at);
        assert_eq!(n, expect_n);
        assert_eq!(buf[..n].to_vec(), model[read_at..read_at + n].to_vec());
    }
}

#[test]
fn debug_reports_indirect_blocks() {
    let disk = NamedTempFile::new().unwrap();
    let mut dev = new_device(&disk, 20);
    FileSystem::format(&mut dev).unwrap();
    let mut fs = FileSystem::mount(dev).unwrap();
    let inumber = fs.create().unwrap();
    fs.write(inumber, &vec![9; 6 * BLOCK_SIZE], 0).unwrap();

    let mut out = Vec::new();
    fs.debug(&mut out).unwrap();
    let out = String::from_utf8(out).unwrap();

    assert!(out.contains("inode 1:\n    size: 24576 bytes\n"));
    assert!(out.contains("    direct blocks: 3 4 5 6 7\n"));
    assert!(out.contains("    indirect block: 8\n"));
    assert!(out.contains("    indirect data blocks: 9\n"));
}

#[test]
fn mount_fails_on_foreign_data() {
    let disk = NamedTempFile::new().unwrap();
    let mut dev = new_device(&disk, 10);
    dev.write_block(0, &[0xab; BLOCK_SIZE]).unwrap();

    match FileSystem::mount(dev) {
        Err(FsError::BadMagic(magic)) => assert_eq!(magic, 0xabab_abab),
        Err(err) => panic!("unexpected error {:?}", err),
        Ok(_) => panic!("mounted a foreign volume"),
    }
}

#[test]
fn borrowed_device_can_be_mounted() {
    let disk = NamedTempFile::new().unwrap();
    let mut dev = new_device(&disk, 10);
    FileSystem::format(&mut dev).unwrap();

    {
        let mut fs = FileSystem::mount(&mut dev).unwrap();
        let inumber = fs.create().unwrap();
        fs.write(inumber, b"borrowed", 0).unwrap();
    }

    assert!(dev.writes() > 0);
    let mut fs = FileSystem::mount(dev).unwrap();
    assert_eq!(fs.getsize(1).unwrap(), 8);
}
