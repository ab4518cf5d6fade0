mod common;

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use common::{compressible, content, load, Cooker};
use pretty_assertions::assert_eq;
use sar_package::{OpenMode, VirtualFile};

fn obfuscated_package() -> Vec<u8> {
    Cooker::new(21)
        .obfuscated()
        .compressed_table()
        .stored("Data\\Stored.bin", &(0..=255u8).cycle().take(1000).collect::<Vec<_>>())
        .compressed("Data\\Packed.txt", &compressible("packed text ", 4000))
        .stored("Data\\Empty.txt", b"")
        .cook()
}

#[test]
fn test_stored_reads_in_chunks() {
    let package = load(obfuscated_package());
    let expected: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

    let mut file = package.open(&content("data/stored.bin"), OpenMode::Read).unwrap();
    assert_eq!(file.size(), 1000);
    assert!(file.can_read());
    assert!(!file.can_write());

    let mut out = Vec::new();
    let mut chunk = [0u8; 37];
    loop {
        let n = file.read(&mut chunk).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    assert_eq!(out, expected);
}

#[test]
fn test_stored_seek() {
    let package = load(obfuscated_package());
    let expected: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let mut file = package.open(&content("Data/Stored.bin"), OpenMode::Read).unwrap();

    let mut buf = [0u8; 10];
    assert_eq!(file.seek(SeekFrom::Start(503)).unwrap(), 503);
    file.read_exact(&mut buf).unwrap();
    assert_eq!(&buf[..], &expected[503..513]);

    assert_eq!(file.seek(SeekFrom::End(-4)).unwrap(), 996);
    assert_eq!(file.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf[..4], &expected[996..]);
    assert_eq!(file.read(&mut buf).unwrap(), 0);

    assert_eq!(file.seek(SeekFrom::Current(-1000)).unwrap(), 0);
    assert!(file.seek(SeekFrom::Start(1001)).is_err());
    assert!(file.seek(SeekFrom::Current(-1)).is_err());

    // A failed seek leaves the position alone.
    file.read_exact(&mut buf[..2]).unwrap();
    assert_eq!(&buf[..2], &expected[..2]);
}

#[test]
fn test_compressed_reads_and_seeks() {
    let package = load(obfuscated_package());
    let expected = compressible("packed text ", 4000);
    let mut file = package.open(&content("data/packed.txt"), OpenMode::Read).unwrap();
    assert_eq!(file.size(), 4000);

    let mut head = [0u8; 12];
    file.read_exact(&mut head).unwrap();
    assert_eq!(&head, b"packed text ");

    file.seek(SeekFrom::Start(3990)).unwrap();
    let mut tail = Vec::new();
    file.read_to_end(&mut tail).unwrap();
    assert_eq!(tail, &expected[3990..]);

    assert!(file.seek(SeekFrom::End(1)).is_err());
    assert_eq!(file.read_all().unwrap(), expected);
}

#[test]
fn test_read_all_ignores_position() {
    let package = load(obfuscated_package());
    let mut file = package.open(&content("data/packed.txt"), OpenMode::Read).unwrap();
    assert_eq!(file.read_all().unwrap(), compressible("packed text ", 4000));

    let mut file = package.open(&content("data/stored.bin"), OpenMode::Read).unwrap();
    file.seek(SeekFrom::Start(900)).unwrap();
    assert_eq!(file.read_all().unwrap().len(), 1000);
}

#[test]
fn test_empty_file() {
    let package = load(obfuscated_package());
    let mut file = package.open(&content("data/empty.txt"), OpenMode::Read).unwrap();
    assert_eq!(file.size(), 0);
    assert!(file.read_all().unwrap().is_empty());
    let mut buf = [0u8; 4];
    assert_eq!(file.read(&mut buf).unwrap(), 0);
}

#[test]
fn test_lz4_package() {
    let bytes = Cooker::new(16)
        .compressed("Scripts\\Main.lua", &compressible("local x = 1\n", 1200))
        .cook();
    let package = load(bytes);
    assert!(package.is_ok(), "{:?}", package.load_error());
    assert_eq!(
        package.read_file(&content("scripts/main.lua")).unwrap(),
        compressible("local x = 1\n", 1200)
    );
}

#[test]
fn test_active_file_count() {
    let package = load(obfuscated_package());
    assert_eq!(package.active_file_count(), 0);

    let a = package.open(&content("data/stored.bin"), OpenMode::Read).unwrap();
    let b = package.open(&content("data/packed.txt"), OpenMode::Read).unwrap();
    assert_eq!(package.active_file_count(), 2);

    drop(a);
    assert_eq!(package.active_file_count(), 1);
    drop(b);
    assert_eq!(package.active_file_count(), 0);
}

#[test]
fn test_open_file_outlives_handle() {
    let package = load(obfuscated_package());
    let mut file = package.open(&content("data/packed.txt"), OpenMode::Read).unwrap();
    drop(package);
    assert_eq!(file.read_all().unwrap(), compressible("packed text ", 4000));
}

#[test]
fn test_concurrent_readers() {
    let package = Arc::new(load(obfuscated_package()));
    let expected_stored: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    let expected_packed = compressible("packed text ", 4000);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let package = Arc::clone(&package);
            let expected_stored = expected_stored.clone();
            let expected_packed = expected_packed.clone();
            std::thread::spawn(move || {
                for _ in 0..20 {
                    let mut stored = package
                        .open(&content("data/stored.bin"), OpenMode::Read)
                        .unwrap();
                    let offset = (i * 97) as u64 % 1000;
                    stored.seek(SeekFrom::Start(offset)).unwrap();
                    let mut rest = Vec::new();
                    stored.read_to_end(&mut rest).unwrap();
                    assert_eq!(rest, &expected_stored[offset as usize..]);

                    let packed = package.read_file(&content("data/packed.txt")).unwrap();
                    assert_eq!(packed, expected_packed);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(package.active_file_count(), 0);
}

#[cfg(feature = "parallel")]
#[test]
fn test_read_files_parallel() {
    let package = load(obfuscated_package());
    let paths = [
        content("data/stored.bin"),
        content("data/packed.txt"),
        content("data/missing.txt"),
    ];

    let results = package.read_files_parallel(&paths);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().len(), 1000);
    assert_eq!(results[1].as_ref().unwrap(), &compressible("packed text ", 4000));
    assert!(results[2].is_err());
}
