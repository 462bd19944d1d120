use std::fs;
use std::io::{Read, Write};
use std::sync::Arc;

use layerfs_core::{
    Backend, BackendExt, FeatureFlags, FileType, FsErrorKind, MemBackend, MmioMode, MountEntry,
    OpenMode, Stat, Vfs,
};
use layerfs_host::{HostBackend, HostConfig};
use layerfs_io::StreamConfig;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn fixture() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("data/levels")).unwrap();
    fs::write(temp.path().join("data/levels/1.map"), b"level one").unwrap();
    fs::write(temp.path().join("data/readme.txt"), b"hello").unwrap();
    fs::write(temp.path().join("empty.bin"), b"").unwrap();
    temp
}

fn host(temp: &TempDir) -> HostBackend {
    HostBackend::new(HostConfig::new(temp.path())).unwrap()
}

#[test_log::test]
fn stat_and_sorted_listing() {
    let temp = fixture();
    let backend = host(&temp);

    assert_eq!(backend.stat("/data/readme.txt").unwrap(), Stat::file(5));
    assert!(backend.stat("data").unwrap().is_dir());
    assert!(backend.stat("/").unwrap().is_dir());
    assert_eq!(
        backend.stat("/data/missing").unwrap_err().kind(),
        FsErrorKind::NotFound
    );
    assert_eq!(
        backend.read_dir("/data").unwrap(),
        vec![
            ("levels".to_owned(), FileType::Directory),
            ("readme.txt".to_owned(), FileType::File),
        ]
    );
}

#[test_log::test]
fn trailing_separator_on_a_file_is_rejected() {
    let temp = fixture();
    let backend = host(&temp);
    assert_eq!(
        backend.stat("/data/readme.txt/").unwrap_err().kind(),
        FsErrorKind::NotADirectory
    );
    assert!(backend.stat("/data/").unwrap().is_dir());
}

#[test_log::test]
fn escaping_the_root_is_invalid() {
    let temp = fixture();
    let backend = host(&temp);
    assert_eq!(
        backend.stat("/../outside").unwrap_err().kind(),
        FsErrorKind::InvalidPath
    );
}

#[test_log::test]
fn read_through_every_access_path() {
    let temp = fixture();
    let backend = host(&temp);

    assert_eq!(backend.read_file("/data/levels/1.map").unwrap(), b"level one");

    let handle = backend
        .open_handle("/data/levels/1.map", OpenMode::Read, FeatureFlags::empty())
        .unwrap();
    let mut buf = [0u8; 3];
    handle.read_exact_at(6, &mut buf).unwrap();
    assert_eq!(&buf, b"one");

    let mut mmio = backend.open_mmio("/data/readme.txt", MmioMode::Read).unwrap();
    assert_eq!(mmio.file_size(), 5);
    assert_eq!(mmio.remap(0, 5).unwrap(), b"hello");
    mmio.close().unwrap();
}

#[test_log::test]
fn mapped_streams_fall_back_for_empty_files() {
    let temp = fixture();
    let config = HostConfig::new(temp.path())
        .with_mmap_streams(true)
        .with_stream_config(StreamConfig::default().with_mmap_window(64 * 1024));
    let backend = HostBackend::new(config).unwrap();

    assert_eq!(backend.read_file("/data/readme.txt").unwrap(), b"hello");
    assert!(backend.read_file("/empty.bin").unwrap().is_empty());
}

#[test_log::test]
fn writes_go_through_the_vfs() {
    let temp = fixture();
    let vfs = Vfs::new();
    vfs.install_mounts(&[MountEntry::new("/save", Arc::new(host(&temp)), "/data")])
        .unwrap();

    let mut writer = vfs
        .open_stream("/save/readme.txt", OpenMode::Write, FeatureFlags::empty())
        .unwrap()
        .into_writer()
        .unwrap();
    writer.write_all(b"new").unwrap();
    writer.close().unwrap();
    assert_eq!(fs::read(temp.path().join("data/readme.txt")).unwrap(), b"new");

    let mut writer = vfs
        .open_stream("/save/readme.txt", OpenMode::Append, FeatureFlags::empty())
        .unwrap()
        .into_writer()
        .unwrap();
    writer.write_all(b"er").unwrap();
    writer.close().unwrap();

    let mut reader = vfs
        .open_stream("/save/readme.txt", OpenMode::Read, FeatureFlags::SEQUENTIAL)
        .unwrap()
        .into_reader()
        .unwrap();
    let mut text = String::new();
    reader.read_to_string(&mut text).unwrap();
    assert_eq!(text, "newer");
}

#[test_log::test]
fn read_only_hosts_refuse_writes() {
    let temp = fixture();
    let backend =
        HostBackend::new(HostConfig::new(temp.path()).with_read_only(true)).unwrap();

    for mode in [OpenMode::Write, OpenMode::Append, OpenMode::ReadWrite] {
        let err = backend
            .open_stream("/data/readme.txt", mode, FeatureFlags::empty())
            .unwrap_err();
        assert_eq!(err.kind(), FsErrorKind::Unsupported);
    }
    assert_eq!(
        backend
            .open_mmio("/data/readme.txt", MmioMode::ReadWrite)
            .unwrap_err()
            .kind(),
        FsErrorKind::Unsupported
    );
    assert_eq!(fs::read(temp.path().join("data/readme.txt")).unwrap(), b"hello");
}

#[test_log::test]
fn memory_overlay_shadows_host_files() {
    let temp = fixture();
    let mut patch = MemBackend::new();
    patch.insert("/data/readme.txt", &b"patched"[..]).unwrap();

    let vfs = Vfs::new();
    vfs.install_mounts(&[
        MountEntry::root("/", Arc::new(host(&temp))),
        MountEntry::root("/", Arc::new(patch)),
    ])
    .unwrap();

    assert_eq!(vfs.read_file("/data/readme.txt").unwrap(), b"patched");
    assert_eq!(vfs.read_file("/data/levels/1.map").unwrap(), b"level one");

    let mut names: Vec<_> = vfs.read_dir("/").unwrap();
    names.sort();
    assert_eq!(
        names,
        vec![
            ("data".to_owned(), FileType::Directory),
            ("empty.bin".to_owned(), FileType::File),
        ]
    );
}
