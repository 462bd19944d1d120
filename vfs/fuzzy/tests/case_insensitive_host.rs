use std::fs;
use std::sync::Arc;

use layerfs_core::{Backend, BackendExt, FsErrorKind, MemBackend, MountEntry, Vfs};
use layerfs_fuzzy::FuzzyBackend;
use layerfs_host::{HostBackend, HostConfig};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn game_dir() -> TempDir {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("Config/Profiles")).unwrap();
    fs::write(temp.path().join("Config/App.ini"), b"volume=7").unwrap();
    fs::write(temp.path().join("Config/Profiles/Default.json"), b"{}").unwrap();
    temp
}

fn fuzzy_host(temp: &TempDir) -> FuzzyBackend {
    let host = HostBackend::new(HostConfig::new(temp.path())).unwrap();
    FuzzyBackend::case_insensitive(Arc::new(host))
}

#[test_log::test]
fn resolves_the_on_disk_spelling() {
    let temp = game_dir();
    let fuzzy = fuzzy_host(&temp);

    assert_eq!(fuzzy.fix_path("/config/app.ini").unwrap(), "/Config/App.ini");
    assert_eq!(fuzzy.read_file("/config/app.ini").unwrap(), b"volume=7");
    assert_eq!(
        fuzzy.read_file("config/PROFILES/default.JSON").unwrap(),
        b"{}"
    );
    assert!(fuzzy.exists("/CONFIG/profiles").unwrap());
    assert!(!fuzzy.exists("/config/missing.ini").unwrap());
}

#[test_log::test]
fn trailing_separator_after_a_file_never_resolves() {
    let temp = game_dir();
    let fuzzy = fuzzy_host(&temp);
    assert_eq!(
        fuzzy.fix_path("/config/app.ini/").unwrap_err().kind(),
        FsErrorKind::NotADirectory
    );
}

#[test_log::test]
fn mounted_under_a_vfs() {
    let temp = game_dir();
    let patch = MemBackend::new()
        .with_file("/Config/App.ini", &b"volume=3"[..])
        .unwrap();

    let vfs = Vfs::new();
    vfs.install_mounts(&[
        MountEntry::root("/game", Arc::new(fuzzy_host(&temp))),
        MountEntry::root("/game", Arc::new(patch)),
    ])
    .unwrap();

    // The exact spelling hits the overlay first.
    assert_eq!(vfs.read_file("/game/Config/App.ini").unwrap(), b"volume=3");
    // Only the fuzzy layer can resolve a miscased path.
    assert_eq!(vfs.read_file("/game/config/app.ini").unwrap(), b"volume=7");
    assert!(vfs.stat("/game/config/profiles").unwrap().is_dir());
}
