use std::fs;
use ttyharness::tftp::MountTable;

#[test]
fn test_traversal_outside_mount_is_denied() {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("images");
    fs::create_dir_all(images.join("boards")).unwrap();
    fs::write(images.join("boards/u-boot.bin"), b"uboot").unwrap();
    fs::write(dir.path().join("private.key"), b"secret").unwrap();

    let table = MountTable::new(&[(
        images.to_string_lossy().into_owned(),
        "/firmware".to_string(),
    )]);

    assert!(table.resolve("/firmware/boards/u-boot.bin").is_some());
    // Matches the `/firmware` prefix textually, resolves to a real file
    // outside the mount.
    assert!(table.resolve("/firmware/boards/../../private.key").is_none());
    assert!(table.resolve("firmware/../private.key").is_none());
}
