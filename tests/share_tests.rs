//! End-to-end share image tests
//!
//! Build real images in a temp directory and read them back through the
//! public API: partition table, FAT type, mount offset.

use std::fs;

use rsync_share::disk_image::{
    execute_plan, get_first_partition_offset, inspect_share, FatKind, PARTITION_ALIGNMENT_LBA,
    SECTOR_SIZE,
};
use rsync_share::engine::share::calculate_share_plan;
use rsync_share::error::ShareError;
use rsync_share::settings::Settings;
use rsync_share::setup::{run_setup, SetupRequest, ShareRequest};
use tempfile::TempDir;

fn settings_in(home: &TempDir) -> Settings {
    Settings::for_home("alice", home.path())
}

#[test]
fn test_ten_megabyte_share() {
    let home = TempDir::new().unwrap();
    let settings = settings_in(&home);
    let plan = calculate_share_plan("photos", "10M", &settings, false).unwrap();

    let info = execute_plan(&plan).unwrap();

    assert_eq!(fs::metadata(&plan.image_path).unwrap().len(), 10 * 1024 * 1024);
    assert_eq!(info.size_bytes, 10 * 1024 * 1024);
    assert_eq!(info.partitions.len(), 1);
    assert_eq!(info.fat, FatKind::Fat16);
    assert_eq!(info.label, "PHOTOS");

    let partition = info.first_partition().unwrap();
    assert_eq!(u64::from(partition.starting_lba), PARTITION_ALIGNMENT_LBA);
    assert_eq!(partition.system_id, 0x06);
    assert_eq!(partition.offset() + partition.size_bytes(), info.size_bytes);
}

#[test]
fn test_offset_matches_partition_table() {
    let home = TempDir::new().unwrap();
    let plan = calculate_share_plan("music", "4M", &settings_in(&home), false).unwrap();
    let info = execute_plan(&plan).unwrap();

    let offset = get_first_partition_offset(&plan.image_path).unwrap();
    assert_eq!(offset, PARTITION_ALIGNMENT_LBA * SECTOR_SIZE);
    assert_eq!(Some(offset), info.first_partition_offset());
}

#[test]
fn test_small_share_picks_fat12() {
    let home = TempDir::new().unwrap();
    let plan = calculate_share_plan("small", "4M", &settings_in(&home), false).unwrap();
    let info = execute_plan(&plan).unwrap();

    assert_eq!(info.fat, FatKind::Fat12);
    assert_eq!(info.first_partition().unwrap().system_id, 0x01);
}

#[test]
fn test_existing_image_needs_force() {
    let home = TempDir::new().unwrap();
    let settings = settings_in(&home);

    let plan = calculate_share_plan("photos", "4M", &settings, false).unwrap();
    execute_plan(&plan).unwrap();

    let err = execute_plan(&plan).unwrap_err();
    assert!(matches!(err, ShareError::Config(_)));

    let forced = calculate_share_plan("photos", "8M", &settings, true).unwrap();
    let info = execute_plan(&forced).unwrap();
    assert_eq!(info.size_bytes, 8 * 1024 * 1024);
}

#[test]
fn test_inspect_non_image_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blank");
    fs::write(&path, vec![0u8; 4096]).unwrap();

    assert!(inspect_share(&path).is_err());
    assert!(get_first_partition_offset(&path).is_err());
}

#[test]
fn test_run_setup_creates_share_and_mount_command() {
    let home = TempDir::new().unwrap();
    let settings = settings_in(&home);
    let request = SetupRequest {
        share: Some(ShareRequest {
            name: "photos".to_string(),
            size: Some("10M".to_string()),
        }),
        ..Default::default()
    };

    let report = run_setup(&request, &settings).unwrap();
    let share = report.share.expect("share created");

    assert_eq!(share.requested_size, "10M");
    assert_eq!(share.offset, 1024 * 1024);
    assert!(share.mount_command.starts_with("sudo mount -o offset=1048576,"));
    assert!(share
        .mount_command
        .ends_with(&format!(
            "{} {}",
            settings.image_dir_path().join("photos").display(),
            settings.public_dir_path().display()
        )));
}

#[test]
fn test_run_setup_uses_default_size() {
    let home = TempDir::new().unwrap();
    let settings = settings_in(&home);
    let request = SetupRequest {
        share: Some(ShareRequest {
            name: "docs".to_string(),
            size: None,
        }),
        ..Default::default()
    };

    let report = run_setup(&request, &settings).unwrap();
    assert_eq!(report.share.unwrap().info.size_bytes, 10 * 1024 * 1024);
}
