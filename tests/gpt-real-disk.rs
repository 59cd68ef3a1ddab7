//! End-to-end tests against a real temp-file-backed device, exercising the
//! Context (L2) and Resize engine (L3) layers together.

use gpt::resize::{self, ResizeConstraints, ResizeOperation};
use gpt::{disk, partition_types, GptConfig};
use std::io::{Seek, SeekFrom, Write};
use tempfile::NamedTempFile;

const MIB: u64 = 1024 * 1024;

fn make_disk_image(mib: u64) -> NamedTempFile {
    let mut f = NamedTempFile::new().expect("failed to create tempfile disk");
    f.as_file_mut().set_len(mib * MIB).unwrap();
    f.as_file_mut().seek(SeekFrom::Start(0)).unwrap();
    f.as_file_mut().flush().unwrap();
    f
}

// A small image with an EFI System slot and a Linux filesystem slot,
// whose names round-trip through `list`.
#[test]
fn s1_basic_load_reports_both_partitions_by_name() {
    let image = make_disk_image(10);

    let mut gdisk = GptConfig::new()
        .writable(true)
        .change_partition_count(true)
        .create(image.path())
        .unwrap();

    gdisk
        .add_partition("EFI System", MIB, partition_types::EFI_SYSTEM, 0, None)
        .unwrap();
    gdisk
        .add_partition("Linux filesystem", 8 * MIB, partition_types::LINUX_FS, 0, None)
        .unwrap();
    gdisk.write_inplace().unwrap();

    let reopened = GptConfig::new().open(image.path()).unwrap();
    let listed = resize::list_partitions(&reopened);
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().any(|p| p.name == "EFI System"));
    assert!(listed.iter().any(|p| p.name == "Linux filesystem"));
}

// Resize, save, then reopen: the new size survives exactly.
#[test]
fn s8_resized_partition_round_trips_through_a_real_file() {
    let image = make_disk_image(50);

    let mut gdisk = GptConfig::new()
        .writable(true)
        .change_partition_count(true)
        .create(image.path())
        .unwrap();

    let root = gdisk
        .add_partition("root", 8 * MIB, partition_types::LINUX_FS, 0, None)
        .unwrap();
    gdisk.write_inplace().unwrap();

    resize::resize_partition(
        &mut gdisk,
        root,
        ResizeOperation::from_megabytes(6),
        ResizeConstraints::default().allow_shrinking(true),
    )
    .unwrap();

    let reopened = GptConfig::new().open(image.path()).unwrap();
    let info = resize::get_partition_info(&reopened, root).unwrap();
    assert_eq!(info.size_sectors, 6 * 2048);
}

// Loading twice without an intervening mutation produces identical
// in-memory state.
#[test]
fn idempotence_of_load() {
    let image = make_disk_image(10);

    let mut gdisk = GptConfig::new()
        .writable(true)
        .change_partition_count(true)
        .create(image.path())
        .unwrap();
    gdisk
        .add_partition("data", 4 * MIB, partition_types::LINUX_FS, 0, None)
        .unwrap();
    gdisk.write_inplace().unwrap();

    let first = GptConfig::new().open(image.path()).unwrap();
    let second = GptConfig::new().open(image.path()).unwrap();

    assert_eq!(first.primary_header(), second.primary_header());
    assert_eq!(first.backup_header(), second.backup_header());
    assert_eq!(first.partitions(), second.partitions());
}

// resize-to-max extends a partition to the last usable LBA, and the
// grown size survives a reload.
#[test]
fn resize_to_max_then_reload_reports_grown_size() {
    let image = make_disk_image(50);

    let mut gdisk = GptConfig::new()
        .writable(true)
        .change_partition_count(true)
        .create(image.path())
        .unwrap();
    let home = gdisk
        .add_partition("home", 8 * MIB, partition_types::LINUX_FS, 0, None)
        .unwrap();
    gdisk.write_inplace().unwrap();

    let before = resize::get_partition_info(&gdisk, home).unwrap().size_sectors;
    resize::resize_to_max(&mut gdisk, home).unwrap();

    let reopened = GptConfig::new().open(image.path()).unwrap();
    let after = resize::get_partition_info(&reopened, home).unwrap().size_sectors;
    assert!(after >= before);
}

#[test]
fn logical_block_size_reported_matches_config() {
    let image = make_disk_image(10);
    let gdisk = GptConfig::new()
        .writable(true)
        .change_partition_count(true)
        .create(image.path())
        .unwrap();
    assert_eq!(*gdisk.logical_block_size(), disk::LogicalBlockSize::Lb512);
}
