//! Share Planning Engine
//!
//! Translates a share request (name + size string) into an ordered sequence
//! of `ShareOp` operations that `disk_image::execute_plan` carries out.
//!
//! | Step          | Effect |
//! |---------------|--------|
//! | CreateImage   | sparse raw file of the requested size |
//! | AttachDrive   | open the image read-write as a block device stand-in |
//! | PartitionDisk | MBR with one primary partition, 1 MiB aligned |
//! | FormatFs      | FAT on that partition, system id set to the FAT type |
//!
//! Planning is pure: no files are touched, so `--dry-run` can print the
//! plan verbatim.

use std::fmt;
use std::path::PathBuf;

use strum::{Display, EnumString};

use crate::disk_image::SECTOR_SIZE;
use crate::error::{Result, ShareError};
use crate::settings::Settings;
use crate::size::{ByteSize, parse_size};

/// Smallest share: 1 MiB alignment gap plus a 1 MiB FAT volume.
pub const MIN_SHARE_SIZE: ByteSize = ByteSize::mib(2);

/// Largest share an MBR can describe with 512-byte sectors.
pub const MAX_SHARE_SIZE: ByteSize = ByteSize::from_bytes(u32::MAX as u64 * SECTOR_SIZE);

const MAX_NAME_LEN: usize = 64;

/// Partition table written into the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum PartitionTable {
    Mbr,
}

/// Filesystem written into the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ShareFilesystem {
    Fat,
}

/// A single step of share creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareOp {
    /// Create a raw image file of exactly `size` bytes
    CreateImage { path: PathBuf, size: ByteSize },

    /// Open the image for partitioning and formatting
    AttachDrive { path: PathBuf },

    /// Write a partition table holding one partition that spans the disk
    PartitionDisk { table: PartitionTable },

    /// Format partition `partition` (1-based)
    FormatFs {
        partition: usize,
        filesystem: ShareFilesystem,
        label: String,
    },
}

impl fmt::Display for ShareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateImage { path, size } => {
                write!(f, "CreateImage({}, size={})", path.display(), size)
            }
            Self::AttachDrive { path } => write!(f, "AttachDrive({}, format=raw)", path.display()),
            Self::PartitionDisk { table } => write!(f, "PartitionDisk(table={})", table),
            Self::FormatFs { partition, filesystem, label } => {
                write!(f, "FormatFs(partition={}, fs={}, label={})", partition, filesystem, label)
            }
        }
    }
}

/// A complete share plan: an ordered list of operations.
#[derive(Debug, Clone)]
pub struct SharePlan {
    pub name: String,
    pub image_path: PathBuf,
    /// Image size, rounded up to whole sectors
    pub size: ByteSize,
    pub ops: Vec<ShareOp>,
    /// Replace an existing image at `image_path`
    pub force: bool,
}

impl SharePlan {
    /// Returns a summary of the plan for logging/display.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Share Plan: {}", self.name),
            format!("  Image: {}", self.image_path.display()),
            format!("  Size: {} ({} bytes)", self.size, self.size.bytes()),
            format!("  Overwrite existing: {}", self.force),
            format!("  Operations ({}):", self.ops.len()),
        ];
        for (i, op) in self.ops.iter().enumerate() {
            lines.push(format!("    {}. {}", i + 1, op));
        }
        lines.join("\n")
    }
}

/// Check that `name` can be used as a single file name inside the image directory.
pub fn validate_share_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ShareError::invalid_name("name is empty"));
    }
    if name == "." || name == ".." {
        return Err(ShareError::invalid_name(format!("'{}' is not a file name", name)));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ShareError::invalid_name(format!(
            "'{}' is longer than {} characters",
            name, MAX_NAME_LEN
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(ShareError::invalid_name(format!(
            "'{}' contains '{}' (allowed: letters, digits, '.', '_', '-')",
            name, bad
        )));
    }
    Ok(())
}

/// FAT volume label for a share: uppercase, at most 11 characters.
pub fn volume_label(name: &str) -> String {
    let label: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
        .map(|c| c.to_ascii_uppercase())
        .take(11)
        .collect();
    if label.is_empty() {
        "SHARE".to_string()
    } else {
        label
    }
}

/// Calculate the operation plan for creating share `name` of `size`.
///
/// # Errors
///
/// - the name is not a plain file name
/// - the size string does not parse
/// - the size is below `MIN_SHARE_SIZE` or above `MAX_SHARE_SIZE`
pub fn calculate_share_plan(
    name: &str,
    size: &str,
    settings: &Settings,
    force: bool,
) -> Result<SharePlan> {
    validate_share_name(name)?;

    let requested = parse_size(size)?;
    let sectors = requested.bytes().div_ceil(SECTOR_SIZE);
    let size = ByteSize::from_bytes(sectors * SECTOR_SIZE);

    if size < MIN_SHARE_SIZE {
        return Err(ShareError::invalid_size(format!(
            "'{}' is smaller than the minimum share size {}",
            requested, MIN_SHARE_SIZE
        )));
    }
    if size > MAX_SHARE_SIZE {
        return Err(ShareError::invalid_size(format!(
            "'{}' exceeds the MBR limit of {} bytes",
            requested,
            MAX_SHARE_SIZE.bytes()
        )));
    }

    let image_path = settings.image_dir_path().join(name);
    let ops = vec![
        ShareOp::CreateImage { path: image_path.clone(), size },
        ShareOp::AttachDrive { path: image_path.clone() },
        ShareOp::PartitionDisk { table: PartitionTable::Mbr },
        ShareOp::FormatFs {
            partition: 1,
            filesystem: ShareFilesystem::Fat,
            label: volume_label(name),
        },
    ];

    Ok(SharePlan {
        name: name.to_string(),
        image_path,
        size,
        ops,
        force,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings::for_home("alice", "/home/alice")
    }

    #[test]
    fn test_plan_order() {
        let plan = calculate_share_plan("photos", "10M", &settings(), false).unwrap();
        assert_eq!(plan.ops.len(), 4);
        assert!(matches!(plan.ops[0], ShareOp::CreateImage { .. }));
        assert!(matches!(plan.ops[1], ShareOp::AttachDrive { .. }));
        assert_eq!(plan.ops[2], ShareOp::PartitionDisk { table: PartitionTable::Mbr });
        assert_eq!(
            plan.ops[3],
            ShareOp::FormatFs {
                partition: 1,
                filesystem: ShareFilesystem::Fat,
                label: "PHOTOS".to_string(),
            }
        );
    }

    #[test]
    fn test_plan_size_and_path() {
        let plan = calculate_share_plan("photos", "10M", &settings(), false).unwrap();
        assert_eq!(plan.size.bytes(), 10 * 1024 * 1024);
        assert_eq!(plan.image_path, PathBuf::from("/home/alice/.shares/photos"));
        match &plan.ops[0] {
            ShareOp::CreateImage { path, size } => {
                assert_eq!(path, &plan.image_path);
                assert_eq!(*size, plan.size);
            }
            other => panic!("Expected CreateImage, got {}", other),
        }
    }

    #[test]
    fn test_plan_rounds_up_to_sector() {
        let plan = calculate_share_plan("odd", "2097153", &settings(), false).unwrap();
        assert_eq!(plan.size.bytes(), 2 * 1024 * 1024 + 512);
    }

    #[test]
    fn test_plan_rejects_bad_size() {
        let err = calculate_share_plan("s", "ten megs", &settings(), false).unwrap_err();
        assert!(matches!(err, ShareError::InvalidSize(_)));

        let err = calculate_share_plan("s", "1M", &settings(), false).unwrap_err();
        assert!(matches!(err, ShareError::InvalidSize(_)));

        let err = calculate_share_plan("s", "3T", &settings(), false).unwrap_err();
        assert!(matches!(err, ShareError::InvalidSize(_)));
    }

    #[test]
    fn test_share_name_validation() {
        assert!(validate_share_name("photos-2024.img").is_ok());
        let long = "x".repeat(65);
        for bad in ["", ".", "..", "a/b", "../etc", "has space", long.as_str()] {
            assert!(validate_share_name(bad).is_err(), "{:?} should be rejected", bad);
        }
    }

    #[test]
    fn test_volume_label() {
        assert_eq!(volume_label("photos"), "PHOTOS");
        assert_eq!(volume_label("my.share-name_long"), "MYSHARE-NAM");
        assert_eq!(volume_label("..."), "SHARE");
    }

    #[test]
    fn test_summary_lists_operations() {
        let plan = calculate_share_plan("photos", "10M", &settings(), true).unwrap();
        let summary = plan.summary();
        assert!(summary.contains("Share Plan: photos"));
        assert!(summary.contains("Size: 10M (10485760 bytes)"));
        assert!(summary.contains("Overwrite existing: true"));
        assert!(summary.contains("3. PartitionDisk(table=mbr)"));
        assert!(summary.contains("4. FormatFs(partition=1, fs=fat, label=PHOTOS)"));
    }
}
