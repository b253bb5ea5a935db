//! Raw share images: create, partition, format, inspect.
//!
//! An image is a flat file treated as a disk with 512-byte sectors. Sector 0
//! holds an MBR with a single primary partition starting at LBA 2048; the
//! partition holds a FAT filesystem written by `fatfs`.
//!
//! Mutating steps run inside a `DiskSession`, the open read-write handle on
//! the image. The session is closed (synced) at the end of `execute_plan`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fatfs::{FatType, FileSystem, FormatVolumeOptions, FsOptions};
use strum::Display;
use tracing::{debug, info};

use crate::engine::share::{PartitionTable, ShareOp, SharePlan};
use crate::error::{Result, ShareError};
use crate::size::ByteSize;

/// Bytes per sector of every share image.
pub const SECTOR_SIZE: u64 = 512;

/// First LBA of the share partition (1 MiB alignment).
pub const PARTITION_ALIGNMENT_LBA: u64 = 2048;

const PARTITION_TABLE_OFFSET: usize = 446;
const PARTITION_ENTRY_SIZE: usize = 16;
const PRIMARY_PARTITIONS: usize = 4;
const DISK_SIGNATURE_OFFSET: usize = 440;
const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// System id written before the filesystem type is known.
const PLACEHOLDER_SYSTEM_ID: u8 = 0x0C;

// ============================================================================
// FAT flavour
// ============================================================================

/// FAT variant chosen by the formatter for the partition size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FatKind {
    #[strum(serialize = "FAT12")]
    Fat12,
    #[strum(serialize = "FAT16")]
    Fat16,
    #[strum(serialize = "FAT32")]
    Fat32,
}

impl FatKind {
    /// MBR partition system id for this FAT variant (LBA addressing).
    pub fn system_id(self) -> u8 {
        match self {
            Self::Fat12 => 0x01,
            Self::Fat16 => 0x06,
            Self::Fat32 => 0x0C,
        }
    }
}

impl From<FatType> for FatKind {
    fn from(fat_type: FatType) -> Self {
        match fat_type {
            FatType::Fat12 => Self::Fat12,
            FatType::Fat16 => Self::Fat16,
            FatType::Fat32 => Self::Fat32,
        }
    }
}

// ============================================================================
// MBR partition entries
// ============================================================================

/// One used primary partition from the MBR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionEntry {
    /// 1-based slot in the partition table
    pub index: usize,
    pub bootable: bool,
    pub system_id: u8,
    pub starting_lba: u32,
    pub sectors: u32,
}

impl PartitionEntry {
    /// Byte offset of the partition inside the image (the `mount -o offset=` value).
    pub fn offset(&self) -> u64 {
        u64::from(self.starting_lba) * SECTOR_SIZE
    }

    pub fn size_bytes(&self) -> u64 {
        u64::from(self.sectors) * SECTOR_SIZE
    }

    fn encode(&self) -> [u8; PARTITION_ENTRY_SIZE] {
        let mut raw = [0u8; PARTITION_ENTRY_SIZE];
        raw[0] = if self.bootable { 0x80 } else { 0x00 };
        raw[1..4].copy_from_slice(&chs(self.starting_lba));
        raw[4] = self.system_id;
        let last = self.starting_lba + self.sectors.saturating_sub(1);
        raw[5..8].copy_from_slice(&chs(last));
        raw[8..12].copy_from_slice(&self.starting_lba.to_le_bytes());
        raw[12..16].copy_from_slice(&self.sectors.to_le_bytes());
        raw
    }

    fn decode(index: usize, raw: &[u8]) -> Option<Self> {
        let system_id = raw[4];
        let starting_lba = u32::from_le_bytes([raw[8], raw[9], raw[10], raw[11]]);
        let sectors = u32::from_le_bytes([raw[12], raw[13], raw[14], raw[15]]);
        if system_id == 0 || sectors == 0 {
            return None;
        }
        Some(Self {
            index,
            bootable: raw[0] == 0x80,
            system_id,
            starting_lba,
            sectors,
        })
    }
}

/// CHS triple for `lba` on the conventional 255-head, 63-sector geometry.
/// Addresses past cylinder 1023 saturate, as `fdisk` does.
fn chs(lba: u32) -> [u8; 3] {
    const HEADS: u32 = 255;
    const SECTORS_PER_TRACK: u32 = 63;
    let cylinder = lba / (HEADS * SECTORS_PER_TRACK);
    if cylinder > 1023 {
        return [0xFE, 0xFF, 0xFF];
    }
    let head = (lba / SECTORS_PER_TRACK) % HEADS;
    let sector = lba % SECTORS_PER_TRACK + 1;
    [
        head as u8,
        (sector as u8 & 0x3F) | ((cylinder >> 2) as u8 & 0xC0),
        cylinder as u8,
    ]
}

fn read_boot_sector<R: Read + Seek>(disk: &mut R) -> Result<[u8; SECTOR_SIZE as usize]> {
    let mut sector = [0u8; SECTOR_SIZE as usize];
    disk.seek(SeekFrom::Start(0))?;
    disk.read_exact(&mut sector).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ShareError::image("image is smaller than one sector")
        } else {
            e.into()
        }
    })?;
    Ok(sector)
}

/// Decode the used primary partitions from the MBR of `disk`.
pub fn read_partition_table<R: Read + Seek>(disk: &mut R) -> Result<Vec<PartitionEntry>> {
    let sector = read_boot_sector(disk)?;
    if sector[510..512] != BOOT_SIGNATURE {
        return Err(ShareError::image("no MBR partition table (missing 0x55AA signature)"));
    }
    Ok((0..PRIMARY_PARTITIONS)
        .filter_map(|slot| {
            let start = PARTITION_TABLE_OFFSET + slot * PARTITION_ENTRY_SIZE;
            PartitionEntry::decode(slot + 1, &sector[start..start + PARTITION_ENTRY_SIZE])
        })
        .collect())
}

// ============================================================================
// Partition window
// ============================================================================

/// Read/write/seek view of one partition, positioned at 0 for `fatfs`.
struct PartitionWindow<'a> {
    disk: &'a mut File,
    start: u64,
    len: u64,
    pos: u64,
}

impl<'a> PartitionWindow<'a> {
    fn new(disk: &'a mut File, entry: &PartitionEntry) -> Self {
        Self {
            disk,
            start: entry.offset(),
            len: entry.size_bytes(),
            pos: 0,
        }
    }

    fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }
}

impl Read for PartitionWindow<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = (buf.len() as u64).min(self.remaining()) as usize;
        if n == 0 {
            return Ok(0);
        }
        self.disk.seek(SeekFrom::Start(self.start + self.pos))?;
        let read = self.disk.read(&mut buf[..n])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl Write for PartitionWindow<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = (buf.len() as u64).min(self.remaining()) as usize;
        if n == 0 && !buf.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "write past end of partition",
            ));
        }
        self.disk.seek(SeekFrom::Start(self.start + self.pos))?;
        let written = self.disk.write(&buf[..n])?;
        self.pos += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.disk.flush()
    }
}

impl Seek for PartitionWindow<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::End(n) => i128::from(self.len) + i128::from(n),
            SeekFrom::Current(n) => i128::from(self.pos) + i128::from(n),
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of partition",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

// ============================================================================
// Disk session
// ============================================================================

/// Create a raw image of exactly `size` bytes. The file is sparse.
pub fn create_raw_image(path: &Path, size: ByteSize) -> Result<()> {
    if size.bytes() % SECTOR_SIZE != 0 {
        return Err(ShareError::image(format!(
            "image size {} is not a multiple of {} bytes",
            size.bytes(),
            SECTOR_SIZE
        )));
    }
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.set_len(size.bytes())?;
    file.sync_all()?;
    debug!("Created raw image {:?} ({} bytes)", path, size.bytes());
    Ok(())
}

/// An image attached for modification.
#[derive(Debug)]
pub struct DiskSession {
    path: PathBuf,
    disk: File,
}

impl DiskSession {
    /// Attach an existing image read-write.
    pub fn open(path: &Path) -> Result<Self> {
        let disk = OpenOptions::new().read(true).write(true).open(path)?;
        debug!("Attached {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            disk,
        })
    }

    /// Create a raw image and attach it.
    pub fn create(path: &Path, size: ByteSize) -> Result<Self> {
        create_raw_image(path, size)?;
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the attached image in bytes.
    pub fn size(&self) -> Result<u64> {
        Ok(self.disk.metadata()?.len())
    }

    /// Write an MBR holding one primary partition from LBA 2048 to the end of the disk.
    ///
    /// Any previous partition table is replaced.
    pub fn partition_disk(&mut self) -> Result<PartitionEntry> {
        let total_sectors = self.size()? / SECTOR_SIZE;
        if total_sectors <= PARTITION_ALIGNMENT_LBA {
            return Err(ShareError::image(format!(
                "image has {} sectors, needs more than {} to hold a partition",
                total_sectors, PARTITION_ALIGNMENT_LBA
            )));
        }
        let sectors = u32::try_from(total_sectors - PARTITION_ALIGNMENT_LBA)
            .map_err(|_| ShareError::image("image is too large for an MBR partition table"))?;

        let entry = PartitionEntry {
            index: 1,
            bootable: false,
            system_id: PLACEHOLDER_SYSTEM_ID,
            starting_lba: PARTITION_ALIGNMENT_LBA as u32,
            sectors,
        };

        let mut sector = [0u8; SECTOR_SIZE as usize];
        sector[DISK_SIGNATURE_OFFSET..DISK_SIGNATURE_OFFSET + 4]
            .copy_from_slice(&disk_signature().to_le_bytes());
        sector[PARTITION_TABLE_OFFSET..PARTITION_TABLE_OFFSET + PARTITION_ENTRY_SIZE]
            .copy_from_slice(&entry.encode());
        sector[510..512].copy_from_slice(&BOOT_SIGNATURE);

        self.disk.seek(SeekFrom::Start(0))?;
        self.disk.write_all(&sector)?;
        debug!(
            "Wrote MBR to {:?}: partition 1 at LBA {} ({} sectors)",
            self.path, entry.starting_lba, entry.sectors
        );
        Ok(entry)
    }

    /// Used primary partitions of the attached image.
    pub fn list_partitions(&mut self) -> Result<Vec<PartitionEntry>> {
        read_partition_table(&mut self.disk)
    }

    /// Change the system id of partition `index` (1-based).
    pub fn set_partition_type(&mut self, index: usize, system_id: u8) -> Result<()> {
        if !(1..=PRIMARY_PARTITIONS).contains(&index) {
            return Err(ShareError::image(format!("no primary partition slot {}", index)));
        }
        let mut sector = read_boot_sector(&mut self.disk)?;
        sector[PARTITION_TABLE_OFFSET + (index - 1) * PARTITION_ENTRY_SIZE + 4] = system_id;
        self.disk.seek(SeekFrom::Start(0))?;
        self.disk.write_all(&sector)?;
        Ok(())
    }

    /// Format `entry` with FAT and label it, then record the FAT type in the MBR.
    pub fn format_partition(&mut self, entry: &PartitionEntry, label: &str) -> Result<FatKind> {
        let options = FormatVolumeOptions::new().volume_label(label_bytes(label));
        {
            let mut window = PartitionWindow::new(&mut self.disk, entry);
            fatfs::format_volume(&mut window, options).map_err(|e| {
                ShareError::filesystem(format!("formatting partition {} failed: {}", entry.index, e))
            })?;
        }

        let kind = {
            let mut window = PartitionWindow::new(&mut self.disk, entry);
            let fs = FileSystem::new(&mut window, FsOptions::new()).map_err(|e| {
                ShareError::filesystem(format!("freshly formatted partition does not mount: {}", e))
            })?;
            let kind = FatKind::from(fs.fat_type());
            fs.unmount()?;
            kind
        };

        self.set_partition_type(entry.index, kind.system_id())?;
        info!("Formatted partition {} of {:?} as {}", entry.index, self.path, kind);
        Ok(kind)
    }

    /// Sync and release the image.
    pub fn close(self) -> Result<()> {
        self.disk.sync_all()?;
        debug!("Closed {:?}", self.path);
        Ok(())
    }
}

/// 11-byte space-padded FAT label.
fn label_bytes(label: &str) -> [u8; 11] {
    let mut raw = [b' '; 11];
    for (dst, src) in raw.iter_mut().zip(label.bytes().filter(u8::is_ascii)) {
        *dst = src.to_ascii_uppercase();
    }
    raw
}

/// Disk identifier for the MBR; only needs to differ between images.
fn disk_signature() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() ^ (d.as_secs() as u32))
        .unwrap_or(0x5348_4152)
}

// ============================================================================
// Plan execution and inspection
// ============================================================================

/// What is on disk after a share has been created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub partitions: Vec<PartitionEntry>,
    pub fat: FatKind,
    pub label: String,
}

impl ShareInfo {
    pub fn first_partition(&self) -> Option<&PartitionEntry> {
        self.partitions.first()
    }

    /// Byte offset of the first partition, as passed to `mount -o offset=`.
    pub fn first_partition_offset(&self) -> Option<u64> {
        self.first_partition().map(PartitionEntry::offset)
    }
}

/// Read back partitions and the filesystem of the first partition of `path`.
pub fn inspect_share(path: &Path) -> Result<ShareInfo> {
    let mut disk = File::open(path)?;
    let size_bytes = disk.metadata()?.len();
    let partitions = read_partition_table(&mut disk)?;
    let first = partitions
        .first()
        .copied()
        .ok_or_else(|| ShareError::image(format!("{:?} has no partitions", path)))?;

    let mut window = PartitionWindow::new(&mut disk, &first);
    let fs = FileSystem::new(&mut window, FsOptions::new())
        .map_err(|e| ShareError::filesystem(format!("partition 1 of {:?}: {}", path, e)))?;
    let fat = FatKind::from(fs.fat_type());
    let label = fs.volume_label();
    drop(fs);

    Ok(ShareInfo {
        path: path.to_path_buf(),
        size_bytes,
        partitions,
        fat,
        label,
    })
}

/// Byte offset of the first used partition of the image at `path`.
pub fn get_first_partition_offset(path: &Path) -> Result<u64> {
    let mut disk = File::open(path)?;
    read_partition_table(&mut disk)?
        .first()
        .map(PartitionEntry::offset)
        .ok_or_else(|| ShareError::image(format!("{:?} has no partitions", path)))
}

/// Carry out a share plan and report what was created.
///
/// An existing image is only replaced when the plan was built with `force`.
/// Failures from any step propagate unchanged; a partially built image is
/// left in place for inspection.
pub fn execute_plan(plan: &SharePlan) -> Result<ShareInfo> {
    if plan.image_path.exists() {
        if !plan.force {
            return Err(ShareError::config(format!(
                "share image {:?} already exists (use --force to replace it)",
                plan.image_path
            )));
        }
        info!("Replacing existing share image {:?}", plan.image_path);
        fs::remove_file(&plan.image_path)?;
    }
    if let Some(parent) = plan.image_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut session: Option<DiskSession> = None;
    let mut partition: Option<PartitionEntry> = None;

    for op in &plan.ops {
        debug!("Executing {}", op);
        match op {
            ShareOp::CreateImage { path, size } => create_raw_image(path, *size)?,
            ShareOp::AttachDrive { path } => session = Some(DiskSession::open(path)?),
            ShareOp::PartitionDisk { table: PartitionTable::Mbr } => {
                let disk = session
                    .as_mut()
                    .ok_or_else(|| ShareError::image("PartitionDisk before AttachDrive"))?;
                disk.partition_disk()?;
                let partitions = disk.list_partitions()?;
                if partitions.len() != 1 {
                    return Err(ShareError::image(format!(
                        "expected exactly one partition, found {}",
                        partitions.len()
                    )));
                }
                partition = partitions.first().copied();
            }
            ShareOp::FormatFs { partition: index, label, .. } => {
                let disk = session
                    .as_mut()
                    .ok_or_else(|| ShareError::image("FormatFs before AttachDrive"))?;
                let entry = partition
                    .filter(|p| p.index == *index)
                    .ok_or_else(|| ShareError::image(format!("partition {} does not exist", index)))?;
                disk.format_partition(&entry, label)?;
            }
        }
    }

    if let Some(disk) = session {
        disk.close()?;
    }

    let info = inspect_share(&plan.image_path)?;
    info!(
        "Share {} ready: {} bytes, {} at offset {}",
        plan.name,
        info.size_bytes,
        info.fat,
        info.first_partition_offset().unwrap_or_default()
    );
    Ok(info)
}
