//! rsync-share library
//!
//! Prepares a host for rsync over ssh: imports client public keys into
//! `authorized_keys` and builds size-limited FAT share images that can be
//! loop-mounted as the rsync target directory.

pub mod cli;
pub mod disk_image;
pub mod engine;
pub mod error;
pub mod instructions;
pub mod keys;
pub mod network;
pub mod settings;
pub mod setup;
pub mod size;

// Re-export main types for convenience
pub use disk_image::{
    execute_plan, get_first_partition_offset, inspect_share, DiskSession, FatKind,
    PartitionEntry, ShareInfo,
};
pub use engine::share::{calculate_share_plan, ShareOp, SharePlan};
pub use error::{Result, ShareError};
pub use keys::{collect_pub_keys, import_key, is_key_imported, AuthorizedKey, ImportOutcome};
pub use settings::{Settings, SettingsOverrides};
pub use setup::{run_setup, SetupReport, SetupRequest, ShareRequest};
pub use size::{parse_size, ByteSize};
