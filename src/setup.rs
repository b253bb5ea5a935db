//! One setup run: import keys, create the share, work out the instructions.
//!
//! Everything that can be rejected up front (malformed keys, bad share name
//! or size) is checked before the first file is written, so a typo in
//! `--setup-dir-size` does not leave half a setup behind.

use tracing::info;

use crate::disk_image::{execute_plan, ShareInfo};
use crate::engine::share::{calculate_share_plan, SharePlan};
use crate::error::{Result, ShareError};
use crate::instructions::{mount_command, rsync_hint};
use crate::keys::{collect_pub_keys, import_key, is_key_imported, ImportOutcome};
use crate::network::get_local_ip;
use crate::settings::Settings;

/// Share requested on the command line.
#[derive(Debug, Clone)]
pub struct ShareRequest {
    pub name: String,
    /// Size string; the settings default when `None`
    pub size: Option<String>,
}

/// Everything one run is asked to do.
#[derive(Debug, Clone, Default)]
pub struct SetupRequest {
    /// `--pub-key` arguments: key literals or key files
    pub pub_keys: Vec<String>,
    pub share: Option<ShareRequest>,
    /// Replace an existing share image
    pub force: bool,
    /// Report what would happen without writing anything
    pub dry_run: bool,
}

/// Per-key result.
#[derive(Debug, Clone)]
pub struct KeyReport {
    pub fingerprint: String,
    pub trimmed: String,
    pub outcome: ImportOutcome,
}

/// A share that now exists on disk.
#[derive(Debug, Clone)]
pub struct ShareReport {
    pub name: String,
    /// Size as the user wrote it
    pub requested_size: String,
    pub info: ShareInfo,
    pub offset: u64,
    pub mount_command: String,
}

/// Outcome of `run_setup`.
#[derive(Debug, Clone)]
pub struct SetupReport {
    pub dry_run: bool,
    pub keys: Vec<KeyReport>,
    /// Set when a share was created
    pub share: Option<ShareReport>,
    /// Set when a share was only planned (`dry_run`)
    pub planned_share: Option<SharePlan>,
    pub rsync_hint: String,
}

/// Run one setup against `settings`.
pub fn run_setup(request: &SetupRequest, settings: &Settings) -> Result<SetupReport> {
    settings.validate()?;

    let keys = collect_pub_keys(&request.pub_keys)?;
    let plan = match &request.share {
        Some(share) => {
            let size = share
                .size
                .clone()
                .unwrap_or_else(|| settings.default_share_size.clone());
            Some((
                size.clone(),
                calculate_share_plan(&share.name, &size, settings, request.force)?,
            ))
        }
        None => None,
    };
    if let Some((_, plan)) = &plan {
        if plan.image_path.exists() && !plan.force {
            return Err(ShareError::config(format!(
                "share image {:?} already exists (use --force to replace it)",
                plan.image_path
            )));
        }
    }

    let authorized_keys = settings.authorized_keys_path();
    let mut key_reports = Vec::with_capacity(keys.len());
    for key in &keys {
        let outcome = if request.dry_run {
            if is_key_imported(key, &authorized_keys)? {
                ImportOutcome::AlreadyPresent
            } else {
                ImportOutcome::Imported
            }
        } else {
            import_key(key, &authorized_keys)?
        };
        key_reports.push(KeyReport {
            fingerprint: key.fingerprint(),
            trimmed: key.trimmed(),
            outcome,
        });
    }

    let mut share_report = None;
    let mut planned_share = None;
    if let Some((requested_size, plan)) = plan {
        if request.dry_run {
            info!("Dry run, share not created:\n{}", plan.summary());
            planned_share = Some(plan);
        } else {
            info!("Creating share:\n{}", plan.summary());
            let info = execute_plan(&plan)?;
            let offset = info
                .first_partition_offset()
                .ok_or_else(|| ShareError::image("created share has no partition"))?;
            share_report = Some(ShareReport {
                name: plan.name.clone(),
                requested_size,
                mount_command: mount_command(
                    offset,
                    &settings.user,
                    &plan.image_path,
                    &settings.public_dir_path(),
                ),
                offset,
                info,
            });
        }
    }

    Ok(SetupReport {
        dry_run: request.dry_run,
        keys: key_reports,
        share: share_report,
        planned_share,
        rsync_hint: rsync_hint(&settings.user, get_local_ip(), &settings.public_dir_path()),
    })
}
