//! Host settings: which user the share belongs to and where files live.
//!
//! Settings come from three layers, later ones winning:
//! built-in defaults derived from the current user, an optional JSON file,
//! and command-line overrides.

use std::fs;
use std::path::{Path, PathBuf};

use nix::unistd::{getuid, User};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, ShareError};
use crate::size::parse_size;

/// Default size of a share image when `--setup-dir-size` is not given.
pub const DEFAULT_SHARE_SIZE: &str = "10M";

/// Paths and identity used for key import, share creation and instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Account rsync logs in as; also the owner used in the mount command.
    pub user: String,
    /// Home directory of `user`.
    pub home: PathBuf,
    /// authorized_keys file; `<home>/.ssh/authorized_keys` when unset.
    pub authorized_keys: Option<PathBuf>,
    /// Mount point clients rsync into; `<home>/public` when unset.
    pub public_dir: Option<PathBuf>,
    /// Directory holding share images; `<home>/.shares` when unset.
    pub image_dir: Option<PathBuf>,
    /// Size used when a share is requested without an explicit size.
    pub default_share_size: String,
}

/// Command-line overrides applied on top of loaded settings.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub user: Option<String>,
    pub authorized_keys: Option<PathBuf>,
    pub public_dir: Option<PathBuf>,
    pub image_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::detect()
    }
}

impl Settings {
    /// Settings for an explicit user and home directory, all paths derived.
    pub fn for_home(user: impl Into<String>, home: impl Into<PathBuf>) -> Self {
        Self {
            user: user.into(),
            home: home.into(),
            authorized_keys: None,
            public_dir: None,
            image_dir: None,
            default_share_size: DEFAULT_SHARE_SIZE.to_string(),
        }
    }

    /// Settings for the user running this process.
    ///
    /// Uses the passwd entry of the real uid, falling back to `$USER` and
    /// `$HOME` when the lookup fails (e.g. inside minimal containers).
    pub fn detect() -> Self {
        match User::from_uid(getuid()) {
            Ok(Some(user)) => {
                debug!("Detected user {} with home {:?}", user.name, user.dir);
                Self::for_home(user.name, user.dir)
            }
            Ok(None) | Err(_) => {
                warn!("No passwd entry for current uid, falling back to $USER/$HOME");
                let user = std::env::var("USER").unwrap_or_default();
                let home = std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/"));
                Self::for_home(user, home)
            }
        }
    }

    pub fn authorized_keys_path(&self) -> PathBuf {
        self.authorized_keys
            .clone()
            .unwrap_or_else(|| self.home.join(".ssh").join("authorized_keys"))
    }

    pub fn public_dir_path(&self) -> PathBuf {
        self.public_dir
            .clone()
            .unwrap_or_else(|| self.home.join("public"))
    }

    pub fn image_dir_path(&self) -> PathBuf {
        self.image_dir
            .clone()
            .unwrap_or_else(|| self.home.join(".shares"))
    }

    /// Apply command-line overrides, consuming `self`.
    ///
    /// Switching to another user also moves `home` to that user's passwd
    /// home, so the derived paths follow the account named in the mount
    /// command. Unknown users keep the current `home`.
    pub fn with_overrides(mut self, overrides: &SettingsOverrides) -> Self {
        if let Some(user) = overrides.user.as_ref().filter(|u| **u != self.user) {
            match User::from_name(user) {
                Ok(Some(entry)) => {
                    debug!("Using home {:?} of user {}", entry.dir, user);
                    self.home = entry.dir;
                }
                Ok(None) | Err(_) => {
                    warn!("No passwd entry for user {}, keeping home {:?}", user, self.home);
                }
            }
            self.user = user.clone();
        }
        if let Some(path) = &overrides.authorized_keys {
            self.authorized_keys = Some(path.clone());
        }
        if let Some(path) = &overrides.public_dir {
            self.public_dir = Some(path.clone());
        }
        if let Some(path) = &overrides.image_dir {
            self.image_dir = Some(path.clone());
        }
        self
    }

    /// Save settings to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json)?;
        Ok(())
    }

    /// Load settings from a JSON file. Missing fields keep their detected defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).map_err(|e| {
            ShareError::config(format!(
                "Failed to read settings from {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        let settings: Self = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        let user = self.user.trim();
        if user.is_empty() {
            return Err(ShareError::config("User must be specified"));
        }
        if !user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(ShareError::config(format!(
                "User '{}' contains characters not allowed in a user name",
                user
            )));
        }

        for (what, path) in [
            ("home", self.home.clone()),
            ("authorized_keys", self.authorized_keys_path()),
            ("public_dir", self.public_dir_path()),
            ("image_dir", self.image_dir_path()),
        ] {
            if !path.is_absolute() {
                return Err(ShareError::config(format!(
                    "{} must be an absolute path, got {:?}",
                    what, path
                )));
            }
        }

        parse_size(&self.default_share_size)?;

        Ok(())
    }
}
