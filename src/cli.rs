use clap::Parser;
use std::path::PathBuf;

use crate::settings::SettingsOverrides;
use crate::setup::{SetupRequest, ShareRequest};

/// rsync-share - prepare this host to receive files over rsync/ssh
#[derive(Parser, Debug)]
#[command(name = "rsync-share")]
#[command(about = "Import client SSH keys and create size-limited FAT share images for rsync")]
#[command(version)]
pub struct Cli {
    /// Public key to authorize: an OpenSSH key line or a path to a .pub file.
    ///
    /// May be given several times. Keys already in authorized_keys are skipped.
    #[arg(short = 'k', long = "pub-key", value_name = "KEY|FILE")]
    pub pub_keys: Vec<String>,

    /// Create a share image with this name in the image directory
    #[arg(short = 's', long, value_name = "NAME")]
    pub setup_dir: Option<String>,

    /// Size of the share image, e.g. 10M or 1G (binary units) [default: 10M]
    #[arg(long, value_name = "SIZE", requires = "setup_dir")]
    pub setup_dir_size: Option<String>,

    /// JSON settings file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// authorized_keys file to import into
    #[arg(long, value_name = "FILE")]
    pub authorized_keys: Option<PathBuf>,

    /// Directory the share is mounted on and clients rsync into
    #[arg(long, value_name = "DIR")]
    pub public_dir: Option<PathBuf>,

    /// Directory holding share images
    #[arg(long, value_name = "DIR")]
    pub image_dir: Option<PathBuf>,

    /// User that owns the share and that clients log in as.
    ///
    /// Default paths move to this user's home directory.
    #[arg(long)]
    pub user: Option<String>,

    /// Replace an existing share image of the same name
    #[arg(long, requires = "setup_dir")]
    pub force: bool,

    /// Dry-run mode: show what would be done without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }

    /// Settings overrides carried by the flags.
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            user: self.user.clone(),
            authorized_keys: self.authorized_keys.clone(),
            public_dir: self.public_dir.clone(),
            image_dir: self.image_dir.clone(),
        }
    }

    /// The work this invocation asks for.
    pub fn setup_request(&self) -> SetupRequest {
        SetupRequest {
            pub_keys: self.pub_keys.clone(),
            share: self.setup_dir.as_ref().map(|name| ShareRequest {
                name: name.clone(),
                size: self.setup_dir_size.clone(),
            }),
            force: self.force,
            dry_run: self.dry_run,
        }
    }
}
