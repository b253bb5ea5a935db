//! Public key import into an `authorized_keys` file.
//!
//! Keys are identified by their decoded key material, so the same key with a
//! different comment or options field counts as already imported. Import is
//! append-only: an existing file is never rewritten.

use std::fs::{self, DirBuilder, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::Path;

use ssh_key::authorized_keys::Entry;
use ssh_key::{HashAlg, PublicKey};
use strum::Display;
use tracing::{debug, info, warn};

use crate::error::{Result, ShareError};

/// A validated public key line ready to be written to `authorized_keys`.
#[derive(Debug, Clone)]
pub struct AuthorizedKey {
    line: String,
    entry: Entry,
}

impl AuthorizedKey {
    /// Parse one OpenSSH public key line, optionally preceded by an options field.
    ///
    /// Validation is limited to what `sshd` itself needs: a known algorithm and
    /// a base64 blob that decodes to key data of that algorithm.
    pub fn parse(input: &str) -> Result<Self> {
        let line = input.trim();
        if line.is_empty() {
            return Err(ShareError::invalid_key("key is empty"));
        }
        if line.contains('\n') || line.contains('\r') {
            return Err(ShareError::invalid_key("key must be a single line"));
        }

        let entry: Entry = line
            .parse()
            .map_err(|e| ShareError::invalid_key(format!("{}: {}", shorten(line), e)))?;

        Ok(Self {
            line: line.to_string(),
            entry,
        })
    }

    /// The line as it will appear in `authorized_keys`.
    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn public_key(&self) -> &PublicKey {
        self.entry.public_key()
    }

    pub fn comment(&self) -> &str {
        self.public_key().comment()
    }

    /// SHA-256 fingerprint (e.g. `"SHA256:abc123…"`).
    pub fn fingerprint(&self) -> String {
        self.public_key().fingerprint(HashAlg::Sha256).to_string()
    }

    /// True if `other` carries the same key material, ignoring comment and options.
    pub fn same_key(&self, other: &PublicKey) -> bool {
        self.public_key().key_data() == other.key_data()
    }

    /// Abbreviated form for terminal output: the first 40 and last 20 characters.
    pub fn trimmed(&self) -> String {
        shorten(&self.line)
    }
}

fn shorten(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    if chars.len() <= 60 {
        return line.to_string();
    }
    let head: String = chars[..40].iter().collect();
    let tail: String = chars[chars.len() - 20..].iter().collect();
    format!("{}...<trimmed>...{}", head, tail)
}

/// Result of importing a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ImportOutcome {
    #[strum(serialize = "imported")]
    Imported,
    #[strum(serialize = "already present")]
    AlreadyPresent,
}

/// Resolve `--pub-key` arguments into keys.
///
/// Each argument is either a key literal or a path to a file of keys
/// (one per line, `#` comments and blank lines ignored). Keys repeated across
/// arguments are returned once, in first-seen order.
pub fn collect_pub_keys<S: AsRef<str>>(args: &[S]) -> Result<Vec<AuthorizedKey>> {
    let mut keys: Vec<AuthorizedKey> = Vec::new();

    for arg in args {
        let arg = arg.as_ref();
        let path = Path::new(arg);

        let candidates = if path.is_file() {
            debug!("Reading public keys from {:?}", path);
            let content = fs::read_to_string(path)?;
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(AuthorizedKey::parse)
                .collect::<Result<Vec<_>>>()?
        } else {
            vec![AuthorizedKey::parse(arg)?]
        };

        for key in candidates {
            if keys.iter().any(|k| k.same_key(key.public_key())) {
                debug!("Skipping duplicate key argument {}", key.fingerprint());
                continue;
            }
            keys.push(key);
        }
    }

    Ok(keys)
}

/// Check whether `key` already appears in `content`.
///
/// Lines that do not parse as keys are compared textually so that a
/// hand-edited entry is still recognised. Invalid UTF-8 (e.g. a Latin-1
/// comment) is replaced before parsing; the key material is plain ASCII.
fn content_has_key(content: &[u8], key: &AuthorizedKey) -> bool {
    for (lineno, raw) in content.split(|b| *b == b'\n').enumerate() {
        if let Err(e) = std::str::from_utf8(raw) {
            warn!("authorized_keys line {} is not UTF-8 ({}), decoding lossily", lineno + 1, e);
        }
        let decoded = String::from_utf8_lossy(raw);
        let line = decoded.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.parse::<Entry>() {
            Ok(entry) => {
                if key.same_key(entry.public_key()) {
                    return true;
                }
            }
            Err(e) => {
                warn!("authorized_keys line {} does not parse ({}), comparing as text", lineno + 1, e);
                if line == key.line() {
                    return true;
                }
            }
        }
    }
    false
}

/// Raw contents of `path`; empty when the file does not exist.
fn read_existing(path: &Path) -> Result<Vec<u8>> {
    match fs::read(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Check whether `key` is already listed in the authorized_keys file at `path`.
///
/// A missing file means nothing has been imported yet.
pub fn is_key_imported(key: &AuthorizedKey, path: &Path) -> Result<bool> {
    Ok(content_has_key(&read_existing(path)?, key))
}

/// Append `key` to the authorized_keys file at `path` unless it is already there.
///
/// Creates the parent directory (mode 0700) and the file (mode 0600) when
/// missing, as `sshd`'s StrictModes requires.
pub fn import_key(key: &AuthorizedKey, path: &Path) -> Result<ImportOutcome> {
    let existing = read_existing(path)?;

    if content_has_key(&existing, key) {
        debug!("Key {} already present in {:?}", key.fingerprint(), path);
        return Ok(ImportOutcome::AlreadyPresent);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            DirBuilder::new().recursive(true).mode(0o700).create(parent)?;
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)?;

    let mut record = String::new();
    if !existing.is_empty() && !existing.ends_with(b"\n") {
        record.push('\n');
    }
    record.push_str(key.line());
    record.push('\n');
    file.write_all(record.as_bytes())?;
    file.sync_all()?;

    info!("Imported key {} into {:?}", key.fingerprint(), path);
    Ok(ImportOutcome::Imported)
}
