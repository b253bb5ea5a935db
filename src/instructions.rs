//! Command lines printed for the operator once setup is done.

use std::net::IpAddr;
use std::path::Path;

/// `mount` invocation that loop-mounts the share partition at `public_dir`,
/// owned by `user` and private to them.
pub fn mount_command(offset: u64, user: &str, image_path: &Path, public_dir: &Path) -> String {
    format!(
        "sudo mount -o offset={},nosuid,uid={},gid={},umask=0077 {} {}",
        offset,
        user,
        user,
        image_path.display(),
        public_dir.display()
    )
}

/// Command a client runs to push a file into the share.
pub fn rsync_hint(user: &str, ip: IpAddr, public_dir: &Path) -> String {
    let host = match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{}]", v6),
    };
    format!("rsync <src file> {}@{}:{}", user, host, public_dir.display())
}
