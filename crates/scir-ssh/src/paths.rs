//! Control socket and pidfile layout.
//!
//! ssh refuses control socket paths longer than roughly a hundred bytes, so
//! the socket goes to the first of these that fits:
//!
//! 1. `socket_dir/[category/]mstr.user@host:port[_uniq]`
//! 2. the same name under `fallback_socket_dir`
//! 3. `fallback_socket_dir/[category/]mstr.<md5 of the key>`
//! 4. `fallback_socket_dir/mstr.<md5 of the key>`
//!
//! When even the last one is too long, no path is handed out.

use crate::{MasterKey, SshConfig, SshError};
use camino::{Utf8Path, Utf8PathBuf};
use md5::{Digest, Md5};
use std::os::unix::fs::DirBuilderExt;

const SOCKET_PREFIX: &str = "mstr.";

/// Create `dir` (and parents) if needed; a new leaf is private to the user.
pub(crate) fn ensure_private_dir(dir: &Utf8Path) -> Result<(), SshError> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(|e| SshError::io("creating directory", dir.as_std_path(), e))
}

fn with_category(dir: &Utf8Path, key: &MasterKey) -> Utf8PathBuf {
    match key.category() {
        Some(category) => dir.join(category),
        None => dir.to_path_buf(),
    }
}

/// Where the control socket of `key` lives. Creates the category
/// sub-directory of the chosen location.
pub fn control_path(config: &SshConfig, key: &MasterKey) -> Result<Utf8PathBuf, SshError> {
    let basename = match key.uniq() {
        Some(uniq) => format!("{}{}_{}", SOCKET_PREFIX, key.simple_key(), uniq),
        None => format!("{}{}", SOCKET_PREFIX, key.simple_key()),
    };
    let fits = |path: &Utf8Path| path.as_str().len() < config.max_socket_path_len;

    if config.socket_dir.is_dir() {
        let dir = with_category(&config.socket_dir, key);
        let path = dir.join(&basename);
        if fits(&path) {
            ensure_private_dir(&dir)?;
            return Ok(path);
        }
    }

    let dir = with_category(&config.fallback_socket_dir, key);
    let path = dir.join(&basename);
    if fits(&path) {
        ensure_private_dir(&dir)?;
        return Ok(path);
    }

    // The digest covers the category, so dropping its directory stays unique.
    let hashed = format!(
        "{}{}",
        SOCKET_PREFIX,
        hex::encode(Md5::digest(key.to_string().as_bytes()))
    );
    for dir in [dir, config.fallback_socket_dir.clone()] {
        let path = dir.join(&hashed);
        if fits(&path) {
            ensure_private_dir(&dir)?;
            return Ok(path);
        }
    }

    Err(SshError::SocketPathTooLong {
        path: config.fallback_socket_dir.join(hashed),
        max: config.max_socket_path_len,
    })
}

/// `pid_dir/[category/]<socket name>.pid`
pub fn pidfile_path(
    config: &SshConfig,
    key: &MasterKey,
    control_path: &Utf8Path,
) -> Result<Utf8PathBuf, SshError> {
    let dir = with_category(&config.pid_dir, key);
    ensure_private_dir(&dir)?;
    let name = control_path.file_name().unwrap_or(SOCKET_PREFIX);
    Ok(dir.join(format!("{}.pid", name)))
}

/// The master's diagnostic log, next to its pidfile.
pub fn diagnostics_path(pidfile: &Utf8Path) -> Utf8PathBuf {
    pidfile.with_extension("oer")
}
