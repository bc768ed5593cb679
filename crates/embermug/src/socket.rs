// ── Service socket ──
//
// Obtain the listening socket for `embermug service`. A listener passed
// in by systemd socket activation wins; otherwise the configured path is
// bound, replacing a stale socket file nobody answers on. A socket we
// bound ourselves is unlinked again when the guard drops.

use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

use listenfd::ListenFd;
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use crate::error::CliError;

/// Removes the socket file on drop, if we created it.
pub struct SocketGuard {
    path: Option<PathBuf>,
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed service socket"),
                Err(e) => warn!(path = %path.display(), error = %e, "cannot remove service socket"),
            }
        }
    }
}

pub async fn listen(path: &Path) -> Result<(UnixListener, SocketGuard), CliError> {
    let mut fds = ListenFd::from_env();
    if let Some(inherited) = fds.take_unix_listener(0)? {
        inherited.set_nonblocking(true)?;
        info!("using socket-activated listener");
        return Ok((UnixListener::from_std(inherited)?, SocketGuard { path: None }));
    }
    bind(path).await
}

async fn bind(path: &Path) -> Result<(UnixListener, SocketGuard), CliError> {
    if let Ok(meta) = std::fs::symlink_metadata(path) {
        if !meta.file_type().is_socket() {
            return Err(CliError::Validation {
                field: "socket-path".into(),
                reason: format!("{} exists and is not a socket", path.display()),
            });
        }
        if UnixStream::connect(path).await.is_ok() {
            return Err(CliError::SocketInUse {
                path: path.to_path_buf(),
            });
        }
        std::fs::remove_file(path)?;
        debug!(path = %path.display(), "removed stale socket");
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(path)?;
    info!(path = %path.display(), "listening");
    Ok((
        listener,
        SocketGuard {
            path: Some(path.to_path_buf()),
        },
    ))
}
