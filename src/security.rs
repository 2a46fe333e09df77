#![forbid(unsafe_code)]

//! Shared security helpers used by the tubefetch binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Fails fast when a binary is started as root. The backend talks to
/// arbitrary remote hosts through yt-dlp, so it is expected to run under a
/// dedicated unprivileged account. Guarding the binary itself ensures that
/// manual invocations do not silently revert to insecure defaults.
pub fn ensure_not_root(process: &str) -> Result<()> {
    if Uid::current().is_root() {
        bail!("{process} must not be run as root; please use a dedicated service account");
    }
    Ok(())
}
