//! Directory helpers following the XDG Base Directory specification
//!
//! - Data: `~/.local/share/fwctl/` - the policy store
//! - State: `~/.local/state/fwctl/` - snapshots history and audit log
//!
//! When running as root (the usual case for a host managing iptables), the
//! same layout resolves under `/root`.

use directories::ProjectDirs;
use std::path::PathBuf;

pub fn get_data_dir() -> Option<PathBuf> {
    ProjectDirs::from("io", "fwctl", "fwctl").map(|pd| pd.data_dir().to_path_buf())
}

pub fn get_state_dir() -> Option<PathBuf> {
    ProjectDirs::from("io", "fwctl", "fwctl")
        .and_then(|pd| pd.state_dir().map(std::path::Path::to_path_buf))
}

/// Creates the data and state directories with owner-only permissions
pub fn ensure_dirs() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::fs::DirBuilder;
        use std::os::unix::fs::DirBuilderExt;

        let mut builder = DirBuilder::new();
        builder.mode(0o700);
        builder.recursive(true);

        if let Some(dir) = get_data_dir() {
            builder.create(dir)?;
        }
        if let Some(dir) = get_state_dir() {
            builder.create(dir)?;
        }
    }

    #[cfg(not(unix))]
    {
        if let Some(dir) = get_data_dir() {
            std::fs::create_dir_all(dir)?;
        }
        if let Some(dir) = get_state_dir() {
            std::fs::create_dir_all(dir)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_resolve() {
        // ProjectDirs resolves on every supported platform with a home dir
        assert!(get_data_dir().is_some());
        assert!(get_state_dir().is_some());
    }
}
