//! Platform-specific logging directory resolution.

use std::path::PathBuf;

/// File name prefix of the recorder server's rolling log.
pub const SERVER_LOG_PREFIX: &str = "screenrec-server";

/// Returns the platform-appropriate directory for log files.
///
/// | Platform | Directory |
/// |----------|-----------|
/// | Linux | `$XDG_STATE_HOME/screenrec/logs` or `~/.local/state/screenrec/logs` |
/// | macOS | `~/Library/Logs/screenrec` |
/// | Windows | `%LOCALAPPDATA%\screenrec\logs` |
///
/// Falls back to `<temp>/screenrec/logs` when no home directory is known.
pub fn log_dir() -> PathBuf {
    let Some(base) = directories::ProjectDirs::from("", "", "screenrec") else {
        return std::env::temp_dir().join("screenrec").join("logs");
    };

    #[cfg(target_os = "linux")]
    {
        base.state_dir()
            .map(|dir| dir.to_path_buf())
            .unwrap_or_else(|| base.data_local_dir().join("state"))
            .join("logs")
    }

    #[cfg(target_os = "macos")]
    {
        // data_local_dir is ~/Library/Application Support/screenrec
        let library = base
            .data_local_dir()
            .parent()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| base.data_local_dir().to_path_buf());
        library.join("Logs").join("screenrec")
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        base.data_local_dir().join("logs")
    }
}

/// Ensures the log directory exists, creating it if necessary.
pub fn ensure_log_dir() -> Result<PathBuf, std::io::Error> {
    let dir = log_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_is_absolute() {
        let dir = log_dir();
        assert!(dir.is_absolute());
        assert!(dir.to_string_lossy().contains("screenrec"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_log_dir_under_state_home() {
        let dir = log_dir();
        assert!(dir.ends_with("logs"));
    }
}
