//! External tool location and spawning

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::debug;

use crate::error::TrimError;

/// Directory next to the executable searched for bundled tools
pub const BUNDLED_TOOLS_DIR: &str = "bin";

/// Resolve the program to run for `name`.
///
/// An explicitly configured path wins. Otherwise a bundled copy in
/// `bin/` beside the running executable is preferred, falling back to the
/// bare name so the system `PATH` is searched.
pub fn locate_tool(name: &str, configured: Option<&Path>) -> PathBuf {
    if let Some(path) = configured {
        return path.to_path_buf();
    }

    let bundled = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| bundled_candidate(dir, name)));
    match bundled {
        Some(candidate) if candidate.is_file() => {
            debug!("Using bundled {}: {}", name, candidate.display());
            candidate
        }
        _ => PathBuf::from(name),
    }
}

fn bundled_candidate(exe_dir: &Path, name: &str) -> PathBuf {
    let file = if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    };
    exe_dir.join(BUNDLED_TOOLS_DIR).join(file)
}

/// Command for a tool that never opens a console window on Windows
pub fn tool_command(program: impl AsRef<OsStr>) -> Command {
    #[allow(unused_mut)]
    let mut command = Command::new(program);
    #[cfg(windows)]
    {
        use winapi::um::winbase::CREATE_NO_WINDOW;
        command.creation_flags(CREATE_NO_WINDOW);
    }
    command
}

/// Map a spawn failure to the unavailable-tool error
pub fn spawn_error(program: &Path, err: std::io::Error) -> TrimError {
    let message = if err.kind() == std::io::ErrorKind::NotFound {
        format!("{} was not found; install it or configure its path", program.display())
    } else {
        format!("failed to launch {}: {}", program.display(), err)
    };
    TrimError::ProbeUnavailable {
        tool: program
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string()),
        message,
    }
}
