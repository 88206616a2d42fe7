//! Internal utilities.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{BufRead, Write};
use std::path::Path;

/// Reads a JSON document, treating a missing or malformed file as absent.
pub fn read_json_lenient<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read document, ignoring");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Malformed document, ignoring");
            None
        }
    }
}

/// Writes `value` as JSON indented with four spaces, replacing the file.
/// Missing parent directories are created.
///
/// # Errors
///
/// Returns [`ChangerError::Io`](crate::ChangerError::Io) if a directory or
/// the file cannot be written, or [`ChangerError::Json`](crate::ChangerError::Json)
/// if `value` does not serialize.
pub fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    std::fs::write(path, buf)?;
    Ok(())
}

/// Prints `prompt` to stderr and reads one line from stdin with terminal
/// echo disabled. Returns `None` on EOF or an empty line.
///
/// # Errors
///
/// Returns an I/O error if stdin cannot be read.
pub fn read_secret(prompt: &str) -> std::io::Result<Option<String>> {
    let mut stderr = std::io::stderr();
    write!(stderr, "{prompt}")?;
    stderr.flush()?;

    let mut line = String::new();
    {
        let _echo = EchoGuard::disable();
        std::io::stdin().lock().read_line(&mut line)?;
    }
    writeln!(stderr)?;

    let secret = line.trim_end_matches(['\r', '\n']);
    Ok((!secret.is_empty()).then(|| secret.to_string()))
}

/// Turns off `ECHO` on stdin while alive; restores the previous mode on drop.
/// A no-op when stdin is not a terminal.
struct EchoGuard {
    saved: Option<libc::termios>,
}

impl EchoGuard {
    fn disable() -> Self {
        // SAFETY: `isatty`, `tcgetattr` and `tcsetattr` only read or write the
        // `termios` struct we own; a zeroed `termios` is a valid bit pattern.
        unsafe {
            if libc::isatty(libc::STDIN_FILENO) != 1 {
                return Self { saved: None };
            }
            let mut term: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(libc::STDIN_FILENO, &raw mut term) != 0 {
                return Self { saved: None };
            }
            let saved = term;
            term.c_lflag &= !libc::ECHO;
            if libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw const term) != 0 {
                return Self { saved: None };
            }
            Self { saved: Some(saved) }
        }
    }
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        if let Some(saved) = self.saved {
            // SAFETY: restores the mode captured in `disable`.
            unsafe {
                libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &raw const saved);
            }
        }
    }
}
