// error.rs — Build error taxonomy
//
// One enum covers every way a kernel build can fail. Callers pattern-match
// on the kind; no foreign error type (io, object parsing) crosses a module
// boundary unwrapped.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, BuildError>;

#[derive(Debug)]
pub enum BuildError {
    /// Missing, unreadable or malformed machine-description file, or an
    /// address-space table lacking the required GLOBAL/PRIVATE roles.
    /// Always fatal, surfaced before any toolchain invocation.
    Config { message: String },

    /// Nonzero exit (or failure to launch) of a required external tool.
    /// Carries the full failing command line for the diagnostic.
    Toolchain {
        command: String,
        status: Option<i32>,
    },

    /// An expected output file is absent after a supposedly successful
    /// stage, or the kernel entry procedure is missing from the compiled
    /// object. Indicates a toolchain/ABI mismatch.
    Artifact { path: PathBuf, message: String },

    /// The target-object artifact could not be parsed.
    Parse { path: PathBuf, message: String },

    /// Filesystem failure while reading or writing a build artifact.
    Io { path: PathBuf, source: io::Error },
}

impl BuildError {
    pub fn config(message: impl Into<String>) -> Self {
        BuildError::Config {
            message: message.into(),
        }
    }

    pub fn toolchain(command: impl Into<String>, status: Option<i32>) -> Self {
        BuildError::Toolchain {
            command: command.into(),
            status,
        }
    }

    pub fn artifact(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        BuildError::Artifact {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        BuildError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Shorthand for wrapping `io::Error` with the path it concerns.
pub fn io_at(path: &Path) -> impl FnOnce(io::Error) -> BuildError + '_ {
    move |e| BuildError::io(path, e)
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Config { message } => {
                write!(f, "configuration error: {}", message)
            }
            BuildError::Toolchain { command, status } => match status {
                Some(code) => write!(
                    f,
                    "external tool exited with status {}: {}",
                    code, command
                ),
                None => write!(f, "external tool terminated abnormally: {}", command),
            },
            BuildError::Artifact { path, message } => {
                write!(f, "{}: {}", path.display(), message)
            }
            BuildError::Parse { path, message } => {
                write!(f, "{}: malformed object: {}", path.display(), message)
            }
            BuildError::Io { path, source } => {
                write!(f, "{}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for BuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BuildError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolchain_display_includes_command_line() {
        let e = BuildError::toolchain("tcecc -a mach.adf in.bc -o out.tpef", Some(1));
        let msg = format!("{e}");
        assert!(msg.contains("status 1"));
        assert!(msg.contains("tcecc -a mach.adf"));
    }

    #[test]
    fn io_error_keeps_source() {
        use std::error::Error as _;
        let e = BuildError::io(
            "/tmp/x",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(e.source().is_some());
    }
}
