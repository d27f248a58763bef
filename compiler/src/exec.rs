// exec.rs — External toolchain invocation
//
// The pipeline drives every external tool through this seam so tests can
// substitute a recording double. Invocations are synchronous and
// blocking; there is no cancellation or timeout. A caller that needs a
// deadline must wrap the invocation externally.

use std::io;
use std::process::Command;

use crate::error::{BuildError, Result};

/// Outcome of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolStatus {
    /// Exit code, or `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl ToolStatus {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs a command line to completion and reports success or failure.
///
/// Command lines may use shell syntax (`;`, `&&`, redirections); the
/// default implementation hands them to `sh -c`, matching what the tools
/// themselves document in their usage examples.
pub trait ToolRunner: Send + Sync {
    fn run(&self, command_line: &str) -> io::Result<ToolStatus>;
}

/// Production runner: `sh -c <command line>`.
pub struct ShellRunner;

impl ToolRunner for ShellRunner {
    fn run(&self, command_line: &str) -> io::Result<ToolStatus> {
        let status = Command::new("sh").arg("-c").arg(command_line).status()?;
        Ok(ToolStatus {
            code: status.code(),
        })
    }
}

/// Run a required tool, converting any failure into a fatal `Toolchain`
/// error carrying the full command line.
pub fn run_checked(runner: &dyn ToolRunner, command_line: &str) -> Result<()> {
    match runner.run(command_line) {
        Ok(status) if status.success() => Ok(()),
        Ok(status) => Err(BuildError::toolchain(command_line, status.code)),
        Err(_) => Err(BuildError::toolchain(command_line, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRunner(Option<i32>);

    impl ToolRunner for FixedRunner {
        fn run(&self, _command_line: &str) -> io::Result<ToolStatus> {
            Ok(ToolStatus { code: self.0 })
        }
    }

    #[test]
    fn zero_exit_is_success() {
        assert!(run_checked(&FixedRunner(Some(0)), "true").is_ok());
    }

    #[test]
    fn nonzero_exit_carries_command_line() {
        let err = run_checked(&FixedRunner(Some(2)), "tcecc -a m.adf").unwrap_err();
        match err {
            BuildError::Toolchain { command, status } => {
                assert_eq!(command, "tcecc -a m.adf");
                assert_eq!(status, Some(2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
