//! Error types shared by the runner, commands and the registry.

use std::time::Duration;
use thiserror::Error;

/// Errors produced while running processes or looking up commands.
///
/// Documentation lookups never produce these; they degrade to a placeholder.
#[derive(Debug, Error)]
pub enum Error {
    /// The executable (or the shell used to launch it) could not be found.
    #[error("command not found: `{command}`")]
    CommandNotFound { command: String, stderr: String },

    /// The process ran and exited with a non-zero status.
    #[error("`{command}` exited with status {code}: {stderr}")]
    Process {
        command: String,
        code: i32,
        stderr: String,
        stdout: Vec<u8>,
    },

    /// The process did not finish in time and was killed.
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// No command is registered under this identifier.
    #[error("no command registered under `{0}`")]
    UnknownIdentifier(String),

    /// A key supplied to an explicit registry is not an identifier.
    #[error("not an identifier: `{0}`")]
    InvalidIdentifier(String),

    /// The token contains a NUL byte and cannot be quoted for the shell.
    #[error("cannot quote {0:?} for the shell")]
    Quote(String),

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The egress transform rejected the captured output.
    #[error("egress failed: {0}")]
    Egress(#[source] anyhow::Error),
}

impl Error {
    /// Exit status carried by the error, if the process got far enough to have one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::Process { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The command line the error refers to.
    pub fn command_line(&self) -> Option<&str> {
        match self {
            Error::CommandNotFound { command, .. }
            | Error::Process { command, .. }
            | Error::Timeout { command, .. }
            | Error::Spawn { command, .. } => Some(command),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
