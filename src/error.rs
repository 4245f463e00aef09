use std::path::PathBuf;
use thiserror::Error;

/// Process exit codes reported by the `cmdbridge` binary
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    NoError = 0,
    ChildFailed = 1,
    InvalidArguments = 2,
    RuntimeError = 3,
    Timeout = 124,
    LaunchFailed = 126,
    NotFound = 127,
    Cancelled = 130,
}

impl ReturnCode {
    pub fn as_exit_code(self) -> i32 {
        self as i32
    }
}

/// Main error type for command invocation
#[derive(Error, Debug)]
pub enum CmdError {
    #[error("Invalid command line arguments: {0}")]
    InvalidArguments(String),

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),

    #[error("Unsupported argument shape: {0}")]
    InvalidArgumentShape(String),

    #[error("Invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error("Failed to start \"{}\": {source}", .program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("\"{}\" timed out in {seconds} seconds", program_name(.program))]
    Timeout { program: PathBuf, seconds: u64 },

    #[error("Script root directory not found: {}", .0.display())]
    ScriptRootNotFound(PathBuf),

    #[error("Path escapes the script root: {0}")]
    PathOutsideRoot(String),

    #[error("Unknown output encoding: {0}")]
    UnknownEncoding(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Runtime error: {0}")]
    RuntimeError(String),
}

fn program_name(program: &std::path::Path) -> String {
    program
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string())
}

impl CmdError {
    /// The native OS error code of a launch failure, if any
    pub fn native_code(&self) -> Option<i32> {
        match self {
            CmdError::Launch { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Convert error to the appropriate return code
    pub fn to_return_code(&self) -> ReturnCode {
        match self {
            CmdError::InvalidArguments(_) => ReturnCode::InvalidArguments,
            CmdError::InvalidState(_) => ReturnCode::RuntimeError,
            CmdError::InvalidArgumentShape(_) => ReturnCode::InvalidArguments,
            CmdError::InvalidBody(_) => ReturnCode::InvalidArguments,
            CmdError::Launch { source, .. } => {
                if source.kind() == std::io::ErrorKind::NotFound {
                    ReturnCode::NotFound
                } else {
                    ReturnCode::LaunchFailed
                }
            }
            CmdError::Timeout { .. } => ReturnCode::Timeout,
            CmdError::ScriptRootNotFound(_) => ReturnCode::InvalidArguments,
            CmdError::PathOutsideRoot(_) => ReturnCode::InvalidArguments,
            CmdError::UnknownEncoding(_) => ReturnCode::InvalidArguments,
            CmdError::IoError(_) => ReturnCode::RuntimeError,
            CmdError::RuntimeError(_) => ReturnCode::RuntimeError,
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        self.to_return_code().as_exit_code()
    }
}

/// Result type alias for invocation operations
pub type Result<T> = std::result::Result<T, CmdError>;

impl From<CmdError> for i32 {
    fn from(error: CmdError) -> Self {
        error.exit_code()
    }
}
