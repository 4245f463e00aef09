//! Run executables and batch files with correctly quoted argument strings.
//!
//! Raw argument fragments are gathered with [`ArgumentCollector`], quoted for
//! the target's command-line dialect ([`QuoteDialect`]) and handed to a
//! [`ProcessRunner`], which captures output and enforces a timeout or a
//! cancellation token.

pub mod args;
pub mod argv;
pub mod cli;
pub mod encoding;
pub mod error;
pub mod invoke;
pub mod process;
pub mod quote;
pub mod script_path;
pub mod signal;

pub use args::{ArgumentCollector, ArgumentValue};
pub use encoding::OutputEncoding;
pub use error::{CmdError, Result, ReturnCode};
pub use invoke::{Invocation, InvokeOutcome, InvokeResponse, ResponseStatus};
pub use process::{AsyncOutcome, ProcessRunner, Timeout};
pub use quote::{quote_bat_argument, quote_exe_argument, QuoteDialect};
pub use script_path::ScriptPath;
