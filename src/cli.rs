use crate::encoding::OutputEncoding;
use crate::process::Timeout;
use clap::Parser;
use std::path::PathBuf;

/// cmdbridge - run a script or executable from request-style arguments
///
/// Arguments are gathered from a JSON body, plain trailing arguments and
/// query-string style pairs, quoted for the target (native .exe or batch
/// file), and the target's output is reported the way the web front end
/// would report it.
#[derive(Parser, Debug)]
#[command(
    name = "cmdbridge",
    version,
    about = "Invoke an executable with correctly quoted request arguments",
    long_about = "Invoke a script or executable below a root directory.\n\
                  Arguments from --body, trailing values and --query pairs are quoted\n\
                  for the target's command-line parser and passed without a shell.\n\
                  On success stdout is printed; otherwise stderr is printed and the\n\
                  child's exit code is returned."
)]
pub struct Cli {
    /// Directory that scripts are resolved against
    #[arg(short = 'r', long = "root", value_name = "dir", env = "CMDBRIDGE_ROOT")]
    pub root: PathBuf,

    /// Script or executable to invoke, relative to the root
    #[arg(value_name = "script")]
    pub script: String,

    /// Query-string arguments (key=value&...), percent-decoded; an entry
    /// without '=' is positional
    #[arg(short = 'q', long = "query", value_name = "key=value", allow_hyphen_values = true)]
    pub query: Vec<String>,

    /// JSON array, object or scalar merged ahead of all other arguments
    #[arg(short = 'b', long = "body", value_name = "json")]
    pub body: Option<String>,

    /// Always surround arguments with quotes
    #[arg(short = 'Q', long = "force-quote", env = "CMDBRIDGE_FORCE_QUOTE")]
    pub force_quote: bool,

    /// Seconds to wait for the target; -1 waits forever
    #[arg(
        short = 't',
        long = "timeout",
        value_name = "seconds",
        default_value = "3600",
        env = "CMDBRIDGE_TIMEOUT",
        allow_negative_numbers = true
    )]
    pub timeout: Timeout,

    /// Encoding of the target's output
    #[arg(short = 'e', long = "encoding", value_name = "label", default_value = "utf-8")]
    pub encoding: OutputEncoding,

    /// Run on the async path; SIGINT/SIGTERM/SIGHUP kill the target
    #[arg(long = "async")]
    pub cancellable: bool,

    /// Print the rendered command line instead of running the target
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Be verbose about what you're doing
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Plain arguments placed after the body
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "args")]
    pub args: Vec<String>,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Validate the parsed arguments
    pub fn validate(&self) -> Result<(), crate::error::CmdError> {
        use crate::error::CmdError;

        if self.script.trim().is_empty() {
            return Err(CmdError::InvalidArguments(
                "No script specified".to_string(),
            ));
        }

        if !self.root.is_dir() {
            return Err(CmdError::ScriptRootNotFound(self.root.clone()));
        }

        Ok(())
    }

    /// Parse `--body` as JSON, if given
    pub fn body_value(&self) -> Result<Option<serde_json::Value>, crate::error::CmdError> {
        self.body
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(Into::into)
    }
}
