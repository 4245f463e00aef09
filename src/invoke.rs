//! Running a target executable from request data and classifying the result.

use crate::args::ArgumentCollector;
use crate::encoding::OutputEncoding;
use crate::error::Result;
use crate::process::{AsyncOutcome, ProcessRunner, Timeout};
use crate::quote::QuoteDialect;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// How a finished invocation should be reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    /// Exit code 0, nothing on stderr, stdout is the output
    Ok,
    /// Exit code 0, nothing on stderr, nothing on stdout
    NoContent,
    /// Non-zero exit code or stderr output; stderr is the output
    Failed,
}

/// Classified result of a completed invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeResponse {
    pub status: ResponseStatus,
    pub exit_code: i32,
    pub output: String,
}

impl InvokeResponse {
    pub fn classify(exit_code: i32, stdout: &str, stderr: &str) -> Self {
        if exit_code == 0 && stderr.is_empty() {
            let status = if stdout.is_empty() {
                ResponseStatus::NoContent
            } else {
                ResponseStatus::Ok
            };
            Self {
                status,
                exit_code,
                output: stdout.to_string(),
            }
        } else {
            Self {
                status: ResponseStatus::Failed,
                exit_code,
                output: stderr.to_string(),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status != ResponseStatus::Failed
    }
}

/// Result of the cancellable path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeOutcome {
    Completed(InvokeResponse),
    Cancelled,
}

/// One request to run a target: where, with which arguments, and how
#[derive(Debug, Clone)]
pub struct Invocation {
    program: PathBuf,
    body: Option<Value>,
    positional: Vec<String>,
    query: Vec<(String, String)>,
    raw_query: Vec<String>,
    force_quote: bool,
    timeout: Timeout,
    encoding: OutputEncoding,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            body: None,
            positional: Vec::new(),
            query: Vec::new(),
            raw_query: Vec::new(),
            force_quote: false,
            timeout: Timeout::Infinite,
            encoding: OutputEncoding::default(),
        }
    }

    /// JSON body merged ahead of every other argument
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Plain arguments placed after the body
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.positional.extend(args.into_iter().map(Into::into));
        self
    }

    /// Query-string pairs, appended last in the given order
    pub fn query_pairs<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Percent-encoded query text such as `a=1&b=two%20words`, decoded and
    /// appended after the explicit pairs
    pub fn query_string(mut self, query: impl Into<String>) -> Self {
        self.raw_query.push(query.into());
        self
    }

    pub fn force_quote(mut self, force_quote: bool) -> Self {
        self.force_quote = force_quote;
        self
    }

    pub fn timeout(mut self, timeout: Timeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn encoding(mut self, encoding: OutputEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn dialect(&self) -> QuoteDialect {
        QuoteDialect::from_path(&self.program)
    }

    /// Collected raw fragments: body, then plain arguments, then query pairs,
    /// then decoded query strings
    pub fn arguments(&self) -> Result<ArgumentCollector> {
        let mut args = ArgumentCollector::new();
        if let Some(body) = &self.body {
            args.append_structured(body)?;
        }
        args.append_all(Some(self.positional.iter().cloned()));
        args.append_key_values(self.query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        for query in &self.raw_query {
            args.append_query(query);
        }
        Ok(args)
    }

    /// The escaped command line for the target's dialect
    pub fn command_line(&self) -> Result<String> {
        Ok(self.arguments()?.render_for(self.dialect(), self.force_quote))
    }

    /// A fresh runner for this invocation
    pub fn runner(&self) -> Result<ProcessRunner> {
        let command_line = self.command_line()?;
        tracing::debug!(
            program = %self.program.display(),
            dialect = %self.dialect(),
            command_line = %command_line,
            "prepared invocation"
        );
        Ok(ProcessRunner::new(&self.program, command_line)?.with_encoding(self.encoding))
    }

    /// Run synchronously under the configured timeout
    pub fn run(&self) -> Result<InvokeResponse> {
        self.run_with(|_| Ok(()))
    }

    /// Like [`run`](Self::run), calling `on_start` once the child is running.
    /// Whatever it returns is held until the child finished.
    pub fn run_with<F, G>(&self, on_start: F) -> Result<InvokeResponse>
    where
        F: FnOnce(&ProcessRunner) -> Result<G>,
    {
        let mut runner = self.runner()?;
        runner.start()?;
        let _guard = on_start(&runner)?;
        let exit_code = runner.execute(self.timeout)?;
        Ok(classify(&runner, exit_code))
    }

    /// Run without blocking; `cancel` kills the child if triggered in time
    pub async fn run_async(&self, cancel: &CancellationToken) -> Result<InvokeOutcome> {
        let mut runner = self.runner()?;
        match runner.execute_async(cancel).await? {
            AsyncOutcome::Exited(exit_code) => {
                Ok(InvokeOutcome::Completed(classify(&runner, exit_code)))
            }
            AsyncOutcome::Cancelled => Ok(InvokeOutcome::Cancelled),
        }
    }
}

fn classify(runner: &ProcessRunner, exit_code: i32) -> InvokeResponse {
    InvokeResponse::classify(
        exit_code,
        runner.stdout().unwrap_or_default(),
        runner.stderr().unwrap_or_default(),
    )
}
