use anyhow::Context;
use cmdbridge::cli::Cli;
use cmdbridge::error::{CmdError, ReturnCode};
use cmdbridge::invoke::{Invocation, InvokeOutcome, InvokeResponse, ResponseStatus};
use cmdbridge::script_path::ScriptPath;
use cmdbridge::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    // Parse command line arguments
    let args = Cli::parse_args();

    init_tracing(args.verbose);

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("cmdbridge: {}", e);
        eprintln!("Use \"cmdbridge -h\" to get help");
        return e.exit_code();
    }

    match run_program(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("cmdbridge: {:#}", e);
            exit_code_for(&e)
        }
    }
}

/// `RUST_LOG` wins; otherwise `-v` turns on debug output for this crate
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "cmdbridge=warn",
        1 => "cmdbridge=debug",
        _ => "cmdbridge=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Resolve the target, run it and report the result
fn run_program(args: &Cli) -> anyhow::Result<i32> {
    let scripts = ScriptPath::new(&args.root).context("resolving script root")?;
    let program = scripts
        .full_path(&args.script)
        .with_context(|| format!("resolving script {:?}", args.script))?;

    let mut invocation = Invocation::new(program)
        .args(args.args.iter().cloned())
        .force_quote(args.force_quote)
        .timeout(args.timeout)
        .encoding(args.encoding);
    for query in &args.query {
        invocation = invocation.query_string(query.as_str());
    }
    if let Some(body) = args.body_value().context("parsing --body")? {
        invocation = invocation.body(body);
    }

    if args.dry_run {
        println!("{}", invocation.command_line()?);
        return Ok(ReturnCode::NoError.as_exit_code());
    }

    tracing::info!(
        program = %invocation.program().display(),
        timeout = %args.timeout,
        cancellable = args.cancellable,
        "invoking"
    );

    if !args.cancellable {
        let response = invocation.run_with(|runner| {
            runner.id().map(signal::forward_termination).transpose()
        })?;
        return Ok(report(&response));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?;
    let token = CancellationToken::new();
    let _watcher = signal::cancel_on_termination(token.clone())?;

    match runtime.block_on(invocation.run_async(&token))? {
        InvokeOutcome::Completed(response) => Ok(report(&response)),
        InvokeOutcome::Cancelled => {
            eprintln!("cmdbridge: cancelled");
            Ok(ReturnCode::Cancelled.as_exit_code())
        }
    }
}

/// Print the classified output and pick the process exit code
fn report(response: &InvokeResponse) -> i32 {
    tracing::debug!(
        status = ?response.status,
        exit_code = response.exit_code,
        "target finished"
    );
    match response.status {
        ResponseStatus::Ok => {
            print!("{}", response.output);
            response.exit_code
        }
        ResponseStatus::NoContent => response.exit_code,
        ResponseStatus::Failed => {
            eprint!("{}", response.output);
            if response.exit_code == 0 {
                ReturnCode::ChildFailed.as_exit_code()
            } else {
                response.exit_code
            }
        }
    }
}

fn exit_code_for(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<CmdError>()
        .map(CmdError::exit_code)
        .unwrap_or_else(|| ReturnCode::RuntimeError.as_exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_with_zero_exit_still_fails() {
        let response = InvokeResponse::classify(0, "", "warning\n");
        assert_eq!(report(&response), 1);
    }

    #[test]
    fn child_exit_code_is_forwarded() {
        assert_eq!(report(&InvokeResponse::classify(7, "", "")), 7);
        assert_eq!(report(&InvokeResponse::classify(0, "", "")), 0);
    }

    #[test]
    fn library_errors_keep_their_exit_code() {
        let err = anyhow::Error::from(CmdError::PathOutsideRoot("../x".into()))
            .context("resolving script");
        assert_eq!(exit_code_for(&err), ReturnCode::InvalidArguments.as_exit_code());

        let other = anyhow::anyhow!("something else");
        assert_eq!(exit_code_for(&other), ReturnCode::RuntimeError.as_exit_code());
    }
}
