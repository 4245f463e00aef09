//! Reacting to termination signals while a target runs.
//!
//! On Unix a watcher thread listens for SIGINT, SIGTERM and SIGHUP. The async
//! path cancels a token on the first one, which kills a child started through
//! `execute_async`. The blocking path forwards the signal to the child's
//! process group instead. Elsewhere the watcher is inert.

use crate::error::Result;
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
pub use unix::SignalWatcher;

#[cfg(not(unix))]
pub use fallback::SignalWatcher;

/// Signals that cancel an in-flight invocation
#[cfg(unix)]
pub const TERMINATION_SIGNALS: &[i32] = &[
    signal_hook::consts::SIGINT,
    signal_hook::consts::SIGTERM,
    signal_hook::consts::SIGHUP,
];

/// Cancel `token` when a termination signal arrives
pub fn cancel_on_termination(token: CancellationToken) -> Result<SignalWatcher> {
    #[cfg(unix)]
    {
        SignalWatcher::watch(token, TERMINATION_SIGNALS)
    }
    #[cfg(not(unix))]
    {
        drop(token);
        Ok(SignalWatcher::inert())
    }
}

/// Forward the first termination signal to the process group led by `pid`
pub fn forward_termination(pid: u32) -> Result<SignalWatcher> {
    #[cfg(unix)]
    {
        SignalWatcher::forward(pid, TERMINATION_SIGNALS)
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        Ok(SignalWatcher::inert())
    }
}

#[cfg(unix)]
mod unix {
    use crate::error::{CmdError, Result};
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    use signal_hook::iterator::{Handle, Signals};
    use std::thread::{self, JoinHandle};
    use tokio_util::sync::CancellationToken;

    /// Background listener; stops listening when dropped
    pub struct SignalWatcher {
        handle: Handle,
        thread: Option<JoinHandle<()>>,
    }

    impl SignalWatcher {
        /// Register `signals` and cancel `token` on the first delivery
        pub fn watch(token: CancellationToken, signals: &[i32]) -> Result<Self> {
            Self::on_first(signals, move |_| token.cancel())
        }

        /// Register `signals` and re-send the first delivery to group `pid`
        pub fn forward(pid: u32, signals: &[i32]) -> Result<Self> {
            Self::on_first(signals, move |signal| {
                let forwarded = Signal::try_from(signal)
                    .and_then(|signal| killpg(Pid::from_raw(pid as i32), signal));
                if let Err(e) = forwarded {
                    tracing::warn!(pid, error = %e, "failed to forward signal to child");
                }
            })
        }

        fn on_first<F>(signals: &[i32], action: F) -> Result<Self>
        where
            F: FnOnce(i32) + Send + 'static,
        {
            let mut signals = Signals::new(signals).map_err(|e| {
                CmdError::RuntimeError(format!("Failed to register signal handlers: {}", e))
            })?;
            let handle = signals.handle();

            let thread = thread::Builder::new()
                .name("cmdbridge-signals".to_string())
                .spawn(move || {
                    if let Some(signal) = signals.forever().next() {
                        let name = Signal::try_from(signal)
                            .map(|s| s.as_str())
                            .unwrap_or("unknown");
                        tracing::info!(signal = name, "signal received");
                        action(signal);
                    }
                })?;

            Ok(Self {
                handle,
                thread: Some(thread),
            })
        }
    }

    impl Drop for SignalWatcher {
        fn drop(&mut self) {
            self.handle.close();
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }
}

#[cfg(not(unix))]
mod fallback {
    pub struct SignalWatcher {
        _private: (),
    }

    impl SignalWatcher {
        pub(crate) fn inert() -> Self {
            Self { _private: () }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn signal_cancels_token() {
        let token = CancellationToken::new();
        let watcher = SignalWatcher::watch(token.clone(), &[signal_hook::consts::SIGUSR1]).unwrap();

        signal_hook::low_level::raise(signal_hook::consts::SIGUSR1).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !token.is_cancelled() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(token.is_cancelled());
        drop(watcher);
    }

    #[test]
    fn forwards_signal_to_child_group() {
        use std::os::unix::process::{CommandExt, ExitStatusExt};

        let mut child = std::process::Command::new("/bin/sleep")
            .arg("30")
            .process_group(0)
            .spawn()
            .unwrap();
        let watcher = SignalWatcher::forward(child.id(), &[signal_hook::consts::SIGUSR1]).unwrap();

        signal_hook::low_level::raise(signal_hook::consts::SIGUSR1).unwrap();

        let status = child.wait().unwrap();
        drop(watcher);
        assert_eq!(status.signal(), Some(signal_hook::consts::SIGUSR1));
    }

    #[test]
    fn dropping_watcher_stops_thread() {
        let token = CancellationToken::new();
        let watcher = SignalWatcher::watch(token.clone(), &[signal_hook::consts::SIGUSR2]).unwrap();
        drop(watcher);
        assert!(!token.is_cancelled());
    }
}
