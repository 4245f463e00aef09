//! Draining a child's output pipes into text buffers.
//!
//! Each pipe is consumed line by line on its own listener (a thread for the
//! blocking path, a task for the async path) so a child that fills one pipe
//! never deadlocks against a parent waiting on the other. A listener owns its
//! buffer and hands it over exactly once, when the pipe reaches end-of-file.

use crate::encoding::OutputEncoding;
use crate::error::{CmdError, Result};
use std::io::{self, BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead};
use tokio::task::JoinHandle;

/// Which pipe a drain is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

enum Listener {
    Thread(Receiver<io::Result<String>>),
    Task(JoinHandle<io::Result<String>>),
}

/// Output of one pipe: pending while its listener runs, text once drained
pub(crate) struct Drain {
    stream: Stream,
    listener: Option<Listener>,
    text: Option<String>,
}

impl Drain {
    pub(crate) fn idle(stream: Stream) -> Self {
        Self {
            stream,
            listener: None,
            text: None,
        }
    }

    /// Start a listener thread reading `pipe` until end-of-file
    pub(crate) fn spawn_thread<R>(&mut self, pipe: Option<R>, encoding: OutputEncoding) -> Result<()>
    where
        R: Read + Send + 'static,
    {
        let Some(pipe) = pipe else {
            self.text = Some(String::new());
            return Ok(());
        };

        // Capacity one: the listener never blocks handing over its buffer
        let (done, receiver) = mpsc::sync_channel(1);
        let stream = self.stream;
        thread::Builder::new()
            .name(format!("cmdbridge-{}", stream.as_str()))
            .spawn(move || {
                let result = read_lines(pipe, encoding);
                if let Err(ref e) = result {
                    tracing::warn!(stream = stream.as_str(), error = %e, "output drain failed");
                }
                let _ = done.send(result);
            })?;

        self.listener = Some(Listener::Thread(receiver));
        Ok(())
    }

    /// Start a listener task on the current tokio runtime
    pub(crate) fn spawn_task<R>(&mut self, pipe: Option<R>, encoding: OutputEncoding)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        match pipe {
            Some(pipe) => {
                let handle = tokio::spawn(read_lines_async(pipe, encoding));
                self.listener = Some(Listener::Task(handle));
            }
            None => self.text = Some(String::new()),
        }
    }

    /// Block until the listener signalled or `deadline` passed.
    ///
    /// Returns `false` on timeout; the listener keeps running and a later call
    /// resumes waiting.
    pub(crate) fn wait_blocking(&mut self, deadline: Option<Instant>) -> Result<bool> {
        if self.text.is_some() {
            return Ok(true);
        }

        let received = match &self.listener {
            Some(Listener::Thread(receiver)) => match deadline {
                None => receiver.recv().map_err(|_| self.listener_lost()),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match receiver.recv_timeout(remaining) {
                        Ok(result) => Ok(result),
                        Err(RecvTimeoutError::Timeout) => return Ok(false),
                        Err(RecvTimeoutError::Disconnected) => Err(self.listener_lost()),
                    }
                }
            },
            Some(Listener::Task(_)) => {
                return Err(CmdError::InvalidState(
                    "output is being drained by an async listener",
                ))
            }
            None => return Err(CmdError::InvalidState("output drain was never started")),
        }?;

        self.listener = None;
        self.text = Some(received?);
        Ok(true)
    }

    /// Await the listener task
    pub(crate) async fn wait_async(&mut self) -> Result<()> {
        if self.text.is_some() {
            return Ok(());
        }

        let text = match self.listener.take() {
            Some(Listener::Task(handle)) => handle.await.map_err(|e| {
                CmdError::RuntimeError(format!("{} drain task failed: {}", self.stream.as_str(), e))
            })??,
            Some(Listener::Thread(receiver)) => {
                self.listener = Some(Listener::Thread(receiver));
                return Err(CmdError::InvalidState(
                    "output is being drained by a blocking listener",
                ));
            }
            None => return Err(CmdError::InvalidState("output drain was never started")),
        };

        self.text = Some(text);
        Ok(())
    }

    /// Captured text, available only once the pipe reached end-of-file
    pub(crate) fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Stop listening. A running listener exits on its own once the pipe
    /// closes; its result is discarded.
    pub(crate) fn detach(&mut self) {
        if let Some(Listener::Task(handle)) = self.listener.take() {
            handle.abort();
        }
    }

    fn listener_lost(&self) -> CmdError {
        CmdError::RuntimeError(format!("{} listener exited without a result", self.stream.as_str()))
    }
}

fn read_lines<R: Read>(pipe: R, encoding: OutputEncoding) -> io::Result<String> {
    let mut reader = BufReader::new(pipe);
    let mut decoder = encoding.line_decoder();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        decoder.feed(&line);
    }

    Ok(decoder.finish())
}

async fn read_lines_async<R>(pipe: R, encoding: OutputEncoding) -> io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = tokio::io::BufReader::new(pipe);
    let mut decoder = encoding.line_decoder();
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        decoder.feed(&line);
    }

    Ok(decoder.finish())
}
