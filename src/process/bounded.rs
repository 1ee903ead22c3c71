//! Short-lived tool commands: status queries and remote kills.
//!
//! Unlike the submit process these are expected to answer quickly. Each run
//! gets a deadline and watches a cancel token; a command that overstays
//! either is killed with its whole process group.

use std::io::{self, Read};
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use super::{force_kill, READER_DRAIN_TIMEOUT, WAIT_TICK};
use crate::cancel::CancelToken;
use crate::command::CommandSpec;

/// Bytes kept from each output stream; the rest is read and dropped.
pub const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("{program} cancelled")]
    Cancelled { program: String },
}

/// Run `spec` to completion, giving up after `timeout` or on cancellation.
pub fn run_bounded(
    spec: &CommandSpec,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<Output, CommandError> {
    let program = spec.program().to_string();
    let io_error = |source: io::Error| CommandError::Io {
        program: program.clone(),
        source,
    };

    let mut command = Command::new(spec.program());
    command
        .args(spec.args())
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command.spawn().map_err(io_error)?;
    debug!(pid = child.id(), command = %spec.masked(), "tool command started");
    let stdout = child.stdout.take().map(capture);
    let stderr = child.stderr.take().map(capture);

    let deadline = Instant::now() + timeout;
    let exit = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) => {}
            Err(e) => break Err(io_error(e)),
        }
        if cancel.is_cancelled() {
            break Err(CommandError::Cancelled {
                program: program.clone(),
            });
        }
        let now = Instant::now();
        if now >= deadline {
            break Err(CommandError::TimedOut {
                program: program.clone(),
                timeout,
            });
        }
        cancel.wait_timeout(WAIT_TICK.min(deadline - now));
    };

    let status = match exit {
        Ok(status) => status,
        Err(e) => {
            if let Err(kill_err) = force_kill(&mut child) {
                warn!(pid = child.id(), error = %kill_err, "failed to kill tool command");
            }
            let _ = child.wait();
            return Err(e);
        }
    };

    let deadline = Instant::now() + READER_DRAIN_TIMEOUT;
    Ok(Output {
        status,
        stdout: collect(stdout, deadline),
        stderr: collect(stderr, deadline),
    })
}

fn capture<R>(mut stream: R) -> JoinHandle<Vec<u8>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = (&mut stream)
            .take(MAX_CAPTURE_BYTES as u64)
            .read_to_end(&mut buf);
        let _ = io::copy(&mut stream, &mut io::sink());
        buf
    })
}

/// Output of a finished reader, or nothing if a stray descendant still holds
/// the stream open at `deadline`.
fn collect(reader: Option<JoinHandle<Vec<u8>>>, deadline: Instant) -> Vec<u8> {
    let Some(reader) = reader else {
        return Vec::new();
    };
    while !reader.is_finished() {
        if Instant::now() >= deadline {
            return Vec::new();
        }
        thread::sleep(WAIT_TICK);
    }
    reader.join().unwrap_or_default()
}
