//! Child processes with a wall-clock deadline

use std::io::{self, Read};
use std::process::{Child, Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::warn;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How a bounded child run ended
#[derive(Debug)]
pub(crate) enum Completion {
    Finished(Output),
    /// Deadline passed; the child was killed and reaped
    TimedOut,
}

/// Run `command` to completion, capturing stdout and stderr.
///
/// With a deadline the child is polled and killed once the deadline passes.
/// The pipes are drained on their own threads so a chatty child cannot
/// block on a full pipe while it is being polled.
pub(crate) fn run_with_deadline(command: &mut Command, deadline: Option<Instant>) -> io::Result<Completion> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Completion::Finished(Output {
                status,
                stdout: collect(stdout),
                stderr: collect(stderr),
            }));
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            kill(&mut child);
            return Ok(Completion::TimedOut);
        }

        thread::sleep(POLL_INTERVAL);
    }
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!(pid = child.id(), error = %e, "Failed to kill timed out child");
    }
    // Reap
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader.and_then(|handle| handle.join().ok()).unwrap_or_default()
}
