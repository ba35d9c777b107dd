//! Running external engines and encoders as child processes.

use crate::error::SynthError;
use std::io::{ErrorKind, Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

/// Runs `program` with `args`, feeding `input` on stdin, and returns its stdout.
///
/// The child is killed if it outlives `timeout`. Any failure (missing binary,
/// non-zero exit, timeout) is reported as a `SynthError::Synthesis` with a
/// readable description.
pub fn run(
    program: &str,
    args: &[String],
    input: Option<&str>,
    timeout: Duration,
) -> Result<Vec<u8>, SynthError> {
    debug!(program, ?args, "spawning engine process");

    let mut child = Command::new(program)
        .args(args)
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => SynthError::Synthesis(format!("{} is not installed", program)),
            _ => SynthError::Synthesis(format!("failed to start {}: {}", program, e)),
        })?;

    // Drain both pipes on their own threads so a chatty child never blocks
    // on a full pipe while we wait on it.
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    if let (Some(text), Some(mut stdin)) = (input, child.stdin.take()) {
        if let Err(e) = stdin.write_all(text.as_bytes()) {
            if e.kind() != ErrorKind::BrokenPipe {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SynthError::Synthesis(format!(
                    "failed to write to {}: {}",
                    program, e
                )));
            }
        }
        // stdin is dropped here, closing the pipe
    }

    let status = match child.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SynthError::Synthesis(format!(
                "{} timed out after {}s",
                program,
                timeout.as_secs()
            )));
        }
    };

    let out = stdout.map(join).unwrap_or_default();
    let err = stderr.map(join).unwrap_or_default();

    if status.success() {
        Ok(out)
    } else {
        Err(SynthError::Synthesis(format!(
            "{} failed ({}): {}",
            program,
            status,
            String::from_utf8_lossy(&err).trim()
        )))
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join(handle: thread::JoinHandle<Vec<u8>>) -> Vec<u8> {
    handle.join().unwrap_or_default()
}
