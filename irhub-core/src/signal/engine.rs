//! IR hardware engine (C4): a thin, blocking wrapper around the `ir-ctl`
//! subprocess used to receive and transmit raw pulse trains.
//!
//! Grounded on `original_source/backend/electronics/ir_ctl_engine.py`:
//! `receive_one_message` shells out to
//! `ir-ctl -d <device> --receive=<path> --one-shot [--wideband]` and reads
//! the captured file back; `send_pulse_space_files` shells out to
//! `ir-ctl -d <device> [--gap=..] [--carrier=..] [--duty-cycle=..]
//! [--emitters=..] --send=<path> [--send=<path> ...]` with one `--send`
//! per file. Both block on the subprocess (matching the original's
//! blocking `subprocess.run`); callers on an async runtime dispatch this
//! through `tokio::task::spawn_blocking`. Neither method parses the
//! captured text; that happens one layer up (wherever the raw capture is
//! consumed), mirroring the original, which only ever returns
//! `(raw, stdout, stderr)`/`(stdout, stderr)` and leaves parsing to its
//! caller.

use std::io::{Read, Write};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use crate::error::DomainError;
use crate::signal::codec::encode_pulses;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Wraps one `ir-ctl`-controlled IR transceiver device.
#[derive(Clone, Debug)]
pub struct IrHardwareEngine {
  pub device: String,
}

impl IrHardwareEngine {
  pub fn new(device: impl Into<String>) -> Self {
    Self { device: device.into() }
  }

  /// Captures a single IR frame, blocking until one is received or
  /// `timeout_ms` elapses. Returns `(raw_text, stdout, stderr)`: the raw
  /// capture file contents, unparsed, plus whatever `ir-ctl` wrote to its
  /// own stdout/stderr streams.
  pub fn receive_one_message(&self, timeout_ms: u64, wideband: bool) -> Result<(String, String, String), DomainError> {
    let capture_file = NamedTempFile::new().map_err(|e| DomainError::engine_failure(format!("failed to create capture file: {e}")))?;
    let capture_path = capture_file.path().to_owned();

    let mut command = Command::new("ir-ctl");
    command.arg("-d").arg(&self.device).arg(format!("--receive={}", capture_path.display())).arg("--one-shot");
    if wideband {
      command.arg("--wideband");
    }
    command.stdout(Stdio::piped()).stderr(Stdio::piped());

    let child = command.spawn().map_err(|e| DomainError::engine_failure(format!("failed to spawn ir-ctl: {e}")))?;
    let (outcome, stdout, stderr) = wait_with_timeout(child, Duration::from_millis(timeout_ms))?;
    let detail = if !stderr.trim().is_empty() { stderr.trim() } else { stdout.trim() };

    match outcome {
      WaitOutcome::TimedOut => {
        return Err(DomainError::timeout("receive_timeout", format!("timed out waiting for an IR frame: {detail}")));
      }
      WaitOutcome::Exited(status) if !status.success() => {
        return Err(DomainError::engine_failure(detail.to_owned()));
      }
      WaitOutcome::Exited(_) => {}
    }

    let mut raw = String::new();
    std::fs::File::open(&capture_path)
      .and_then(|mut f| f.read_to_string(&mut raw))
      .map_err(|e| DomainError::engine_failure(format!("failed to read capture file: {e}")))?;

    if raw.trim().is_empty() {
      return Err(DomainError::timeout("receive_timeout", format!("ir-ctl produced no data before timing out: {detail}")));
    }

    Ok((raw, stdout, stderr))
  }

  /// Sends `files` (already-normalized pulse trains) in order, as one
  /// `ir-ctl` invocation with one `--send=` flag per file. Returns the
  /// captured `(stdout, stderr)`.
  pub fn send_pulse_space_files(
    &self,
    files: &[&[i64]],
    gap_us: Option<i64>,
    carrier_hz: Option<u32>,
    duty_cycle: Option<u8>,
    emitters: Option<&str>,
  ) -> Result<(String, String), DomainError> {
    if files.is_empty() {
      return Err(DomainError::validation("no files to send"));
    }

    let mut temp_files = Vec::with_capacity(files.len());
    for pulses in files {
      let mut tmp = NamedTempFile::new().map_err(|e| DomainError::engine_failure(format!("failed to create send file: {e}")))?;
      let text = encode_pulses(pulses)?;
      tmp.write_all(text.as_bytes()).map_err(|e| DomainError::engine_failure(format!("failed to write send file: {e}")))?;
      temp_files.push(tmp);
    }

    let mut command = Command::new("ir-ctl");
    command.arg("-d").arg(&self.device);
    if let Some(gap) = gap_us {
      command.arg(format!("--gap={gap}"));
    }
    if let Some(carrier) = carrier_hz {
      command.arg(format!("--carrier={carrier}"));
    }
    if let Some(duty) = duty_cycle {
      command.arg(format!("--duty-cycle={duty}"));
    }
    if let Some(emitters) = emitters {
      command.arg(format!("--emitters={emitters}"));
    }
    for tmp in &temp_files {
      command.arg(format!("--send={}", tmp.path().display()));
    }
    command.stdout(Stdio::piped()).stderr(Stdio::piped());

    let child = command.spawn().map_err(|e| DomainError::engine_failure(format!("failed to spawn ir-ctl: {e}")))?;
    let (outcome, stdout, stderr) = wait_with_timeout(child, Duration::from_secs(30))?;
    let detail = if !stderr.trim().is_empty() { stderr.trim() } else { stdout.trim() };
    match outcome {
      WaitOutcome::TimedOut => Err(DomainError::engine_failure(format!("ir-ctl send did not complete in time: {detail}"))),
      WaitOutcome::Exited(status) if !status.success() => Err(DomainError::engine_failure(detail.to_owned())),
      WaitOutcome::Exited(_) => Ok((stdout, stderr)),
    }
  }
}

enum WaitOutcome {
  Exited(std::process::ExitStatus),
  TimedOut,
}

/// Polls `child` to completion or `timeout`, concurrently draining its
/// piped stdout/stderr on reader threads so a chatty subprocess can't
/// deadlock on a full pipe buffer while we wait.
fn wait_with_timeout(mut child: Child, timeout: Duration) -> Result<(WaitOutcome, String, String), DomainError> {
  let stdout: Option<ChildStdout> = child.stdout.take();
  let stderr: Option<ChildStderr> = child.stderr.take();
  let stdout_reader = std::thread::spawn(move || read_all(stdout));
  let stderr_reader = std::thread::spawn(move || read_all(stderr));

  let deadline = Instant::now() + timeout;
  let outcome = loop {
    match child.try_wait() {
      Ok(Some(status)) => break WaitOutcome::Exited(status),
      Ok(None) => {
        if Instant::now() >= deadline {
          let _ = child.kill();
          let _ = child.wait();
          break WaitOutcome::TimedOut;
        }
        std::thread::sleep(POLL_INTERVAL);
      }
      Err(e) => return Err(DomainError::engine_failure(format!("failed to poll ir-ctl: {e}"))),
    }
  };

  let stdout = stdout_reader.join().unwrap_or_default();
  let stderr = stderr_reader.join().unwrap_or_default();
  Ok((outcome, stdout, stderr))
}

fn read_all<R: Read>(stream: Option<R>) -> String {
  let mut buf = String::new();
  if let Some(mut stream) = stream {
    let _ = stream.read_to_string(&mut buf);
  }
  buf
}
