//! Spawning and supervising one sampler subprocess per watched pid.
//!
//! The sampler runs `pidstat` against a single pid and its full stdout is
//! captured in one piece; parsing happens afterwards in [`crate::series`].
//! On shutdown the subprocess gets SIGTERM and whatever it managed to write
//! is kept.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::config::SamplerConfig;
use crate::signals::StopToken;

pub enum SamplerError {
    /// The sampler binary is not installed at the configured path.
    Missing { path: PathBuf },
    Spawn { source: io::Error },
    Capture { source: io::Error },
    Wait { source: io::Error },
}

impl fmt::Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerError::Missing { path } => {
                write!(f, "sampler command {} not found", path.display())
            }
            SamplerError::Spawn { source } => write!(f, "failed to spawn sampler: {source}"),
            SamplerError::Capture { source } => {
                write!(f, "failed to capture sampler output: {source}")
            }
            SamplerError::Wait { source } => {
                write!(f, "failed waiting for sampler to exit: {source}")
            }
        }
    }
}

impl fmt::Debug for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl std::error::Error for SamplerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SamplerError::Missing { .. } => None,
            SamplerError::Spawn { source }
            | SamplerError::Capture { source }
            | SamplerError::Wait { source } => Some(source),
        }
    }
}

/// A ready-to-spawn sampler invocation, shared by every watch task.
#[derive(Debug, Clone)]
pub struct SamplerCommand {
    program: PathBuf,
    interval_secs: u64,
    max_samples: u32,
}

impl SamplerCommand {
    pub fn from_config(config: &SamplerConfig) -> Self {
        Self {
            program: config.command.clone(),
            interval_secs: config.interval_secs,
            max_samples: config.max_samples,
        }
    }

    /// Verify the sampler binary exists before any watch task spawns.
    pub fn preflight(&self) -> Result<(), SamplerError> {
        if !self.program.is_file() {
            return Err(SamplerError::Missing {
                path: self.program.clone(),
            });
        }
        Ok(())
    }

    /// Argument vector for sampling `pid`: CPU, disk and memory stats,
    /// horizontal rows, one row per interval.
    fn build_args(&self, pid: i32) -> Vec<String> {
        vec![
            "-p".to_string(),
            pid.to_string(),
            "-u".to_string(),
            "-d".to_string(),
            "-r".to_string(),
            "-h".to_string(),
            "-l".to_string(),
            self.interval_secs.to_string(),
            self.max_samples.to_string(),
        ]
    }

    /// Run the sampler against `pid` until it exits or a stop is requested,
    /// returning everything it wrote to stdout.
    ///
    /// On stop the subprocess is sent SIGTERM and its remaining output is
    /// drained, so a truncated capture still yields the samples taken so far.
    pub async fn sample(&self, pid: i32, stop: &mut StopToken) -> Result<String, SamplerError> {
        let args = self.build_args(pid);
        tracing::info!(pid, command = %self.program.display(), "starting sampler");
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SamplerError::Spawn { source })?;

        let mut stdout = child.stdout.take().ok_or_else(|| SamplerError::Capture {
            source: io::Error::other("sampler stdout was not piped"),
        })?;

        let mut raw = String::new();
        let read = stdout.read_to_string(&mut raw);
        tokio::pin!(read);

        let stopped = tokio::select! {
            result = &mut read => {
                result.map_err(|source| SamplerError::Capture { source })?;
                false
            }
            _ = stop.cancelled() => true,
        };

        if stopped {
            if let Some(child_pid) = child.id() {
                terminate(child_pid as i32);
            }
            // Drain to EOF so partial rows written around the signal land in
            // the capture instead of being lost with the pipe.
            (&mut read)
                .await
                .map_err(|source| SamplerError::Capture { source })?;
        }

        let status = child
            .wait()
            .await
            .map_err(|source| SamplerError::Wait { source })?;
        tracing::info!(pid, exit = %status, bytes = raw.len(), "sampler finished");
        Ok(raw)
    }
}

/// Send SIGTERM to a sampler. Losing the race against natural exit is fine.
fn terminate(pid: i32) {
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => tracing::debug!(pid, "sent SIGTERM to sampler"),
        Err(Errno::ESRCH) => tracing::debug!(pid, "sampler already exited"),
        Err(e) => tracing::warn!(pid, error = %e, "failed to signal sampler"),
    }
}
