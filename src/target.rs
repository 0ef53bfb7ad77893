//! Watch-target resolution: pids checked for liveness, command-line patterns
//! matched against the process table, both retried until the target appears.

use std::fmt;
use std::time::Duration;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use regex::Regex;
use sysinfo::System;

use crate::config::ResolverConfig;
use crate::console::Console;
use crate::signals::StopToken;

/// A process to watch, as named on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchTarget {
    /// An already-known process id.
    Pid(i32),
    /// A regex fragment matched anywhere in a process's command line.
    Pattern(String),
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchTarget::Pid(pid) => write!(f, "pid {pid}"),
            WatchTarget::Pattern(pattern) => write!(f, "pattern \"{pattern}\""),
        }
    }
}

/// Merge the two CLI target lists, pids first. Blank pattern entries are
/// dropped so trailing commas in the argument list stay harmless.
pub fn collect_targets(pids: &[i32], patterns: &[String]) -> Vec<WatchTarget> {
    let mut targets: Vec<WatchTarget> = pids.iter().map(|&pid| WatchTarget::Pid(pid)).collect();
    targets.extend(
        patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| WatchTarget::Pattern(p.to_string())),
    );
    targets
}

/// Probe a pid with the null signal. Only a clean probe counts as alive;
/// EPERM means we could not sample it anyway.
pub fn pid_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

pub enum ResolveError {
    /// Target never appeared within the configured retry budget.
    NotFound { attempts: u32 },
    /// Shutdown was requested while still waiting.
    Cancelled,
    /// The user-supplied pattern is not a valid regex.
    Pattern(regex::Error),
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::NotFound { attempts } => {
                write!(f, "target not found after {attempts} attempts")
            }
            ResolveError::Cancelled => write!(f, "stop requested before target appeared"),
            ResolveError::Pattern(e) => write!(f, "invalid match pattern: {e}"),
        }
    }
}

impl fmt::Debug for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl std::error::Error for ResolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResolveError::Pattern(e) => Some(e),
            _ => None,
        }
    }
}

/// Matches a command-line pattern against the process table, excluding the
/// watcher's own process so a pattern like `python` cannot latch onto us.
pub struct PatternMatcher {
    pattern: Regex,
    own: Regex,
    own_pid: u32,
}

impl PatternMatcher {
    /// Build a matcher for `pattern`, taken as a regex fragment and matched
    /// anywhere in the command line.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let own_name = std::env::args().next().unwrap_or_default();
        Self::with_identity(pattern, &own_name, std::process::id())
    }

    fn with_identity(pattern: &str, own_name: &str, own_pid: u32) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(&format!(".*{pattern}.*"))?,
            own: Regex::new(&format!(".*{}.*", regex::escape(own_name)))?,
            own_pid,
        })
    }

    /// Scan the live process table for the first match, lowest pid first.
    pub fn find_pid(&self) -> Option<i32> {
        let system = System::new_all();
        let mut procs: Vec<(u32, String)> = system
            .processes()
            .iter()
            .filter(|(_, proc)| !proc.cmd().is_empty())
            .map(|(pid, proc)| {
                let cmdline = proc
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" ");
                (pid.as_u32(), cmdline)
            })
            .collect();
        procs.sort_by_key(|(pid, _)| *pid);
        self.first_match(procs)
    }

    /// Pick the first candidate whose command line matches the pattern and
    /// is not this watcher itself.
    fn first_match<I>(&self, candidates: I) -> Option<i32>
    where
        I: IntoIterator<Item = (u32, String)>,
    {
        for (pid, cmdline) in candidates {
            if pid == self.own_pid || self.own.is_match(&cmdline) {
                continue;
            }
            if self.pattern.is_match(&cmdline) {
                return Some(pid as i32);
            }
        }
        None
    }
}

/// Retries target resolution on a fixed interval until the target shows up,
/// the retry budget runs out, or shutdown is requested.
#[derive(Clone)]
pub struct TargetResolver {
    max_attempts: u32,
    poll_interval: Duration,
}

impl TargetResolver {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    /// Resolve `target` to a live pid, reporting progress on the console
    /// under `label`.
    pub async fn resolve(
        &self,
        target: &WatchTarget,
        console: &Console,
        label: &str,
        stop: &mut StopToken,
    ) -> Result<i32, ResolveError> {
        let matcher = match target {
            WatchTarget::Pattern(pattern) => {
                Some(PatternMatcher::new(pattern).map_err(ResolveError::Pattern)?)
            }
            WatchTarget::Pid(_) => None,
        };

        let mut attempts = 0u32;
        loop {
            if stop.is_stopped() {
                return Err(ResolveError::Cancelled);
            }
            let found = match target {
                WatchTarget::Pid(pid) => pid_alive(*pid).then_some(*pid),
                WatchTarget::Pattern(_) => matcher.as_ref().and_then(PatternMatcher::find_pid),
            };
            if let Some(pid) = found {
                console.line(label, &format!("found process pid {pid}"));
                return Ok(pid);
            }
            attempts += 1;
            if attempts >= self.max_attempts {
                console.line(label, &format!("{target} not found after {attempts} attempts"));
                return Err(ResolveError::NotFound { attempts });
            }
            console.line(label, &format!("waiting for {target}"));
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = stop.cancelled() => return Err(ResolveError::Cancelled),
            }
        }
    }
}
