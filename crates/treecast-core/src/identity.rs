//! Peer identity and per-process serial numbers.
//!
//! An identity is `username@hostname` and names one peer session. Serial
//! numbers tag the successive messages a session sends; together they form
//! the correlation key `identity:serial`.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::wire::WireError;

/// `username@hostname`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    pub username: String,
    pub hostname: String,
}

impl Identity {
    pub fn new(username: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            hostname: hostname.into(),
        }
    }

    /// Identity of the running process: `$USER` (or `$USERNAME`) at the
    /// system hostname. Either half can be overridden by the caller.
    pub fn detect(username: Option<&str>, hostname: Option<&str>) -> Self {
        let username = username
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .unwrap_or_else(|| "anonymous".to_string());

        let hostname = hostname
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .or_else(|| {
                nix::unistd::gethostname()
                    .ok()
                    .and_then(|h| h.into_string().ok())
            })
            .unwrap_or_else(|| "localhost".to_string());

        Self { username, hostname }
    }

    /// Correlation key for a message this identity sent with `serial`.
    pub fn key(&self, serial: u64) -> String {
        format!("{}:{}", self, serial)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.hostname)
    }
}

impl FromStr for Identity {
    type Err = WireError;

    /// Splits on the first `@`. Both halves must be non-empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            Some((user, host)) if !user.is_empty() && !host.is_empty() => {
                Ok(Identity::new(user, host))
            }
            _ => Err(WireError::BadIdentity(s.to_string())),
        }
    }
}

/// Serial numbers: milliseconds elapsed since this generator was created.
///
/// Two messages built in the same millisecond would share a serial and so
/// collide on their correlation key. The generator never hands out the same
/// value twice: a collision is bumped to `last + 1`.
#[derive(Debug)]
pub struct SerialNumbers {
    origin: Instant,
    last: AtomicU64,
}

impl SerialNumbers {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            last: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> u64 {
        let elapsed = self.origin.elapsed().as_millis() as u64;
        let mut current = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = elapsed.max(current + 1);
            match self.last.compare_exchange_weak(
                current,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(observed) => current = observed,
            }
        }
    }
}

impl Default for SerialNumbers {
    fn default() -> Self {
        Self::new()
    }
}
