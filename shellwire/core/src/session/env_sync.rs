//! Environment Injection
//!
//! The console protocol has no side channel for metadata, so environment
//! variables are typed into the remote shell as `export` lines. The client
//! then echoes a unique marker and waits for it to come back on the output
//! channel, which shows the shell has worked through everything before it.
//!
//! # Protocol
//!
//! ```text
//! client input                          remote output
//! ───────────────────────────────────   ──────────────────────────
//!  export A='it'\''s ok'\n
//!  export B='2'\n
//!  echo shellwire-sy''nc-1700000000..\n  ... shellwire-sync-1700000000.. ✓
//! ```
//!
//! - Each line starts with a space, which keeps it out of shell history
//!   when `HISTCONTROL=ignorespace` is set
//! - The echoed marker is split by an empty quote pair, so a terminal
//!   echoing the typed line back does not count as a match
//! - The wait is bounded by one timeout; synchronization is best effort and
//!   never fails the session

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::messages::EnvVar;

/// Quote `value` for a POSIX shell
///
/// The value is wrapped in single quotes and every embedded `'` becomes
/// `'\''` (close quote, escaped quote, reopen quote).
#[must_use]
pub fn shell_single_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Input line that exports one variable
#[must_use]
pub fn export_line(var: &EnvVar) -> String {
    format!(" export {}={}\n", var.key, shell_single_quote(&var.value))
}

/// Unique token echoed to detect that the shell has caught up
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncMarker(String);

impl SyncMarker {
    /// Millisecond timestamp plus a random suffix
    #[must_use]
    pub fn generate() -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix: [u8; 4] = rand::random();
        Self(format!("shellwire-sync-{millis}-{}", hex::encode(suffix)))
    }

    /// The marker as it appears in output
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Input line that makes the shell print the marker
    #[must_use]
    pub fn echo_line(&self) -> String {
        let mut split = self.0.len() / 2;
        while !self.0.is_char_boundary(split) {
            split += 1;
        }
        let (head, tail) = self.0.split_at(split);
        format!(" echo {head}''{tail}\n")
    }
}

impl From<String> for SyncMarker {
    fn from(marker: String) -> Self {
        Self(marker)
    }
}

/// Incremental substring search over a chunked byte stream
///
/// Keeps only the last `marker.len() - 1` bytes between chunks, so memory
/// stays bounded however much output passes through.
#[derive(Debug)]
pub struct MarkerScanner {
    marker: Vec<u8>,
    carry: Vec<u8>,
    found: bool,
}

impl MarkerScanner {
    /// Create a scanner for `marker`
    #[must_use]
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.as_bytes().to_vec(),
            carry: Vec::new(),
            found: marker.is_empty(),
        }
    }

    /// Feed the next chunk; returns true once the marker has been seen
    pub fn feed(&mut self, chunk: &[u8]) -> bool {
        if self.found {
            return true;
        }

        let mut window = std::mem::take(&mut self.carry);
        window.extend_from_slice(chunk);

        if window
            .windows(self.marker.len())
            .any(|w| w == self.marker.as_slice())
        {
            self.found = true;
            return true;
        }

        let keep = self.marker.len() - 1;
        if window.len() > keep {
            window.drain(..window.len() - keep);
        }
        self.carry = window;
        false
    }

    /// Check if the marker has been seen
    #[must_use]
    pub fn found(&self) -> bool {
        self.found
    }
}

/// How a synchronization attempt ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The marker came back; the exports have taken effect
    MarkerObserved,
    /// The timeout elapsed first
    TimedOut,
    /// Output ended before the marker was seen
    ConnectionClosed,
}

/// Writes export lines and a marker echo, then waits for the marker
#[derive(Clone, Debug)]
pub struct EnvironmentSynchronizer {
    env: Vec<EnvVar>,
    marker: SyncMarker,
    timeout: Duration,
}

impl EnvironmentSynchronizer {
    /// Create a synchronizer with a freshly generated marker
    #[must_use]
    pub fn new(env: Vec<EnvVar>, timeout: Duration) -> Self {
        Self {
            env,
            marker: SyncMarker::generate(),
            timeout,
        }
    }

    /// Use a fixed marker
    #[must_use]
    pub fn with_marker(mut self, marker: SyncMarker) -> Self {
        self.marker = marker;
        self
    }

    /// The marker this synchronizer waits for
    #[must_use]
    pub fn marker(&self) -> &SyncMarker {
        &self.marker
    }

    /// Every input line, in the order it is written
    #[must_use]
    pub fn script(&self) -> Vec<String> {
        self.env
            .iter()
            .map(export_line)
            .chain(std::iter::once(self.marker.echo_line()))
            .collect()
    }

    /// Write the script through `write` and wait for the marker on `output`
    ///
    /// Completes with whichever comes first: the marker, the end of
    /// `output`, or the timeout.
    pub async fn run<W>(
        &self,
        mut write: W,
        output: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> SyncOutcome
    where
        W: FnMut(&[u8]),
    {
        let started = Instant::now();
        for line in self.script() {
            write(line.as_bytes());
        }
        debug!(vars = self.env.len(), "Environment injected, waiting for marker");

        let mut scanner = MarkerScanner::new(self.marker.as_str());
        let observe = async {
            while let Some(chunk) = output.recv().await {
                if scanner.feed(&chunk) {
                    return SyncOutcome::MarkerObserved;
                }
            }
            SyncOutcome::ConnectionClosed
        };

        let outcome = tokio::time::timeout(self.timeout, observe)
            .await
            .unwrap_or(SyncOutcome::TimedOut);

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            SyncOutcome::MarkerObserved => {
                info!(elapsed_ms, "Environment synchronized");
            }
            SyncOutcome::TimedOut => {
                warn!(
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "Environment marker not seen, continuing"
                );
            }
            SyncOutcome::ConnectionClosed => {
                debug!(elapsed_ms, "Output ended during environment synchronization");
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_quote_escaping() {
        assert_eq!(shell_single_quote("plain"), "'plain'");
        assert_eq!(shell_single_quote(""), "''");
        assert_eq!(shell_single_quote("it's ok"), r"'it'\''s ok'");
        assert_eq!(shell_single_quote("$HOME `x`"), "'$HOME `x`'");
    }

    #[test]
    fn test_export_line() {
        let line = export_line(&EnvVar::new("A", "it's ok"));
        assert_eq!(line, " export A='it'\\''s ok'\n");
        assert!(line.starts_with(' '));
    }

    #[test]
    fn test_export_line_replays_through_shell() {
        let line = export_line(&EnvVar::new("A", "it's ok"));
        let script = format!("{}; printf '%s' \"$A\"", line.trim_end());
        let Ok(output) = std::process::Command::new("sh").arg("-c").arg(script).output() else {
            // No POSIX shell available
            return;
        };
        assert_eq!(String::from_utf8_lossy(&output.stdout), "it's ok");
    }

    #[test]
    fn test_marker_is_unique() {
        let a = SyncMarker::generate();
        let b = SyncMarker::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("shellwire-sync-"));
    }

    #[test]
    fn test_echo_line_does_not_contain_marker() {
        let marker = SyncMarker::generate();
        let line = marker.echo_line();
        assert!(line.starts_with(" echo "));
        assert!(line.ends_with('\n'));
        assert!(!line.contains(marker.as_str()));
        assert_eq!(line.replace("''", "").trim(), format!("echo {}", marker.as_str()));
    }

    #[test]
    fn test_echo_line_splits_on_char_boundary() {
        for raw in ["é", "ab€cd", "sync-ünïcode-marker"] {
            let marker = SyncMarker::from(raw.to_string());
            let line = marker.echo_line();
            assert_eq!(line.replace("''", "").trim(), format!("echo {raw}"));
        }
    }

    #[test]
    fn test_scanner_across_chunk_boundaries() {
        let mut scanner = MarkerScanner::new("MARKER");
        assert!(!scanner.feed(b"noise MAR"));
        assert!(!scanner.feed(b"K"));
        assert!(scanner.feed(b"ER\r\n$ "));
        assert!(scanner.found());
        assert!(scanner.feed(b"anything"));
    }

    #[test]
    fn test_scanner_ignores_split_echo() {
        let mut scanner = MarkerScanner::new("MARKER");
        assert!(!scanner.feed(b"$ echo MAR''KER\r\n"));
        assert!(scanner.feed(b"MARKER\r\n"));
    }

    #[test]
    fn test_scanner_carry_is_bounded() {
        let mut scanner = MarkerScanner::new("MARKER");
        for _ in 0..100 {
            scanner.feed(&[b'x'; 1024]);
        }
        assert!(scanner.carry.len() < "MARKER".len());
    }

    #[tokio::test]
    async fn test_run_writes_script_and_observes_marker() {
        let sync = EnvironmentSynchronizer::new(
            vec![EnvVar::new("A", "1"), EnvVar::new("B", "it's")],
            Duration::from_secs(2),
        )
        .with_marker(SyncMarker::from("MARK-123".to_string()));

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut written = Vec::new();
        let outcome = {
            let tx = tx.clone();
            sync.run(
                |bytes| {
                    let line = String::from_utf8_lossy(bytes).into_owned();
                    // Emulate a shell that echoes input, then runs the echo
                    let _ = tx.send(line.clone().into_bytes());
                    if line.starts_with(" echo ") {
                        let _ = tx.send(b"MARK-123\r\n".to_vec());
                    }
                    written.push(line);
                },
                &mut rx,
            )
            .await
        };

        assert_eq!(outcome, SyncOutcome::MarkerObserved);
        assert_eq!(
            written,
            vec![
                " export A='1'\n".to_string(),
                " export B='it'\\''s'\n".to_string(),
                " echo MARK''-123\n".to_string(),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out_when_marker_never_appears() {
        let sync = EnvironmentSynchronizer::new(vec![EnvVar::new("A", "1")], Duration::from_secs(3));
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let started = Instant::now();
        let outcome = sync.run(|_| {}, &mut rx).await;

        assert_eq!(outcome, SyncOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
        drop(tx);
    }

    #[tokio::test]
    async fn test_run_stops_when_output_ends() {
        let sync = EnvironmentSynchronizer::new(vec![EnvVar::new("A", "1")], Duration::from_secs(30));
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        drop(tx);

        let outcome = sync.run(|_| {}, &mut rx).await;
        assert_eq!(outcome, SyncOutcome::ConnectionClosed);
    }
}
