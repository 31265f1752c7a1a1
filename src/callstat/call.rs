//! Timing records for local and remote calls.

use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Information about a single call and the calls it made.
#[derive(Debug, Clone)]
pub struct Call {
    /// Name of the operation, e.g. `Client.Backlog`.
    pub description: &'static str,
    /// Time at which the call started.
    pub start: Instant,
    /// Time at which the call ended. `None` while the call is running.
    pub end: Option<Instant>,
    /// Error returned by an unsuccessful call.
    pub error: Option<Error>,
    /// Calls made on behalf of this one, in the order they were made.
    pub subcalls: Vec<Call>,
}

impl Call {
    /// Start a new call record at the current time.
    pub fn begin(description: &'static str) -> Self {
        Self {
            description,
            start: Instant::now(),
            end: None,
            error: None,
            subcalls: Vec::new(),
        }
    }

    /// Record the end time and outcome of the call.
    pub fn complete<T>(&mut self, result: &Result<T>) {
        self.end = Some(Instant::now());
        self.error = result.as_ref().err().cloned();
    }

    /// Attach a sub-call.
    pub fn add(&mut self, subcall: Call) {
        self.subcalls.push(subcall);
    }

    /// Total time taken by the call, if it has completed.
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end.duration_since(self.start))
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.description, indent = depth * 2)?;
        match self.duration() {
            Some(d) => write!(f, " {:?}", d)?,
            None => write!(f, " (running)")?,
        }
        if let Some(err) = &self.error {
            write!(f, " error: {}", err)?;
        }
        for sub in &self.subcalls {
            writeln!(f)?;
            sub.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_call_timing() {
        let mut call = Call::begin("Client.Backlog");
        assert!(call.duration().is_none());

        let mut sub = Call::begin("Endpoint.Vector");
        tokio::time::sleep(Duration::from_millis(40)).await;
        sub.complete(&Ok::<_, Error>(()));
        call.add(sub);

        tokio::time::sleep(Duration::from_millis(10)).await;
        call.complete(&Err::<(), _>(Error::Unavailable("host".into())));

        assert_eq!(call.duration(), Some(Duration::from_millis(50)));
        assert_eq!(call.subcalls[0].duration(), Some(Duration::from_millis(40)));
        assert_eq!(call.error, Some(Error::Unavailable("host".into())));
        assert!(call.subcalls[0].error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_display_nests_subcalls() {
        let mut call = Call::begin("Client.Backlog");
        let mut sub = Call::begin("Endpoint.Backlog");
        sub.complete(&Err::<(), _>(Error::Closed));
        call.add(sub);
        call.complete(&Ok::<_, Error>(()));

        let text = call.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Client.Backlog"));
        assert!(lines[1].starts_with("  Endpoint.Backlog"));
        assert!(lines[1].contains("closed"));
    }
}
