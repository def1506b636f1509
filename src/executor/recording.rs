use super::{CommandExecutor, command_line};
use anyhow::{Result, bail};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct Journal {
    calls: Vec<String>,
    failures: Vec<(String, String)>,
    outputs: Vec<(String, String)>,
}

/// Executor that records every command line instead of running it.
///
/// The journal keeps the arguments as passed, credentials included, while
/// failure messages use the masked [`command_line`]. Clones share one
/// journal, so a test can keep a handle while the component under test owns
/// another. Commands succeed with empty output unless programmed otherwise
/// via [`RecordingExecutor::fail_on`] or [`RecordingExecutor::respond`];
/// programmed entries match on a prefix of the command line.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    journal: Arc<Mutex<Journal>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every command starting with `prefix` fail with `message`.
    pub fn fail_on(&self, prefix: &str, message: &str) {
        self.journal()
            .failures
            .push((prefix.to_string(), message.to_string()));
    }

    /// Makes every command starting with `prefix` print `output`.
    pub fn respond(&self, prefix: &str, output: &str) {
        self.journal()
            .outputs
            .push((prefix.to_string(), output.to_string()));
    }

    /// All command lines seen so far, in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.journal().calls.clone()
    }

    /// Index of the first recorded command starting with `prefix`.
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.journal()
            .calls
            .iter()
            .position(|call| call.starts_with(prefix))
    }

    pub fn clear(&self) {
        self.journal().calls.clear();
    }

    fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, program: &str, args: &[&str]) -> Result<String> {
        let line = std::iter::once(program)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ");
        let mut journal = self.journal();
        journal.calls.push(line.clone());

        if let Some((_, message)) = journal
            .failures
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
        {
            bail!("`{}` failed: {message}", command_line(program, args));
        }

        Ok(journal
            .outputs
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }
}

impl CommandExecutor for RecordingExecutor {
    async fn run(&self, program: &str, args: &[&str]) -> Result<()> {
        self.record(program, args).map(|_| ())
    }

    async fn output(&self, program: &str, args: &[&str]) -> Result<String> {
        self.record(program, args)
    }

    async fn combined_output(&self, program: &str, args: &[&str]) -> Result<String> {
        self.record(program, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_in_order_and_fails_on_request() {
        let executor = RecordingExecutor::new();
        executor.fail_on("systemctl restart dnsmasq", "unit not found");
        executor.respond("ip neigh", "10.0.0.2 dev wlan0 lladdr aa:bb:cc:dd:ee:ff REACHABLE\n");

        executor
            .run("systemctl", &["restart", "hostapd"])
            .await
            .expect("should succeed");
        let err = executor
            .run("systemctl", &["restart", "dnsmasq"])
            .await
            .expect_err("should fail");
        let out = executor
            .output("ip", &["neigh", "show"])
            .await
            .expect("should succeed");

        assert!(err.to_string().contains("unit not found"));
        assert!(out.contains("lladdr"));
        assert_eq!(
            executor.calls(),
            vec![
                "systemctl restart hostapd",
                "systemctl restart dnsmasq",
                "ip neigh show"
            ]
        );
        assert_eq!(executor.position("ip neigh"), Some(2));
    }
}
