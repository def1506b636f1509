use super::{CommandExecutor, command_line};
use anyhow::{Context, Result, anyhow, ensure};
use log::debug;
use std::{
    process::{Output, Stdio},
    time::Duration,
};
use tokio::{process::Command, time::timeout};

/// Pass-through to real process execution.
#[derive(Clone, Debug, Default)]
pub struct SystemExecutor {
    timeout: Option<Duration>,
}

impl SystemExecutor {
    /// Creates an executor killing any child that outlives `timeout`.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    async fn execute(&self, program: &str, args: &[&str]) -> Result<Output> {
        let line = command_line(program, args);
        debug!("exec: {line}");

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => timeout(limit, command.output())
                .await
                .map_err(|_| anyhow!("`{line}` timed out after {}s", limit.as_secs()))?,
            None => command.output().await,
        }
        .with_context(|| format!("failed to spawn `{line}`"))?;

        Ok(output)
    }
}

impl CommandExecutor for SystemExecutor {
    async fn run(&self, program: &str, args: &[&str]) -> Result<()> {
        let output = self.execute(program, args).await?;

        ensure!(
            output.status.success(),
            "`{}` failed with {}: {}",
            command_line(program, args),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );

        Ok(())
    }

    async fn output(&self, program: &str, args: &[&str]) -> Result<String> {
        let output = self.execute(program, args).await?;

        ensure!(
            output.status.success(),
            "`{}` failed with {}: {}",
            command_line(program, args),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn combined_output(&self, program: &str, args: &[&str]) -> Result<String> {
        let output = self.execute(program, args).await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        ensure!(
            output.status.success(),
            "`{}` failed with {}: {}",
            command_line(program, args),
            output.status,
            combined.trim()
        );

        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn output_captures_stdout() {
        let executor = SystemExecutor::default();

        let out = executor
            .output("sh", &["-c", "echo hello"])
            .await
            .expect("should run sh");

        assert_eq!(out, "hello\n");
    }

    #[tokio::test]
    async fn failure_reports_command_and_stderr() {
        let executor = SystemExecutor::default();

        let err = executor
            .run("sh", &["-c", "echo broken >&2; exit 3"])
            .await
            .expect_err("should fail");
        let message = format!("{err:#}");

        assert!(message.contains("sh -c"), "{message}");
        assert!(message.contains("broken"), "{message}");
    }

    #[tokio::test]
    async fn combined_output_contains_both_streams() {
        let executor = SystemExecutor::default();

        let out = executor
            .combined_output("sh", &["-c", "echo out; echo err >&2"])
            .await
            .expect("should run sh");

        assert!(out.contains("out"));
        assert!(out.contains("err"));
    }

    #[tokio::test]
    async fn timeout_kills_slow_process() {
        let executor = SystemExecutor::new(Some(Duration::from_millis(100)));

        let err = executor
            .run("sleep", &["5"])
            .await
            .expect_err("should time out");

        assert!(format!("{err:#}").contains("timed out"));
    }

    #[tokio::test]
    async fn errors_do_not_carry_credentials() {
        let executor = SystemExecutor::default();

        let spawn_err = executor
            .run(
                "netgate-no-such-program",
                &["dev", "wifi", "connect", "Home", "password", "TopSecretPass1"],
            )
            .await
            .expect_err("should fail to spawn");
        // `$0` of the script is "password", `$1` the secret
        let exit_err = executor
            .combined_output("sh", &["-c", "exit 4", "password", "TopSecretPass1"])
            .await
            .expect_err("should fail");

        for err in [spawn_err, exit_err] {
            let message = format!("{err:#}");
            assert!(!message.contains("TopSecretPass1"), "{message}");
            assert!(message.contains("password <redacted>"), "{message}");
        }
    }

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let executor = SystemExecutor::default();

        assert!(
            executor
                .run("netgate-no-such-program", &[])
                .await
                .is_err()
        );
    }
}
