mod dev;
#[cfg(any(test, feature = "mock"))]
mod recording;
mod system;

pub use dev::DevExecutor;
#[cfg(any(test, feature = "mock"))]
pub use recording::RecordingExecutor;
pub use system::SystemExecutor;

use anyhow::Result;
use std::time::Duration;
use trait_variant::make;

/// Runs external programs on behalf of the feature managers.
///
/// Implementations are shared between concurrent callers and never retry;
/// a failed invocation is reported once and the caller decides what to do.
#[make(Send)]
pub trait CommandExecutor: Sync {
    /// Runs a program for its side effects.
    async fn run(&self, program: &str, args: &[&str]) -> Result<()>;

    /// Runs a program and returns its stdout.
    async fn output(&self, program: &str, args: &[&str]) -> Result<String>;

    /// Runs a program and returns stdout followed by stderr.
    async fn combined_output(&self, program: &str, args: &[&str]) -> Result<String>;
}

/// Executor selected at startup.
#[derive(Clone, Debug)]
pub enum Executor {
    System(SystemExecutor),
    Dev(DevExecutor),
}

impl Executor {
    /// # Arguments
    /// * `hardware` - use the real executor when true, the dev stand-in otherwise
    /// * `timeout` - per-process limit of the real executor
    pub fn new(hardware: bool, timeout: Option<Duration>) -> Self {
        if hardware {
            Executor::System(SystemExecutor::new(timeout))
        } else {
            Executor::Dev(DevExecutor::new(SystemExecutor::new(timeout)))
        }
    }
}

impl CommandExecutor for Executor {
    async fn run(&self, program: &str, args: &[&str]) -> Result<()> {
        match self {
            Executor::System(executor) => executor.run(program, args).await,
            Executor::Dev(executor) => executor.run(program, args).await,
        }
    }

    async fn output(&self, program: &str, args: &[&str]) -> Result<String> {
        match self {
            Executor::System(executor) => executor.output(program, args).await,
            Executor::Dev(executor) => executor.output(program, args).await,
        }
    }

    async fn combined_output(&self, program: &str, args: &[&str]) -> Result<String> {
        match self {
            Executor::System(executor) => executor.combined_output(program, args).await,
            Executor::Dev(executor) => executor.combined_output(program, args).await,
        }
    }
}

/// Arguments whose following value is a credential.
const SECRET_FLAGS: &[&str] = &["password", "psk", "wifi-sec.psk", "802-11-wireless-security.psk"];

const REDACTED: &str = "<redacted>";

/// Renders a command the way it would be typed into a shell, with the value
/// after any credential argument masked. Used for every log line and error
/// message about a command.
pub fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    let mut secret_next = false;

    for arg in args {
        line.push(' ');
        line.push_str(if secret_next { REDACTED } else { arg });
        secret_next = SECRET_FLAGS.contains(arg);
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_masks_credentials() {
        assert_eq!(
            command_line(
                "nmcli",
                &["dev", "wifi", "connect", "Home", "password", "TopSecretPass1", "ifname", "wlan0"]
            ),
            "nmcli dev wifi connect Home password <redacted> ifname wlan0"
        );
        assert_eq!(
            command_line("nmcli", &["con", "modify", "Hotspot", "wifi-sec.psk", "netgatee5f6"]),
            "nmcli con modify Hotspot wifi-sec.psk <redacted>"
        );
    }

    #[test]
    fn command_line_keeps_plain_arguments() {
        assert_eq!(
            command_line("systemctl", &["restart", "hostapd"]),
            "systemctl restart hostapd"
        );
        assert_eq!(command_line("sysctl", &[]), "sysctl");
    }
}
