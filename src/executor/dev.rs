use super::{CommandExecutor, SystemExecutor, command_line};
use crate::{
    network_mode::{neighbors::SAMPLE_NEIGHBOR_TABLE, scan::SAMPLE_SCAN_DUMP},
    radio::nmcli::SAMPLE_WIFI_LIST,
};
use anyhow::Result;
use log::debug;

/// Programs that only have side effects on real hardware.
const SILENT_PROGRAMS: &[&str] = &[
    "iptables",
    "ip6tables",
    "iwconfig",
    "iw",
    "tc",
    "killall",
    "dhclient",
    "wpa_supplicant",
    "hostapd",
    "dnsmasq",
    "tailscale",
    "tailscaled",
    "sysctl",
    "nmcli",
];

/// Units whose lifecycle is stubbed; systemctl calls for other units run for real.
const SILENT_UNITS: &[&str] = &["hostapd", "dnsmasq", "tailscaled"];

const SILENT_UNIT_ACTIONS: &[&str] = &["start", "stop", "restart", "reload", "kill"];

const SAMPLE_STATION_DUMP: &str = "Station a1:b2:c3:d4:e5:f6 (on wlan0)
\tsignal:  \t\t-52 dBm
\ttx bitrate:\t\t144.4 MBit/s
Station de:ad:be:ef:ca:fe (on wlan0)
\tsignal:  \t\t-67 dBm
\ttx bitrate:\t\t72.2 MBit/s
";

/// `tailscale status --json` of a node that is installed but logged out.
const SAMPLE_TAILSCALE_STATUS: &str = r#"{
  "Version": "1.76.1",
  "BackendState": "NeedsLogin",
  "AuthURL": "",
  "TailscaleIPs": null,
  "Self": {
    "ID": "",
    "HostName": "netgate-dev",
    "DNSName": "",
    "OS": "linux",
    "Online": false
  },
  "Peer": null
}
"#;

enum Stub {
    Silent,
    Canned(&'static str),
}

/// Development stand-in for [`SystemExecutor`].
///
/// Hardware commands are logged and succeed without running; commands whose
/// output gets parsed return canned text in the exact format of the real tool.
/// Everything else is passed through.
#[derive(Clone, Debug, Default)]
pub struct DevExecutor {
    fallback: SystemExecutor,
}

impl DevExecutor {
    pub fn new(fallback: SystemExecutor) -> Self {
        Self { fallback }
    }

    fn stub(program: &str, args: &[&str]) -> Option<Stub> {
        match (program, args) {
            ("ip", ["neigh", ..]) => Some(Stub::Canned(SAMPLE_NEIGHBOR_TABLE)),
            ("ip", ["addr" | "address" | "link" | "route", ..]) => Some(Stub::Silent),
            ("iw", ["dev", _, "scan", ..]) => Some(Stub::Canned(SAMPLE_SCAN_DUMP)),
            ("iw", ["dev", _, "station", "dump", ..]) => Some(Stub::Canned(SAMPLE_STATION_DUMP)),
            ("tailscale", ["status", ..]) => Some(Stub::Canned(SAMPLE_TAILSCALE_STATUS)),
            ("nmcli", args) if args.contains(&"list") => Some(Stub::Canned(SAMPLE_WIFI_LIST)),
            ("systemctl", ["is-active", ..]) => Some(Stub::Canned("inactive\n")),
            ("systemctl", [action, .., unit])
                if SILENT_UNIT_ACTIONS.contains(action) && SILENT_UNITS.contains(unit) =>
            {
                Some(Stub::Silent)
            }
            (program, _) if SILENT_PROGRAMS.contains(&program) => Some(Stub::Silent),
            _ => None,
        }
    }
}

impl CommandExecutor for DevExecutor {
    async fn run(&self, program: &str, args: &[&str]) -> Result<()> {
        if Self::stub(program, args).is_some() {
            debug!("dev: stubbed `{}`", command_line(program, args));
            return Ok(());
        }

        self.fallback.run(program, args).await
    }

    async fn output(&self, program: &str, args: &[&str]) -> Result<String> {
        match Self::stub(program, args) {
            Some(Stub::Canned(text)) => {
                debug!("dev: canned output for `{}`", command_line(program, args));
                Ok(text.to_string())
            }
            Some(Stub::Silent) => {
                debug!("dev: stubbed `{}`", command_line(program, args));
                Ok(String::new())
            }
            None => self.fallback.output(program, args).await,
        }
    }

    async fn combined_output(&self, program: &str, args: &[&str]) -> Result<String> {
        match Self::stub(program, args) {
            Some(Stub::Canned(text)) => {
                debug!("dev: canned output for `{}`", command_line(program, args));
                Ok(text.to_string())
            }
            Some(Stub::Silent) => {
                debug!("dev: stubbed `{}`", command_line(program, args));
                Ok(String::new())
            }
            None => self.fallback.combined_output(program, args).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{network_mode::neighbors, network_mode::scan, radio::nmcli};

    #[tokio::test]
    async fn hardware_commands_are_no_ops() {
        let executor = DevExecutor::default();

        for (program, args) in [
            ("iptables", vec!["-t", "nat", "-F"]),
            ("systemctl", vec!["restart", "hostapd"]),
            ("ip", vec!["addr", "add", "192.168.100.1/24", "dev", "wlan0"]),
            ("sysctl", vec!["-w", "net.ipv4.ip_forward=1"]),
            ("killall", vec!["wpa_supplicant"]),
        ] {
            executor
                .run(program, &args)
                .await
                .unwrap_or_else(|e| panic!("{program} should be stubbed: {e:#}"));
        }
    }

    #[tokio::test]
    async fn canned_scan_dump_parses() {
        let executor = DevExecutor::default();

        let dump = executor
            .combined_output("iw", &["dev", "wlan0", "scan"])
            .await
            .expect("scan should be canned");
        let networks = scan::parse_scan_dump(&dump);

        assert_eq!(networks.len(), 3);
        assert_eq!(networks[0].ssid, "HomeNetwork");
    }

    #[tokio::test]
    async fn canned_neighbor_table_parses() {
        let executor = DevExecutor::default();

        let table = executor
            .output("ip", &["neigh", "show"])
            .await
            .expect("neighbor table should be canned");

        assert_eq!(neighbors::count_neighbors(&table, "wlan0"), 3);
    }

    #[tokio::test]
    async fn canned_wifi_list_parses() {
        let executor = DevExecutor::default();

        let list = executor
            .output(
                "nmcli",
                &["-t", "-f", "SSID,SIGNAL,SECURITY", "dev", "wifi", "list"],
            )
            .await
            .expect("wifi list should be canned");

        assert!(!nmcli::parse_wifi_list(&list).is_empty());
    }

    #[tokio::test]
    async fn canned_tailscale_status_is_json() {
        let executor = DevExecutor::default();

        let status = executor
            .output("tailscale", &["status", "--json"])
            .await
            .expect("status should be canned");
        let value: serde_json::Value = serde_json::from_str(&status).expect("valid json");

        assert_eq!(value["BackendState"], "NeedsLogin");
    }

    #[tokio::test]
    async fn unit_state_reports_inactive() {
        let executor = DevExecutor::default();

        let state = executor
            .output("systemctl", &["is-active", "hostapd"])
            .await
            .expect("is-active should be canned");

        assert_eq!(state.trim(), "inactive");
    }

    #[tokio::test]
    async fn unknown_commands_run_for_real() {
        let executor = DevExecutor::default();

        let out = executor
            .output("sh", &["-c", "echo passthrough"])
            .await
            .expect("should pass through");

        assert_eq!(out.trim(), "passthrough");
    }
}
