use super::{Hotspot, NearbyNetwork, WifiClient};
use crate::executor::CommandExecutor;
use anyhow::{Context, Result};
use log::{debug, info, warn};

const HOTSPOT_PROFILE: &str = "Hotspot";
const HOTSPOT_ADDRESS: &str = "10.42.0.1/24";

/// `nmcli -t -f SSID,SIGNAL,SECURITY dev wifi list` output.
pub const SAMPLE_WIFI_LIST: &str = "HomeNetwork:82:WPA2
Cafe\\:Guest:54:
NeighboursWifi:40:WPA1 WPA2
:30:WPA2
";

/// Parses terse nmcli wifi list output; colons inside fields are escaped as `\:`.
///
/// Hidden networks (empty SSID) are dropped.
pub fn parse_wifi_list(list: &str) -> Vec<NearbyNetwork> {
    list.lines()
        .filter_map(|line| {
            let fields = split_terse(line);
            let [ssid, signal, security] = fields.as_slice() else {
                return None;
            };
            if ssid.is_empty() {
                return None;
            }
            Some(NearbyNetwork {
                ssid: ssid.clone(),
                signal: signal.parse().unwrap_or(0),
                security: security.clone(),
            })
        })
        .collect()
}

fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => current.extend(chars.next()),
            ':' => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);

    fields
}

/// Radio driven through NetworkManager.
pub struct NmcliRadio<E> {
    executor: E,
    interface: String,
}

impl<E> NmcliRadio<E>
where
    E: CommandExecutor,
{
    pub fn new(executor: E, interface: impl Into<String>) -> Self {
        Self {
            executor,
            interface: interface.into(),
        }
    }

    /// Setup SSID and password derived from the radio's MAC address.
    async fn hotspot_identity(&self) -> (String, String) {
        let path = format!("/sys/class/net/{}/address", self.interface);

        let suffix = match tokio::fs::read_to_string(&path).await {
            Ok(mac) => mac_suffix(&mac),
            Err(e) => {
                warn!("radio: failed to read {path}: {e}");
                "0000".to_string()
            }
        };

        (
            format!("NetGate-Setup-{suffix}"),
            format!("netgate{}", suffix.to_ascii_lowercase()),
        )
    }

    async fn nmcli(&self, args: &[&str]) -> Result<()> {
        self.executor.run("nmcli", args).await
    }

    async fn nmcli_best_effort(&self, args: &[&str]) {
        if let Err(e) = self.nmcli(args).await {
            debug!("radio: ignoring failed step: {e:#}");
        }
    }
}

fn mac_suffix(mac: &str) -> String {
    let hex: String = mac.chars().filter(char::is_ascii_hexdigit).collect();
    let start = hex.len().saturating_sub(4);

    hex[start..].to_ascii_uppercase()
}

impl<E> Hotspot for NmcliRadio<E>
where
    E: CommandExecutor,
{
    async fn start_hotspot(&self) -> Result<()> {
        let (ssid, password) = self.hotspot_identity().await;
        let interface = self.interface.as_str();

        info!("radio: starting hotspot {ssid} on {interface}");

        self.nmcli_best_effort(&["con", "delete", HOTSPOT_PROFILE])
            .await;
        self.nmcli_best_effort(&["radio", "wifi", "on"]).await;

        self.nmcli(&[
            "con",
            "add",
            "type",
            "wifi",
            "ifname",
            interface,
            "con-name",
            HOTSPOT_PROFILE,
            "autoconnect",
            "no",
            "ssid",
            ssid.as_str(),
        ])
        .await
        .context("failed to add hotspot profile")?;

        for settings in [
            ["wifi-sec.key-mgmt", "wpa-psk"],
            ["wifi-sec.psk", password.as_str()],
            ["802-11-wireless.mode", "ap"],
            ["ipv4.method", "shared"],
            ["ipv4.addresses", HOTSPOT_ADDRESS],
        ] {
            let [key, value] = settings;
            self.nmcli(&["con", "modify", HOTSPOT_PROFILE, key, value])
                .await
                .with_context(|| format!("failed to set hotspot {key}"))?;
        }

        let out = self
            .executor
            .combined_output("nmcli", &["con", "up", HOTSPOT_PROFILE])
            .await
            .context("failed to bring hotspot up")?;
        debug!("radio: {}", out.trim());

        Ok(())
    }

    async fn stop_hotspot(&self) -> Result<()> {
        info!("radio: stopping hotspot");

        self.nmcli(&["con", "down", HOTSPOT_PROFILE])
            .await
            .context("failed to stop hotspot")
    }
}

impl<E> WifiClient for NmcliRadio<E>
where
    E: CommandExecutor,
{
    async fn scan(&self) -> Result<Vec<NearbyNetwork>> {
        let list = self
            .executor
            .output(
                "nmcli",
                &[
                    "-t",
                    "-f",
                    "SSID,SIGNAL,SECURITY",
                    "dev",
                    "wifi",
                    "list",
                    "--rescan",
                    "yes",
                ],
            )
            .await
            .context("wifi scan failed")?;

        Ok(parse_wifi_list(&list))
    }

    async fn connect(&self, ssid: &str, password: &str) -> Result<()> {
        info!("radio: connecting to {ssid}");

        // the hotspot holds the radio until it is gone
        self.nmcli_best_effort(&["con", "down", HOTSPOT_PROFILE])
            .await;
        self.nmcli_best_effort(&["con", "delete", HOTSPOT_PROFILE])
            .await;
        self.nmcli_best_effort(&["con", "delete", ssid]).await;

        let mut args = vec!["dev", "wifi", "connect", ssid];
        if !password.is_empty() {
            args.extend(["password", password]);
        }
        args.extend(["ifname", self.interface.as_str()]);

        self.executor
            .combined_output("nmcli", &args)
            .await
            .with_context(|| format!("failed to connect to {ssid}"))?;

        info!("radio: connected to {ssid}");

        Ok(())
    }
}
