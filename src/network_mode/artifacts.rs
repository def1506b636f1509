use super::types::Band;
use anyhow::{Context, Result};
use ini::{EscapePolicy, Ini, WriteOption};
use log::debug;
use std::path::{Path, PathBuf};

/// Provider used when a configured name is not known.
pub const DEFAULT_DNS_PROVIDER: &str = "cloudflare";

const DNS_PROVIDERS: &[(&str, [&str; 2])] = &[
    ("cloudflare", ["1.1.1.1", "1.0.0.1"]),
    ("google", ["8.8.8.8", "8.8.4.4"]),
    ("adguard", ["94.140.14.14", "94.140.15.15"]),
    ("quad9", ["9.9.9.9", "149.112.112.112"]),
];

const COUNTRY_CODE: &str = "US";

/// Locations of the files rendered on every apply.
#[derive(Clone, Debug)]
pub struct ArtifactPaths {
    pub hostapd_conf: PathBuf,
    pub dnsmasq_conf: PathBuf,
    pub wpa_supplicant_conf: PathBuf,
}

/// Upstream resolver pair for a provider name, falling back to the default provider.
pub fn dns_servers(provider: &str) -> [&'static str; 2] {
    let wanted = provider.trim().to_ascii_lowercase();

    DNS_PROVIDERS
        .iter()
        .find(|(name, _)| *name == wanted)
        .or_else(|| {
            DNS_PROVIDERS
                .iter()
                .find(|(name, _)| *name == DEFAULT_DNS_PROVIDER)
        })
        .map(|(_, servers)| *servers)
        .unwrap_or(["1.1.1.1", "1.0.0.1"])
}

pub struct AccessPointParams<'a> {
    pub interface: &'a str,
    pub ssid: &'a str,
    pub password: &'a str,
    pub band: Band,
    /// `0` lets the driver pick a channel.
    pub channel: u8,
    pub max_clients: u32,
}

/// Renders the hostapd configuration.
pub fn render_hostapd(params: &AccessPointParams) -> Result<String> {
    let max_clients = if params.max_clients == 0 {
        20
    } else {
        params.max_clients
    };

    let mut ini = Ini::new();
    ini.with_section(None::<String>)
        .set("interface", params.interface)
        .set("driver", "nl80211")
        .set("ssid", params.ssid)
        .set("hw_mode", params.band.hw_mode())
        .set("channel", params.channel.to_string())
        .set("ieee80211n", "1")
        .set("ieee80211ac", "1")
        .set("wmm_enabled", "1")
        .set("country_code", COUNTRY_CODE)
        .set("ieee80211d", "1")
        .set("wpa", "2")
        .set("wpa_key_mgmt", "WPA-PSK")
        .set("wpa_passphrase", params.password)
        .set("rsn_pairwise", "CCMP")
        .set("ieee80211w", "1")
        .set("ignore_broadcast_ssid", "0")
        .set("max_num_sta", max_clients.to_string());

    let mut buffer = Vec::new();
    ini.write_to_opt(
        &mut buffer,
        WriteOption {
            escape_policy: EscapePolicy::Nothing,
            ..Default::default()
        },
    )
    .context("failed to render hostapd config")?;

    String::from_utf8(buffer).context("hostapd config is not valid utf-8")
}

pub struct DhcpParams<'a> {
    pub interface: &'a str,
    pub subnet_base: &'a str,
    pub dns_provider: &'a str,
}

/// Renders the dnsmasq fragment serving DHCP and DNS on the AP subnet.
pub fn render_dnsmasq(params: &DhcpParams) -> String {
    let [primary, secondary] = dns_servers(params.dns_provider);
    let base = params.subnet_base;

    format!(
        "interface={interface}\n\
         bind-interfaces\n\
         dhcp-range={base}.50,{base}.150,24h\n\
         dhcp-option=3,{base}.1\n\
         dhcp-option=6,{base}.1\n\
         server={primary}\n\
         server={secondary}\n\
         no-resolv\n\
         log-queries\n",
        interface = params.interface,
    )
}

/// Renders a wpa_supplicant file holding a single network.
///
/// An empty password yields an open network entry.
pub fn render_wpa_supplicant(ssid: &str, password: &str) -> String {
    let security = if password.is_empty() {
        "\tkey_mgmt=NONE\n".to_string()
    } else {
        format!("\tpsk=\"{password}\"\n\tkey_mgmt=WPA-PSK\n")
    };

    format!(
        "ctrl_interface=DIR=/var/run/wpa_supplicant GROUP=netdev\n\
         update_config=1\n\
         country={COUNTRY_CODE}\n\
         \n\
         network={{\n\
         \tssid={ssid}\n\
         {security}\
         }}\n",
        ssid = wpa_ssid(ssid),
    )
}

// quoted form cannot carry a double quote or control characters
fn wpa_ssid(ssid: &str) -> String {
    if ssid.chars().any(|c| c == '"' || c.is_control()) {
        ssid.bytes().map(|b| format!("{b:02x}")).collect()
    } else {
        format!("\"{ssid}\"")
    }
}

/// Replaces `path` wholesale with `contents`.
///
/// The file is written next to its destination and renamed into place, so
/// daemons never read a half-written config. `private` files are made
/// readable by the owner only.
pub async fn write_artifact(path: &Path, contents: &str, private: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context(format!("failed to create directory: {parent:?}"))?;
    }

    let tmp = path.with_extension("tmp");

    tokio::fs::write(&tmp, contents)
        .await
        .context(format!("failed to write {tmp:?}"))?;

    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;

        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
            .await
            .context(format!("failed to restrict permissions of {tmp:?}"))?;
    }
    #[cfg(not(unix))]
    let _ = private;

    tokio::fs::rename(&tmp, path)
        .await
        .context(format!("failed to move {tmp:?} to {path:?}"))?;

    debug!("wifi: wrote {path:?}");

    Ok(())
}
