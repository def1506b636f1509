use crate::errors::AgentError;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use std::{fmt, net::Ipv4Addr};

const OP_VALIDATE: &str = "wifi.validate";
const MAX_SSID_BYTES: usize = 32;
const MAX_PASSPHRASE_LEN: usize = 63;

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    #[default]
    Off,
    Router,
    Extender,
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkMode::Off => "off",
            NetworkMode::Router => "router",
            NetworkMode::Extender => "extender",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum Band {
    #[serde(rename = "2.4GHz")]
    Ghz2_4,
    #[default]
    #[serde(rename = "5GHz")]
    Ghz5,
}

impl Band {
    /// Buckets a channel center frequency in MHz.
    pub fn from_frequency(mhz: u32) -> Self {
        if mhz >= 5000 { Band::Ghz5 } else { Band::Ghz2_4 }
    }

    /// hostapd `hw_mode` for this band.
    pub fn hw_mode(&self) -> &'static str {
        match self {
            Band::Ghz2_4 => "g",
            Band::Ghz5 => "a",
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Band::Ghz2_4 => f.write_str("2.4GHz"),
            Band::Ghz5 => f.write_str("5GHz"),
        }
    }
}

#[derive(Clone, Deserialize, Serialize, Validate, PartialEq)]
#[serde(default)]
pub struct RouterConfig {
    #[validate(min_length = 1)]
    pub ssid: String,
    #[validate(min_length = 8)]
    #[validate(max_length = 63)]
    pub password: String,
    pub band: Band,
    pub channel: u8,
    #[validate(maximum = 2007)]
    pub max_clients: u32,
    pub subnet_base: String,
    pub dns_provider: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            ssid: "NetGate".to_string(),
            password: "changeme123".to_string(),
            band: Band::Ghz5,
            channel: 36,
            max_clients: 20,
            subnet_base: "192.168.100".to_string(),
            dns_provider: "cloudflare".to_string(),
        }
    }
}

impl fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterConfig")
            .field("ssid", &self.ssid)
            .field("password", &"<redacted>")
            .field("band", &self.band)
            .field("channel", &self.channel)
            .field("max_clients", &self.max_clients)
            .field("subnet_base", &self.subnet_base)
            .field("dns_provider", &self.dns_provider)
            .finish()
    }
}

#[derive(Clone, Deserialize, Serialize, Validate, PartialEq)]
#[serde(default)]
pub struct ExtenderConfig {
    #[validate(min_length = 1)]
    pub upstream_ssid: String,
    pub upstream_password: String,
    #[validate(min_length = 1)]
    pub extender_ssid: String,
    #[validate(min_length = 8)]
    #[validate(max_length = 63)]
    pub extender_password: String,
    pub band: Band,
    pub use_second_radio: bool,
}

impl Default for ExtenderConfig {
    fn default() -> Self {
        Self {
            upstream_ssid: String::new(),
            upstream_password: String::new(),
            extender_ssid: "NetGate-Ext".to_string(),
            extender_password: "changeme123".to_string(),
            band: Band::Ghz5,
            use_second_radio: false,
        }
    }
}

impl fmt::Debug for ExtenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtenderConfig")
            .field("upstream_ssid", &self.upstream_ssid)
            .field("upstream_password", &"<redacted>")
            .field("extender_ssid", &self.extender_ssid)
            .field("extender_password", &"<redacted>")
            .field("band", &self.band)
            .field("use_second_radio", &self.use_second_radio)
            .finish()
    }
}

/// Requested mode together with the settings of every mode.
///
/// Settings of inactive modes are kept so switching back restores them.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ModeSettings {
    pub mode: NetworkMode,
    pub router: RouterConfig,
    pub extender: ExtenderConfig,
}

impl ModeSettings {
    /// Validates the settings of the requested mode only.
    pub fn validate_for_mode(&self) -> Result<(), AgentError> {
        match self.mode {
            NetworkMode::Off => Ok(()),
            NetworkMode::Router => {
                self.router
                    .validate()
                    .map_err(|e| AgentError::invalid(OP_VALIDATE, format!("router: {e}")))?;
                check_ssid("router.ssid", &self.router.ssid)?;
                check_passphrase("router.password", &self.router.password)?;

                if gateway_ip(&self.router.subnet_base).is_none() {
                    return Err(AgentError::invalid(
                        OP_VALIDATE,
                        format!(
                            "router.subnet_base must be the first three octets of an IPv4 network: {}",
                            self.router.subnet_base
                        ),
                    ));
                }
                Ok(())
            }
            NetworkMode::Extender => {
                self.extender
                    .validate()
                    .map_err(|e| AgentError::invalid(OP_VALIDATE, format!("extender: {e}")))?;
                check_ssid("extender.upstream_ssid", &self.extender.upstream_ssid)?;
                check_ssid("extender.extender_ssid", &self.extender.extender_ssid)?;
                check_passphrase("extender.extender_password", &self.extender.extender_password)?;

                // an empty upstream password joins an open network
                if !self.extender.upstream_password.is_empty() {
                    check_passphrase(
                        "extender.upstream_password",
                        &self.extender.upstream_password,
                    )?;
                }
                Ok(())
            }
        }
    }
}

/// SSIDs are 1 to 32 bytes; control characters would break the daemon configs.
fn check_ssid(field: &str, ssid: &str) -> Result<(), AgentError> {
    if ssid.is_empty() || ssid.len() > MAX_SSID_BYTES {
        return Err(AgentError::invalid(
            OP_VALIDATE,
            format!("{field} must be 1 to {MAX_SSID_BYTES} bytes long"),
        ));
    }
    if ssid.chars().any(char::is_control) {
        return Err(AgentError::invalid(
            OP_VALIDATE,
            format!("{field} must not contain control characters"),
        ));
    }
    Ok(())
}

/// WPA2 passphrases are 8 to 63 printable ASCII characters.
fn check_passphrase(field: &str, passphrase: &str) -> Result<(), AgentError> {
    let printable = passphrase.bytes().all(|b| (b' '..=b'~').contains(&b));

    if !printable || !(8..=MAX_PASSPHRASE_LEN).contains(&passphrase.len()) {
        return Err(AgentError::invalid(
            OP_VALIDATE,
            format!("{field} must be 8 to {MAX_PASSPHRASE_LEN} printable ASCII characters"),
        ));
    }
    Ok(())
}

/// Gateway address `<base>.1` of a `/24` given by its first three octets.
pub fn gateway_ip(subnet_base: &str) -> Option<Ipv4Addr> {
    if subnet_base.split('.').count() != 3 {
        return None;
    }
    format!("{subnet_base}.1").parse().ok()
}

/// Snapshot of what the manager last did, shared with sibling features.
///
/// Never carries credentials.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Status {
    pub mode: NetworkMode,
    pub active: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ssid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ap_interface: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subnet_base: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gateway_ip: String,
    pub connected_ips: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub upstream_ssid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Status {
    /// Status after a teardown, or after a failed apply targeting `mode`.
    pub fn inactive(mode: NetworkMode, error: Option<String>) -> Self {
        Self {
            mode,
            error,
            ..Default::default()
        }
    }
}
