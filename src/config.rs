use anyhow::{Context, Result};
use std::{env, net::Ipv4Addr, path::PathBuf, sync::OnceLock, time::Duration};

/// Application configuration loaded and validated at startup
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Use development stand-ins instead of touching hardware
    pub dev_mode: bool,

    /// Device API server configuration
    pub api: ApiConfig,

    /// Captive portal configuration
    pub portal: PortalSettings,

    /// Interface names
    pub interfaces: InterfaceConfig,

    /// Generated OS artifact locations
    pub paths: PathConfig,

    /// Timing of background work and bootstrap
    pub timing: TimingConfig,

    /// Connectivity probe target
    pub probe_url: String,
}

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub port: u16,
}

#[derive(Clone, Debug)]
pub struct PortalSettings {
    pub port: u16,
    pub address: Ipv4Addr,
    pub dns_port: u16,
}

#[derive(Clone, Debug)]
pub struct InterfaceConfig {
    pub wifi: String,
    pub second_radio: String,
    pub wan: String,
}

#[derive(Clone, Debug)]
pub struct PathConfig {
    pub hostapd_conf: PathBuf,
    pub dnsmasq_conf: PathBuf,
    pub wpa_supplicant_conf: PathBuf,
}

#[derive(Clone, Debug)]
pub struct TimingConfig {
    pub status_refresh: Duration,
    pub network_wait_timeout: Duration,
    pub network_wait_interval: Duration,
    pub setup_timeout: Option<Duration>,
    pub command_timeout: Option<Duration>,
}

impl AppConfig {
    /// Get or load the application configuration
    ///
    /// Returns a reference to the cached configuration. On first call, it loads
    /// and validates all configuration from environment variables. Subsequent
    /// calls return the cached instance.
    ///
    /// # Panics
    /// Panics if configuration loading fails. This is intentional as the
    /// agent cannot function without valid configuration.
    pub fn get() -> &'static Self {
        static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();
        APP_CONFIG.get_or_init(|| {
            Self::load_internal().expect("failed to load application configuration")
        })
    }

    /// Whether the real process executor and radio are used.
    ///
    /// Only ARM64 Linux builds outside dev mode drive hardware.
    pub fn hardware(&self) -> bool {
        cfg!(all(target_os = "linux", target_arch = "aarch64")) && !self.dev_mode
    }

    fn load_internal() -> Result<Self> {
        let dev_mode = env::args().any(|arg| arg == "--dev") || flag("DEV_MODE")?;
        let api = ApiConfig::load()?;
        let portal = PortalSettings::load(dev_mode)?;
        let interfaces = InterfaceConfig::load();
        let paths = PathConfig::load();
        let timing = TimingConfig::load()?;
        let probe_url = env::var("CONNECTIVITY_PROBE_URL")
            .unwrap_or_else(|_| "http://clients3.google.com/generate_204".to_string());

        Ok(Self {
            dev_mode,
            api,
            portal,
            interfaces,
            paths,
            timing,
            probe_url,
        })
    }
}

impl ApiConfig {
    fn load() -> Result<Self> {
        Ok(Self {
            port: parse_var("API_PORT", 8080)?,
        })
    }
}

impl PortalSettings {
    fn load(dev_mode: bool) -> Result<Self> {
        // 80 collides with local web servers on a development machine
        let default_port = if dev_mode { 8082 } else { 80 };

        Ok(Self {
            port: parse_var("PORTAL_PORT", default_port)?,
            address: Ipv4Addr::new(10, 42, 0, 1),
            dns_port: parse_var("PORTAL_DNS_PORT", 5353)?,
        })
    }
}

impl InterfaceConfig {
    fn load() -> Self {
        Self {
            wifi: env::var("WIFI_INTERFACE").unwrap_or_else(|_| "wlan0".to_string()),
            second_radio: env::var("SECOND_RADIO_INTERFACE")
                .unwrap_or_else(|_| "wlan1".to_string()),
            wan: env::var("WAN_INTERFACE").unwrap_or_else(|_| "eth0".to_string()),
        }
    }
}

impl PathConfig {
    fn load() -> Self {
        let path = |name: &str, default: &str| -> PathBuf {
            env::var(name).unwrap_or_else(|_| default.to_string()).into()
        };

        Self {
            hostapd_conf: path("HOSTAPD_CONF_PATH", "/etc/hostapd/hostapd.conf"),
            dnsmasq_conf: path("DNSMASQ_CONF_PATH", "/etc/dnsmasq.d/netgate.conf"),
            wpa_supplicant_conf: path(
                "WPA_SUPPLICANT_CONF_PATH",
                "/etc/wpa_supplicant/wpa_supplicant-wlan0.conf",
            ),
        }
    }
}

impl TimingConfig {
    fn load() -> Result<Self> {
        let setup_timeout = match env::var("SETUP_TIMEOUT_SECS") {
            Ok(value) => Some(Duration::from_secs(
                value
                    .parse()
                    .context("failed to parse SETUP_TIMEOUT_SECS: invalid format")?,
            )),
            Err(_) => None,
        };

        let command_timeout = match parse_var("COMMAND_TIMEOUT_SECS", 60)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            status_refresh: Duration::from_secs(nonzero(
                "STATUS_REFRESH_SECS",
                parse_var("STATUS_REFRESH_SECS", 30)?,
            )?),
            network_wait_timeout: Duration::from_secs(parse_var("NETWORK_WAIT_TIMEOUT_SECS", 30)?),
            network_wait_interval: Duration::from_millis(nonzero(
                "NETWORK_WAIT_INTERVAL_MS",
                parse_var("NETWORK_WAIT_INTERVAL_MS", 500)?,
            )?),
            setup_timeout,
            command_timeout,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("failed to parse {name}: invalid format")),
        Err(_) => Ok(default),
    }
}

/// Rejects `0` for settings used as a period.
fn nonzero(name: &str, value: u64) -> Result<u64> {
    anyhow::ensure!(value > 0, "failed to parse {name}: must be greater than 0");
    Ok(value)
}

fn flag(name: &str) -> Result<bool> {
    match env::var(name) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            other => anyhow::bail!("failed to parse {name}: unexpected value {other}"),
        },
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_periods_are_rejected() {
        let err = nonzero("STATUS_REFRESH_SECS", 0).expect_err("should reject 0");

        assert!(err.to_string().contains("STATUS_REFRESH_SECS"));
        assert_eq!(
            nonzero("NETWORK_WAIT_INTERVAL_MS", 500).expect("should accept 500"),
            500
        );
    }

    #[test]
    fn unset_variable_uses_default() {
        let value: u64 =
            parse_var("NETGATE_TEST_UNSET_VARIABLE", 30).expect("should fall back to default");

        assert_eq!(value, 30);
    }
}
