use super::{Hotspot, NearbyNetwork, WifiClient, nmcli};
use anyhow::{Result, bail};
use log::info;

/// Radio for development hosts.
///
/// The hotspot is only logged, scans return a fixed list and joins succeed
/// unless the password is too short for WPA2.
#[derive(Clone, Debug, Default)]
pub struct DevRadio;

impl Hotspot for DevRadio {
    async fn start_hotspot(&self) -> Result<()> {
        info!("dev: hotspot NetGate-Setup-DEV1 would start now");
        Ok(())
    }

    async fn stop_hotspot(&self) -> Result<()> {
        info!("dev: hotspot would stop now");
        Ok(())
    }
}

impl WifiClient for DevRadio {
    async fn scan(&self) -> Result<Vec<NearbyNetwork>> {
        Ok(nmcli::parse_wifi_list(nmcli::SAMPLE_WIFI_LIST))
    }

    async fn connect(&self, ssid: &str, password: &str) -> Result<()> {
        if !password.is_empty() && password.len() < 8 {
            bail!("connect to {ssid} failed: secrets were required, but not provided");
        }

        info!("dev: joined {ssid}");
        Ok(())
    }
}
