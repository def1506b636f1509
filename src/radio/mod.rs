//! Radio capabilities used to get the device online the first time.

pub mod dev;
pub mod nmcli;

pub use dev::DevRadio;
pub use nmcli::NmcliRadio;

use crate::executor::Executor;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use trait_variant::make;

/// A network seen by the client-mode radio.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct NearbyNetwork {
    pub ssid: String,
    /// 0..=100
    pub signal: u8,
    pub security: String,
}

/// Temporary setup access point.
#[make(Send)]
pub trait Hotspot: Sync {
    async fn start_hotspot(&self) -> Result<()>;
    async fn stop_hotspot(&self) -> Result<()>;
}

/// Client-mode operations.
#[make(Send)]
pub trait WifiClient: Sync {
    async fn scan(&self) -> Result<Vec<NearbyNetwork>>;
    async fn connect(&self, ssid: &str, password: &str) -> Result<()>;
}

/// Everything the bootstrap wizard needs from the radio.
pub trait BootstrapRadio: Hotspot + WifiClient + Send + Sync + 'static {}

impl<T> BootstrapRadio for T where T: Hotspot + WifiClient + Send + Sync + 'static {}

/// Radio selected at startup.
pub enum Radio {
    Nmcli(NmcliRadio<Executor>),
    Dev(DevRadio),
}

impl Hotspot for Radio {
    async fn start_hotspot(&self) -> Result<()> {
        match self {
            Radio::Nmcli(radio) => radio.start_hotspot().await,
            Radio::Dev(radio) => radio.start_hotspot().await,
        }
    }

    async fn stop_hotspot(&self) -> Result<()> {
        match self {
            Radio::Nmcli(radio) => radio.stop_hotspot().await,
            Radio::Dev(radio) => radio.stop_hotspot().await,
        }
    }
}

impl WifiClient for Radio {
    async fn scan(&self) -> Result<Vec<NearbyNetwork>> {
        match self {
            Radio::Nmcli(radio) => radio.scan().await,
            Radio::Dev(radio) => radio.scan().await,
        }
    }

    async fn connect(&self, ssid: &str, password: &str) -> Result<()> {
        match self {
            Radio::Nmcli(radio) => radio.connect(ssid, password).await,
            Radio::Dev(radio) => radio.connect(ssid, password).await,
        }
    }
}
