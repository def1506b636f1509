//! Ownership of the radio and the kernel network state.
//!
//! The manager switches between [`NetworkMode`]s. Every switch tears down
//! whatever the previous mode provisioned before the next mode's steps run,
//! and the outcome is published as a [`Status`] snapshot.

pub mod artifacts;
pub mod neighbors;
pub mod scan;
mod status;
mod types;

pub use status::StatusHandle;
pub use types::{
    Band, ExtenderConfig, ModeSettings, NetworkMode, RouterConfig, Status, gateway_ip,
};

use crate::{
    agent::Service,
    errors::{AgentError, ErrorKind},
    executor::CommandExecutor,
};
use anyhow::{Context, Result};
use artifacts::{
    AccessPointParams, ArtifactPaths, DEFAULT_DNS_PROVIDER, DhcpParams, render_dnsmasq,
    render_hostapd, render_wpa_supplicant, write_artifact,
};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use scan::ScannedNetwork;
use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};
use tokio::{sync::Mutex, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const OP_SCAN: &str = "wifi.scan";
const EXTENDER_SUBNET_BASE: &str = "192.168.200";
const MIN_STATUS_REFRESH: Duration = Duration::from_secs(1);

#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Radio used as AP in router mode and as station in extender mode.
    pub wifi_interface: String,
    /// Physical AP radio used in extender mode when configured.
    pub second_radio_interface: String,
    /// Uplink masqueraded in router mode.
    pub wan_interface: String,
    pub paths: ArtifactPaths,
    pub status_refresh: Duration,
}

struct Shared<E> {
    executor: E,
    config: ManagerConfig,
    settings: RwLock<ModeSettings>,
    status: StatusHandle,
    // serializes applies and teardowns, never taken by status readers
    apply_guard: Mutex<()>,
}

/// Network mode state machine.
///
/// Cheap to clone; clones share state.
pub struct NetworkModeManager<E> {
    shared: Arc<Shared<E>>,
}

impl<E> Clone for NetworkModeManager<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E> NetworkModeManager<E>
where
    E: CommandExecutor + 'static,
{
    /// Creates a manager in mode Off with default settings.
    pub fn new(executor: E, config: ManagerConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                executor,
                config,
                settings: RwLock::new(ModeSettings::default()),
                status: StatusHandle::default(),
                apply_guard: Mutex::new(()),
            }),
        }
    }

    pub fn settings(&self) -> ModeSettings {
        self.shared
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> Arc<Status> {
        self.shared.status.snapshot()
    }

    /// Read-only status accessor for sibling features.
    pub fn status_handle(&self) -> StatusHandle {
        self.shared.status.clone()
    }

    /// Validates and stores new settings, then schedules an apply.
    ///
    /// Rejected settings leave the stored ones untouched. The outcome of the
    /// apply is only visible through [`Self::status`].
    ///
    /// # Arguments
    /// * `settings` - requested mode and per-mode settings
    ///
    /// # Returns
    /// Invalid error if the settings of the requested mode are not acceptable
    pub fn update_config(&self, settings: ModeSettings) -> Result<(), AgentError> {
        settings.validate_for_mode()?;

        info!("wifi: accepted config for mode {}", settings.mode);
        self.store(settings);
        self.schedule_apply();

        Ok(())
    }

    /// Forces mode Off, keeping the per-mode settings.
    pub fn stop(&self) {
        let mut settings = self.settings();
        settings.mode = NetworkMode::Off;

        info!("wifi: stop requested");
        self.store(settings);
        self.schedule_apply();
    }

    fn store(&self, settings: ModeSettings) {
        *self
            .shared
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
    }

    fn schedule_apply(&self) {
        let manager = self.clone();
        tokio::spawn(async move { manager.apply().await });
    }

    /// Tears down the active mode and provisions the stored one.
    ///
    /// Runs one at a time; concurrent calls queue behind the running one.
    /// Each call applies the settings stored when it starts. A failing step
    /// aborts the sequence and is recorded in [`Status::error`]; steps that
    /// already ran are not rolled back.
    pub async fn apply(&self) {
        let _guard = self.shared.apply_guard.lock().await;

        let settings = self.settings();
        let mode = settings.mode;

        info!("wifi: applying mode {mode}");

        self.teardown_steps().await;

        let result = match mode {
            NetworkMode::Off => Ok(Status::inactive(NetworkMode::Off, None)),
            NetworkMode::Router => self.apply_router(&settings.router).await,
            NetworkMode::Extender => self.apply_extender(&settings.extender).await,
        };

        let status = result.unwrap_or_else(|e| {
            error!("wifi: applying mode {mode} failed: {e:#}");
            Status::inactive(mode, Some(format!("{e:#}")))
        });

        if status.active {
            info!("wifi: mode {mode} active on {}", status.ap_interface);
        }

        self.shared.status.publish(status);
    }

    /// Tears down whatever is provisioned and publishes mode Off.
    pub async fn teardown(&self) {
        let _guard = self.shared.apply_guard.lock().await;

        self.teardown_steps().await;
        self.shared
            .status
            .publish(Status::inactive(NetworkMode::Off, None));
    }

    /// Runs a scan on the primary radio.
    pub async fn scan(&self) -> Result<Vec<ScannedNetwork>, AgentError> {
        let interface = &self.shared.config.wifi_interface;

        let dump = self
            .shared
            .executor
            .combined_output("iw", &["dev", interface.as_str(), "scan"])
            .await
            .map_err(|e| AgentError::from_anyhow(OP_SCAN, ErrorKind::System, e))?;

        Ok(scan::parse_scan_dump(&dump))
    }

    /// Recounts the clients on the active AP interface.
    pub async fn refresh_connected(&self) {
        let status = self.status();

        if !status.active {
            return;
        }

        match self.shared.executor.output("ip", &["neigh", "show"]).await {
            Ok(table) => {
                let count = neighbors::count_neighbors(&table, &status.ap_interface);
                if self
                    .shared
                    .status
                    .publish_connected(&status.ap_interface, count)
                {
                    debug!("wifi: {count} clients on {}", status.ap_interface);
                }
            }
            Err(e) => warn!("wifi: failed to read neighbor table: {e:#}"),
        }
    }

    async fn teardown_steps(&self) {
        let station = self.shared.config.wifi_interface.as_str();
        let virtual_ap = virtual_ap_interface(station);

        let steps: [(&str, &[&str]); 8] = [
            ("systemctl", &["stop", "hostapd"]),
            ("systemctl", &["stop", "dnsmasq"]),
            ("killall", &["wpa_supplicant"]),
            ("killall", &["dhclient"]),
            ("iptables", &["-t", "nat", "-F"]),
            ("iptables", &["-F", "FORWARD"]),
            ("iw", &["dev", virtual_ap.as_str(), "del"]),
            ("sysctl", &["-w", "net.ipv4.ip_forward=0"]),
        ];

        for (program, args) in steps {
            self.best_effort(program, args).await;
        }
    }

    async fn apply_router(&self, router: &RouterConfig) -> Result<Status> {
        let config = &self.shared.config;
        let ap = config.wifi_interface.as_str();
        let gateway = gateway_ip(&router.subnet_base)
            .with_context(|| format!("invalid subnet base {}", router.subnet_base))?;

        self.start_access_point(&AccessPointParams {
            interface: ap,
            ssid: &router.ssid,
            password: &router.password,
            band: router.band,
            channel: router.channel,
            max_clients: router.max_clients,
        })
        .await?;
        self.assign_gateway(ap, &gateway.to_string()).await?;
        self.start_dhcp(&DhcpParams {
            interface: ap,
            subnet_base: &router.subnet_base,
            dns_provider: &router.dns_provider,
        })
        .await?;
        self.enable_forwarding().await?;
        self.masquerade(ap, &config.wan_interface).await?;

        Ok(Status {
            mode: NetworkMode::Router,
            active: true,
            ssid: router.ssid.clone(),
            ap_interface: ap.to_string(),
            subnet_base: router.subnet_base.clone(),
            gateway_ip: gateway.to_string(),
            ..Default::default()
        })
    }

    async fn apply_extender(&self, extender: &ExtenderConfig) -> Result<Status> {
        let config = &self.shared.config;
        let station = config.wifi_interface.as_str();

        self.join_upstream(station, extender).await?;

        let ap = if extender.use_second_radio {
            config.second_radio_interface.clone()
        } else {
            let ap = virtual_ap_interface(station);
            self.exec(
                "iw",
                &["dev", station, "interface", "add", ap.as_str(), "type", "__ap"],
            )
            .await
            .context("failed to create virtual AP interface")?;
            ap
        };
        let gateway = format!("{EXTENDER_SUBNET_BASE}.1");

        // channel 0 lets hostapd follow the channel of the upstream link
        self.start_access_point(&AccessPointParams {
            interface: &ap,
            ssid: &extender.extender_ssid,
            password: &extender.extender_password,
            band: extender.band,
            channel: 0,
            max_clients: 0,
        })
        .await?;
        self.assign_gateway(&ap, &gateway).await?;
        self.start_dhcp(&DhcpParams {
            interface: &ap,
            subnet_base: EXTENDER_SUBNET_BASE,
            dns_provider: DEFAULT_DNS_PROVIDER,
        })
        .await?;
        self.enable_forwarding().await?;
        self.masquerade(&ap, station).await?;

        Ok(Status {
            mode: NetworkMode::Extender,
            active: true,
            ssid: extender.extender_ssid.clone(),
            ap_interface: ap,
            subnet_base: EXTENDER_SUBNET_BASE.to_string(),
            gateway_ip: gateway,
            upstream_ssid: extender.upstream_ssid.clone(),
            ..Default::default()
        })
    }

    async fn join_upstream(&self, station: &str, extender: &ExtenderConfig) -> Result<()> {
        let path = &self.shared.config.paths.wpa_supplicant_conf;
        let conf = render_wpa_supplicant(&extender.upstream_ssid, &extender.upstream_password);

        write_artifact(path, &conf, true).await?;

        self.best_effort("killall", &["wpa_supplicant"]).await;

        let path = path.to_string_lossy();
        self.exec("wpa_supplicant", &["-B", "-i", station, "-c", path.as_ref()])
            .await
            .context("failed to start wpa_supplicant")?;
        self.exec("dhclient", &[station])
            .await
            .context("failed to acquire upstream DHCP lease")?;

        Ok(())
    }

    async fn start_access_point(&self, params: &AccessPointParams<'_>) -> Result<()> {
        let conf = render_hostapd(params)?;

        write_artifact(&self.shared.config.paths.hostapd_conf, &conf, true).await?;

        self.exec("systemctl", &["restart", "hostapd"])
            .await
            .context("failed to restart hostapd")
    }

    async fn assign_gateway(&self, interface: &str, gateway: &str) -> Result<()> {
        self.best_effort("ip", &["addr", "flush", "dev", interface])
            .await;
        let cidr = format!("{gateway}/24");

        self.exec("ip", &["addr", "add", cidr.as_str(), "dev", interface])
            .await
            .context("failed to assign gateway address")?;
        self.best_effort("ip", &["link", "set", interface, "up"])
            .await;

        Ok(())
    }

    async fn start_dhcp(&self, params: &DhcpParams<'_>) -> Result<()> {
        let conf = render_dnsmasq(params);

        write_artifact(&self.shared.config.paths.dnsmasq_conf, &conf, false).await?;

        self.exec("systemctl", &["restart", "dnsmasq"])
            .await
            .context("failed to restart dnsmasq")
    }

    async fn enable_forwarding(&self) -> Result<()> {
        self.exec("sysctl", &["-w", "net.ipv4.ip_forward=1"])
            .await
            .context("failed to enable IP forwarding")
    }

    async fn masquerade(&self, ap: &str, uplink: &str) -> Result<()> {
        let rules: [&[&str]; 5] = [
            &["-t", "nat", "-F"],
            &["-F", "FORWARD"],
            &["-t", "nat", "-A", "POSTROUTING", "-o", uplink, "-j", "MASQUERADE"],
            &["-A", "FORWARD", "-i", ap, "-o", uplink, "-j", "ACCEPT"],
            &[
                "-A",
                "FORWARD",
                "-i",
                uplink,
                "-o",
                ap,
                "-m",
                "state",
                "--state",
                "RELATED,ESTABLISHED",
                "-j",
                "ACCEPT",
            ],
        ];

        for rule in rules {
            self.exec("iptables", rule)
                .await
                .context("failed to configure NAT")?;
        }

        Ok(())
    }

    async fn exec(&self, program: &str, args: &[&str]) -> Result<()> {
        self.shared.executor.run(program, args).await
    }

    async fn best_effort(&self, program: &str, args: &[&str]) {
        if let Err(e) = self.exec(program, args).await {
            debug!("wifi: ignoring failed step: {e:#}");
        }
    }
}

fn virtual_ap_interface(station: &str) -> String {
    format!("{station}_ap")
}

#[async_trait]
impl<E> Service for NetworkModeManager<E>
where
    E: CommandExecutor + 'static,
{
    fn name(&self) -> &str {
        "wifi"
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!("wifi: service started");

        let mut refresh = self.shared.config.status_refresh;
        if refresh.is_zero() {
            warn!("wifi: status refresh interval is zero, using {MIN_STATUS_REFRESH:?}");
            refresh = MIN_STATUS_REFRESH;
        }

        let mut ticker = tokio::time::interval(refresh);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.refresh_connected().await,
            }
        }

        info!("wifi: shutting down, tearing down active mode");
        self.teardown().await;

        Ok(())
    }
}
