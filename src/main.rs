use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use log::{debug, error, info};
use netgate_agent::{
    agent::{Agent, AgentOptions, Service},
    api::{ApiService, NetworkApi},
    config::AppConfig,
    connectivity::HttpProbe,
    executor::Executor,
    network_mode::{ManagerConfig, NetworkModeManager, artifacts::ArtifactPaths},
    portal::PortalConfig,
    radio::{DevRadio, NmcliRadio, Radio},
};
use std::{
    io::Write,
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

const SETTLE_DELAY: Duration = Duration::from_secs(2);

#[actix_web::main]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    initialize();

    let config = AppConfig::get();
    let hardware = config.hardware();

    info!(
        "netgate-agent {} starting with {} backends",
        env!("CARGO_PKG_VERSION"),
        if hardware { "hardware" } else { "development" }
    );

    let executor = Executor::new(hardware, config.timing.command_timeout);
    let radio = Arc::new(if hardware {
        Radio::Nmcli(NmcliRadio::new(
            executor.clone(),
            config.interfaces.wifi.as_str(),
        ))
    } else {
        Radio::Dev(DevRadio)
    });
    let probe = HttpProbe::new(config.probe_url.as_str())?;

    let manager = NetworkModeManager::new(executor.clone(), manager_config(config));
    let api = ApiService::new(
        NetworkApi::new(manager.clone(), Arc::new(probe.clone())),
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.api.port)),
    );
    let services: Vec<Arc<dyn Service>> = vec![Arc::new(manager), Arc::new(api)];

    let root = CancellationToken::new();
    watch_signals(root.clone())?;

    let agent = Agent::new(
        radio,
        probe,
        executor,
        services,
        agent_options(config, hardware),
        &root,
    )
    .await
    .context("failed to get the device online")?;

    agent.start(root).await;

    info!("shutdown complete");

    Ok(())
}

fn initialize() {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or("info"))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();
}

fn watch_signals(root: CancellationToken) -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => debug!("ctrl-c received"),
            _ = sigterm.recv() => debug!("SIGTERM received"),
        }

        info!("shutting down");
        root.cancel();
    });

    Ok(())
}

fn manager_config(config: &AppConfig) -> ManagerConfig {
    ManagerConfig {
        wifi_interface: config.interfaces.wifi.clone(),
        second_radio_interface: config.interfaces.second_radio.clone(),
        wan_interface: config.interfaces.wan.clone(),
        paths: ArtifactPaths {
            hostapd_conf: config.paths.hostapd_conf.clone(),
            dnsmasq_conf: config.paths.dnsmasq_conf.clone(),
            wpa_supplicant_conf: config.paths.wpa_supplicant_conf.clone(),
        },
        status_refresh: config.timing.status_refresh,
    }
}

fn agent_options(config: &AppConfig, hardware: bool) -> AgentOptions {
    AgentOptions {
        portal: PortalConfig {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.portal.port)),
            portal_ip: config.portal.address,
            hotspot_interface: config.interfaces.wifi.clone(),
            dns_redirect: hardware,
            dns_port: config.portal.dns_port,
            settle_delay: SETTLE_DELAY,
        },
        network_wait_timeout: config.timing.network_wait_timeout,
        network_wait_interval: config.timing.network_wait_interval,
        radio_settle_delay: SETTLE_DELAY,
        setup_timeout: config.timing.setup_timeout,
    }
}
