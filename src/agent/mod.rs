//! Process lifetime supervision.
//!
//! An [`Agent`] is only constructed once the device is online, running the
//! setup wizard first if needed. [`Agent::start`] then runs every
//! [`Service`] until the root token is cancelled.

pub mod wizard;

use crate::{
    connectivity::{ConnectivityProbe, wait_for_internet},
    errors::{AgentError, ErrorKind},
    executor::CommandExecutor,
    portal::PortalConfig,
    radio::BootstrapRadio,
};
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use wizard::JoinOutcome;

/// A long-running feature supervised by the [`Agent`].
///
/// `run` must return promptly once `shutdown` is cancelled. Errors are
/// logged by the agent and never stop other services.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, shutdown: CancellationToken) -> Result<()>;
}

#[derive(Clone, Debug)]
pub struct AgentOptions {
    pub portal: PortalConfig,
    /// Bound of the connectivity poll after the wizard
    pub network_wait_timeout: Duration,
    pub network_wait_interval: Duration,
    /// Pause after stopping the hotspot before polling
    pub radio_settle_delay: Duration,
    /// Bound of the wizard's wait for a join outcome
    pub setup_timeout: Option<Duration>,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            portal: PortalConfig::default(),
            network_wait_timeout: Duration::from_secs(30),
            network_wait_interval: Duration::from_millis(500),
            radio_settle_delay: Duration::from_secs(2),
            setup_timeout: None,
        }
    }
}

pub struct Agent<R, P, E> {
    radio: Arc<R>,
    probe: P,
    executor: E,
    services: Vec<Arc<dyn Service>>,
    options: AgentOptions,
}

impl<R, P, E> Agent<R, P, E>
where
    R: BootstrapRadio,
    P: ConnectivityProbe,
    E: CommandExecutor + Clone + 'static,
{
    /// Creates the agent once the device has internet access.
    ///
    /// # Arguments
    /// * `radio` - Radio used by the setup wizard
    /// * `probe` - Connectivity check
    /// * `executor` - Executor for the portal's DNS redirect
    /// * `services` - Services started by [`Self::start`], in order
    /// * `options` - Portal and timing settings
    /// * `root` - Process-wide cancellation
    ///
    /// # Returns
    /// * `Err` - Network error if the device could not get online
    pub async fn new(
        radio: Arc<R>,
        probe: P,
        executor: E,
        services: Vec<Arc<dyn Service>>,
        options: AgentOptions,
        root: &CancellationToken,
    ) -> Result<Self, AgentError> {
        let agent = Self {
            radio,
            probe,
            executor,
            services,
            options,
        };

        agent.ensure_connectivity(root).await?;

        Ok(agent)
    }

    /// Runs the setup wizard if offline and waits until internet is reachable.
    pub async fn ensure_connectivity(&self, root: &CancellationToken) -> Result<(), AgentError> {
        if self.probe.has_internet().await {
            info!("agent: internet reachable, skipping setup");
            return Ok(());
        }

        info!("agent: no internet access, starting setup wizard");

        match wizard::run(
            self.radio.clone(),
            self.executor.clone(),
            self.options.portal.clone(),
            self.options.setup_timeout,
            root,
        )
        .await?
        {
            JoinOutcome::Connected => info!("agent: setup joined a network"),
            JoinOutcome::Failed(reason) => warn!("agent: setup ended without a network: {reason}"),
        }

        tokio::select! {
            _ = root.cancelled() => {
                return Err(AgentError::new(
                    "agent.setup",
                    ErrorKind::Other,
                    "shutdown requested during setup",
                ));
            }
            _ = sleep(self.options.radio_settle_delay) => {}
        }

        wait_for_internet(
            &self.probe,
            self.options.network_wait_timeout,
            self.options.network_wait_interval,
            root,
        )
        .await
    }

    /// Runs all services until `token` is cancelled and all of them returned.
    pub async fn start(&self, token: CancellationToken) {
        let workers: Vec<_> = self
            .services
            .iter()
            .map(|service| {
                let service = Arc::clone(service);
                let shutdown = token.clone();
                let name = service.name().to_string();

                info!("agent: starting service {name}");

                let handle = tokio::spawn(async move {
                    if let Err(e) = service.run(shutdown).await {
                        error!("agent: service {} failed: {e:#}", service.name());
                    }
                });

                (name, handle)
            })
            .collect();

        token.cancelled().await;
        info!("agent: shutting down {} services", workers.len());

        for (name, handle) in workers {
            match handle.await {
                Ok(()) => debug!("agent: service {name} stopped"),
                Err(e) if e.is_panic() => error!("agent: service {name} panicked"),
                Err(e) => error!("agent: service {name} did not finish: {e}"),
            }
        }

        info!("agent: all services stopped");
    }
}
