use crate::errors::AgentError;
use anyhow::{Context, Result};
use log::{debug, info};
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use trait_variant::make;

const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait ConnectivityProbe: Sync {
    /// Whether the public internet is reachable right now.
    async fn has_internet(&self) -> bool;
}

/// Probe expecting `204 No Content` from a well-known endpoint.
///
/// Captive networks answer with a redirect or a login page instead, which
/// counts as offline.
#[derive(Clone)]
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(PROBE_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("failed to create probe HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl ConnectivityProbe for HttpProbe {
    async fn has_internet(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(res) => res.status() == StatusCode::NO_CONTENT,
            Err(e) => {
                debug!("connectivity: probe failed: {e}");
                false
            }
        }
    }
}

/// Polls `probe` every `interval` until it reports connectivity.
///
/// # Arguments
/// * `probe` - Connectivity check to poll
/// * `timeout` - Overall deadline
/// * `interval` - Pause between two probes
/// * `cancel` - Aborts the wait early
///
/// # Returns
/// * `Ok(())` - As soon as one probe succeeds
/// * `Err` - Network error on deadline or cancellation
pub async fn wait_for_internet<P>(
    probe: &P,
    timeout: Duration,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), AgentError>
where
    P: ConnectivityProbe,
{
    let deadline = Instant::now() + timeout;

    loop {
        if probe.has_internet().await {
            info!("connectivity: internet reachable");
            return Ok(());
        }

        if Instant::now() + interval > deadline {
            return Err(AgentError::network(
                "connectivity.wait",
                format!("no internet access after {}s", timeout.as_secs()),
            ));
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(AgentError::network("connectivity.wait", "cancelled"));
            }
            _ = sleep(interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    #[tokio::test(start_paused = true)]
    async fn returns_once_probe_succeeds() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let mut probe = MockConnectivityProbe::new();
        probe.expect_has_internet().returning(move || {
            let online = counter.fetch_add(1, Ordering::SeqCst) >= 2;
            Box::pin(async move { online })
        });

        wait_for_internet(
            &probe,
            Duration::from_secs(30),
            Duration::from_millis(500),
            &CancellationToken::new(),
        )
        .await
        .expect("should come online");

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_network_error() {
        let mut probe = MockConnectivityProbe::new();
        probe
            .expect_has_internet()
            .returning(|| Box::pin(async { false }));

        let err = wait_for_internet(
            &probe,
            Duration::from_secs(2),
            Duration::from_millis(500),
            &CancellationToken::new(),
        )
        .await
        .expect_err("should time out");

        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.to_string().contains("no internet access after 2s"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_waiting() {
        let mut probe = MockConnectivityProbe::new();
        probe
            .expect_has_internet()
            .returning(|| Box::pin(async { false }));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = wait_for_internet(
            &probe,
            Duration::from_secs(3600),
            Duration::from_secs(1),
            &cancel,
        )
        .await
        .expect_err("should be cancelled");

        assert!(err.to_string().contains("cancelled"));
    }
}
