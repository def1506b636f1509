//! Captive portal served from the setup hotspot.
//!
//! Offers a network scan, a credential submission endpoint and a landing
//! page that every other path falls back to, so the captive-portal checks
//! of phones and laptops open it. On hardware, DNS queries on the hotspot
//! interface are hijacked to resolve to the portal address.

mod dns;
mod page;

pub use dns::{DnsResponder, build_reply};

use crate::{
    agent::wizard::{DoneSignal, JoinOutcome, WizardState, WizardTracker},
    executor::CommandExecutor,
    http_util::{JsonBody, handle_service_result},
    radio::BootstrapRadio,
};
use actix_web::{
    App, HttpResponse, HttpServer, Responder,
    http::{
        KeepAlive,
        header::{CACHE_CONTROL, EXPIRES, PRAGMA},
    },
    web,
};
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::Deserialize;
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
pub struct PortalConfig {
    /// HTTP listen address
    pub listen: SocketAddr,
    /// Address every hijacked DNS query resolves to
    pub portal_ip: Ipv4Addr,
    pub hotspot_interface: String,
    /// Install the DNS hijack (hardware only)
    pub dns_redirect: bool,
    pub dns_port: u16,
    /// Pause between answering `/connect` and the join attempt
    pub settle_delay: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 80)),
            portal_ip: Ipv4Addr::new(10, 42, 0, 1),
            hotspot_interface: "wlan0".to_string(),
            dns_redirect: false,
            dns_port: 5353,
            settle_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Deserialize)]
pub struct Credentials {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
}

/// Request handlers of the portal.
pub struct PortalApi<R> {
    radio: Arc<R>,
    tracker: WizardTracker,
    done: DoneSignal,
    settle_delay: Duration,
    shutdown: CancellationToken,
}

impl<R> Clone for PortalApi<R> {
    fn clone(&self) -> Self {
        Self {
            radio: self.radio.clone(),
            tracker: self.tracker.clone(),
            done: self.done.clone(),
            settle_delay: self.settle_delay,
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<R> PortalApi<R>
where
    R: BootstrapRadio,
{
    pub fn new(
        radio: Arc<R>,
        tracker: WizardTracker,
        done: DoneSignal,
        settle_delay: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            radio,
            tracker,
            done,
            settle_delay,
            shutdown,
        }
    }

    /// Registers all portal routes, including the landing page fallback.
    pub fn routes(cfg: &mut web::ServiceConfig) {
        cfg.route("/scan", web::get().to(Self::scan))
            .route("/connect", web::post().to(Self::connect))
            .route("/", web::get().to(Self::index))
            .default_service(web::route().to(Self::index));
    }

    pub async fn scan(api: web::Data<Self>) -> impl Responder {
        debug!("scan() called");

        handle_service_result(api.radio.scan().await.map(JsonBody), "scan")
    }

    pub async fn connect(api: web::Data<Self>, body: web::Bytes) -> impl Responder {
        debug!("connect() called");

        // browsers posting via fetch() often omit the content type
        let Ok(credentials) = serde_json::from_slice::<Credentials>(&body) else {
            return HttpResponse::BadRequest().body("invalid JSON");
        };

        if credentials.ssid.trim().is_empty() {
            return HttpResponse::BadRequest().body("ssid is required");
        }

        if !api.tracker.advance(WizardState::CredentialsReceived) {
            return HttpResponse::Conflict().body("a connection attempt is already in progress");
        }

        info!("portal: credentials received for {}", credentials.ssid);

        tokio::spawn(api.get_ref().clone().join(credentials));

        HttpResponse::Ok().body("Credentials received. Connecting...")
    }

    pub async fn index() -> impl Responder {
        HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .insert_header((CACHE_CONTROL, "no-cache, no-store, must-revalidate"))
            .insert_header((PRAGMA, "no-cache"))
            .insert_header((EXPIRES, "0"))
            .body(page::LANDING_PAGE)
    }

    /// Joins the submitted network once the response had time to leave.
    async fn join(self, credentials: Credentials) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {
                warn!("portal: cancelled before connecting to {}", credentials.ssid);
                return;
            }
            _ = sleep(self.settle_delay) => {}
        }

        self.tracker.advance(WizardState::Connecting);

        match self
            .radio
            .connect(&credentials.ssid, &credentials.password)
            .await
        {
            Ok(()) => {
                info!("portal: joined {}", credentials.ssid);
                self.tracker.advance(WizardState::Connected);
                self.done.fire(JoinOutcome::Connected);
                self.shutdown.cancel();
            }
            Err(e) => {
                error!("portal: joining {} failed: {e:#}", credentials.ssid);
                self.tracker.advance(WizardState::Failed);
                self.done.fire(JoinOutcome::Failed(format!("{e:#}")));
            }
        }
    }
}

/// The portal server with its optional DNS hijack.
pub struct CaptivePortal<R, E> {
    config: PortalConfig,
    radio: Arc<R>,
    executor: E,
    tracker: WizardTracker,
    done: DoneSignal,
}

impl<R, E> CaptivePortal<R, E>
where
    R: BootstrapRadio,
    E: CommandExecutor + 'static,
{
    pub fn new(
        config: PortalConfig,
        radio: Arc<R>,
        executor: E,
        tracker: WizardTracker,
        done: DoneSignal,
    ) -> Self {
        Self {
            config,
            radio,
            executor,
            tracker,
            done,
        }
    }

    /// Serves until `token` is cancelled or a join succeeded.
    ///
    /// The DNS hijack is installed before the HTTP listener starts and
    /// removed only after it has stopped. Without the hijack the portal still
    /// serves clients that open it directly.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let responder = if self.config.dns_redirect {
            self.start_dns_redirect().await
        } else {
            None
        };

        let result = self.serve(&token).await;

        if let Some(responder) = responder {
            self.stop_dns_redirect(responder).await;
        }

        result
    }

    async fn serve(&self, token: &CancellationToken) -> Result<()> {
        let api = PortalApi::new(
            self.radio.clone(),
            self.tracker.clone(),
            self.done.clone(),
            self.config.settle_delay,
            token.clone(),
        );
        let listen = self.config.listen;

        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(api.clone()))
                .configure(PortalApi::<R>::routes)
        })
        .workers(1)
        // idle keep-alive connections would hold up a graceful stop
        .keep_alive(KeepAlive::Disabled)
        .shutdown_timeout(5)
        .bind(listen)
        .with_context(|| format!("failed to bind captive portal to {listen}"))?
        .disable_signals()
        .run();

        let handle = server.handle();
        let mut task = tokio::spawn(server);

        self.tracker.advance(WizardState::PortalListening);
        info!("portal: listening on {listen}");

        tokio::select! {
            _ = token.cancelled() => info!("portal: shutting down"),
            result = &mut task => {
                return match result {
                    Ok(result) => result.context("captive portal server failed"),
                    Err(e) => Err(e).context("captive portal server task failed"),
                };
            }
        }

        handle.stop(true).await;
        match task.await {
            Ok(Ok(())) => debug!("portal: server stopped"),
            Ok(Err(e)) => error!("portal: server stopped with error: {e}"),
            Err(e) => error!("portal: server task failed: {e}"),
        }

        Ok(())
    }

    async fn start_dns_redirect(&self) -> Option<DnsResponder> {
        let listen = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.dns_port));
        // no redirect without a responder, the port may belong to another daemon
        let responder = match DnsResponder::spawn(listen, self.config.portal_ip).await {
            Ok(responder) => responder,
            Err(e) => {
                warn!("portal: continuing without dns hijack: {e:#}");
                return None;
            }
        };

        info!(
            "portal: redirecting dns on {} to port {}",
            self.config.hotspot_interface, self.config.dns_port
        );
        if let Err(e) = self.redirect_rule("-A").await {
            warn!("portal: failed to install dns redirect: {e:#}");
        }

        Some(responder)
    }

    async fn stop_dns_redirect(&self, responder: DnsResponder) {
        info!("portal: removing dns redirect");
        if let Err(e) = self.redirect_rule("-D").await {
            warn!("portal: failed to remove dns redirect: {e:#}");
        }

        responder.stop().await;
    }

    async fn redirect_rule(&self, action: &str) -> Result<()> {
        let port = self.config.dns_port.to_string();

        self.executor
            .run(
                "iptables",
                &[
                    "-t",
                    "nat",
                    action,
                    "PREROUTING",
                    "-i",
                    self.config.hotspot_interface.as_str(),
                    "-p",
                    "udp",
                    "--dport",
                    "53",
                    "-j",
                    "REDIRECT",
                    "--to-port",
                    port.as_str(),
                ],
            )
            .await
    }
}
