use crate::{
    agent::Service,
    connectivity::ConnectivityProbe,
    executor::CommandExecutor,
    http_util::{JsonBody, handle_agent_result},
    network_mode::{ModeSettings, NetworkModeManager, Status},
};
use actix_cors::Cors;
use actix_web::{App, HttpServer, Responder, web};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, error, info};
use serde::Serialize;
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub internet_access: bool,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
}

/// Device API handlers for the network mode manager.
pub struct NetworkApi<E, P> {
    manager: NetworkModeManager<E>,
    probe: Arc<P>,
}

impl<E, P> Clone for NetworkApi<E, P> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            probe: self.probe.clone(),
        }
    }
}

impl<E, P> NetworkApi<E, P>
where
    E: CommandExecutor + 'static,
    P: ConnectivityProbe + Send + 'static,
{
    pub fn new(manager: NetworkModeManager<E>, probe: Arc<P>) -> Self {
        Self { manager, probe }
    }

    pub fn routes(cfg: &mut web::ServiceConfig) {
        cfg.route("/api/wifi/config", web::get().to(Self::get_config))
            .route("/api/wifi/config", web::post().to(Self::set_config))
            .route("/api/wifi/status", web::get().to(Self::status))
            .route("/api/wifi/scan", web::get().to(Self::scan))
            .route("/api/wifi/stop", web::post().to(Self::stop))
            .route("/api/health", web::get().to(Self::health));
    }

    pub async fn get_config(api: web::Data<Self>) -> impl Responder {
        debug!("get_config() called");

        handle_agent_result(Ok(JsonBody(api.manager.settings())))
    }

    /// Accepts new settings; the apply runs in the background.
    pub async fn set_config(
        api: web::Data<Self>,
        body: web::Json<ModeSettings>,
    ) -> impl Responder {
        debug!("set_config() called with mode {}", body.mode);

        handle_agent_result(
            api.manager
                .update_config(body.into_inner())
                .map(|()| JsonBody(json!({ "status": "applying" }))),
        )
    }

    pub async fn status(api: web::Data<Self>) -> impl Responder {
        debug!("status() called");

        handle_agent_result(Ok(JsonBody(Status::clone(&api.manager.status()))))
    }

    pub async fn scan(api: web::Data<Self>) -> impl Responder {
        debug!("scan() called");

        handle_agent_result(api.manager.scan().await.map(JsonBody))
    }

    pub async fn stop(api: web::Data<Self>) -> impl Responder {
        debug!("stop() called");

        api.manager.stop();
        handle_agent_result(Ok(JsonBody(json!({ "status": "stopping" }))))
    }

    pub async fn health(api: web::Data<Self>) -> impl Responder {
        debug!("health() called");

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();

        handle_agent_result(Ok(JsonBody(Health {
            status: "ok",
            internet_access: api.probe.has_internet().await,
            timestamp,
        })))
    }
}

/// Hosts [`NetworkApi`] for the lifetime of the agent.
pub struct ApiService<E, P> {
    api: NetworkApi<E, P>,
    listen: SocketAddr,
}

impl<E, P> ApiService<E, P> {
    pub fn new(api: NetworkApi<E, P>, listen: SocketAddr) -> Self {
        Self { api, listen }
    }
}

#[async_trait]
impl<E, P> Service for ApiService<E, P>
where
    E: CommandExecutor + 'static,
    P: ConnectivityProbe + Send + 'static,
{
    fn name(&self) -> &str {
        "api"
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let api = self.api.clone();

        let server = HttpServer::new(move || {
            App::new()
                .wrap(
                    Cors::default()
                        .allow_any_origin()
                        .allow_any_header()
                        .allowed_methods(vec!["GET", "POST"])
                        .max_age(3600),
                )
                .app_data(web::Data::new(api.clone()))
                .configure(NetworkApi::<E, P>::routes)
        })
        .bind(self.listen)
        .with_context(|| format!("failed to bind api server to {}", self.listen))?
        .disable_signals()
        .run();

        let handle = server.handle();
        let mut task = tokio::spawn(server);

        info!("api: listening on {}", self.listen);

        tokio::select! {
            _ = shutdown.cancelled() => debug!("api: shutdown requested"),
            result = &mut task => {
                return match result {
                    Ok(result) => result.context("api server failed"),
                    Err(e) => Err(e).context("api server task failed"),
                };
            }
        }

        handle.stop(true).await;
        if let Err(e) = task.await {
            error!("api: server task failed: {e}");
        }
        info!("api: stopped");

        Ok(())
    }
}
