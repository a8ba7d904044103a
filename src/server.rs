use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use log::{info, warn};
use openssl::ssl::SslAcceptorBuilder;
use sd_notify::NotifyState;

use crate::context::GateContext;
use crate::gate::AccessGate;
use crate::response::Response;

/// HTTP server with the access gate wrapped around the application. The
/// handlers below are the seam to the dashboard itself; anything they see
/// has already passed the gate.
pub struct GateServer {
    ssl: Option<SslAcceptorBuilder>,
    ctx: Arc<GateContext>,

    keep_alive_secs: Option<u64>,
    workers: Option<u64>,

    bind: String,
}

impl GateServer {
    pub fn new(bind: String, ctx: Arc<GateContext>) -> Self {
        Self {
            ssl: None,
            ctx,
            keep_alive_secs: None,
            workers: None,
            bind,
        }
    }

    pub fn set_ssl(&mut self, ssl: SslAcceptorBuilder) {
        self.ssl = Some(ssl);
    }

    pub fn set_keep_alive_secs(&mut self, keep_alive_secs: u64) {
        self.keep_alive_secs = Some(keep_alive_secs);
    }

    pub fn set_workers(&mut self, workers: u64) {
        self.workers = Some(workers);
    }

    pub async fn run(mut self) -> Result<()> {
        let ctx = self.ctx.clone();
        let api_prefix = ctx.rules.api_prefix.clone();
        let mut srv = HttpServer::new(move || {
            App::new()
                .wrap(AccessGate::new(ctx.clone()))
                .service(
                    web::scope(&api_prefix).default_service(web::route().to(Self::handle_api)),
                )
                .default_service(web::route().to(Self::handle_page))
        });

        if let Some(ssl) = self.ssl.take() {
            info!("Binding to https://{}", self.bind);
            srv = srv.bind_openssl(&self.bind, ssl).context("bind with ssl")?
        } else {
            warn!("Using HTTP (without SSL). THIS IS DANGEROUS, DO NOT USE IN PRODUCTION");
            info!("Binding to http://{}", self.bind);
            srv = srv.bind(&self.bind).context("bind without ssl")?
        };

        if let Some(keep_alive) = self.keep_alive_secs {
            srv = srv.keep_alive(Duration::from_secs(keep_alive));
        }
        if let Some(workers) = self.workers {
            srv = srv.workers(workers as usize);
        }

        sd_notify::notify(true, &[NotifyState::Ready]).context("notify systemd")?;
        info!("Starting gate server");
        srv.run().await.context("run server")?;

        info!("Server stopped by user");
        Ok(())
    }

    /// Stand-in for the dashboard's API handlers.
    async fn handle_api(req: HttpRequest) -> HttpResponse {
        Response::json(serde_json::json!({
            "success": true,
            "path": req.uri().path(),
        }))
        .into()
    }

    /// Stand-in for the dashboard's page rendering.
    async fn handle_page(req: HttpRequest) -> HttpResponse {
        HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(format!(
                "<!doctype html><title>dashboard</title><p>{}</p>",
                req.uri().path()
            ))
    }
}
