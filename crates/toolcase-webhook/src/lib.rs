pub mod admission;
pub mod api;
mod certs;
pub mod cli;
pub mod config;
pub mod mutation;
pub mod patch;
pub mod tracing;

use std::{net::SocketAddr, process, sync::Arc, sync::RwLock};

use ::tracing::{error, info, warn};
use anyhow::Result;
use axum::{routing::post, Router};
use axum_server::tls_rustls::RustlsConfig;
use lazy_static::lazy_static;

use crate::{
    api::{handlers::mutate_handler, state::ApiServerState},
    certs::create_tls_config,
    config::Config,
    mutation::{DecisionContext, MutatorRegistry},
};

lazy_static! {
    static ref TRACE_SYSTEM_INITIALIZED: RwLock<bool> = RwLock::new(false);
}

pub struct WebhookServer {
    router: Router,
    addr: SocketAddr,
    tls_config: RustlsConfig,
}

impl WebhookServer {
    pub async fn new_from_config(config: Config) -> Result<Self> {
        let mutators = MutatorRegistry::from_kinds(&config.mutators);
        if mutators.is_empty() {
            warn!("no mutator enabled, every admission request will be allowed unchanged");
        }
        info!(
            mutators = ?mutators.names(),
            tools = config.tool_registry.len(),
            "mutators enabled"
        );

        let tls_config = create_tls_config(&config.tls_config).await?;
        let router = build_router(mutators, config.decision_context());

        Ok(Self {
            router,
            addr: config.addr,
            tls_config,
        })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn run(self) -> Result<()> {
        info!(address = %self.addr, "started HTTPS server");
        axum_server::bind_rustls(self.addr, self.tls_config)
            .serve(self.router.into_make_service())
            .await?;

        Ok(())
    }
}

/// The HTTP surface of the webhook: a single `POST /mutate` route.
pub fn build_router(mutators: MutatorRegistry, context: DecisionContext) -> Router {
    let state = Arc::new(ApiServerState { mutators, context });

    Router::new()
        .route("/mutate", post(mutate_handler))
        .with_state(state)
}

/// Flag the tracing system as ready, from now on `fatal_error` logs through it.
pub fn mark_tracing_initialized() {
    if let Ok(mut initialized) = TRACE_SYSTEM_INITIALIZED.write() {
        *initialized = true;
    }
}

pub fn fatal_error(msg: String) -> ! {
    let trace_system_ready = TRACE_SYSTEM_INITIALIZED
        .read()
        .map(|ready| *ready)
        .unwrap_or(false);
    if trace_system_ready {
        error!("{}", msg);
    } else {
        eprintln!("{msg}");
    }

    process::exit(1);
}
