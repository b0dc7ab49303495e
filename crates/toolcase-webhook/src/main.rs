use tracing::debug;

use toolcase_webhook::{
    cli, config::Config, fatal_error, mark_tracing_initialized, tracing::setup_tracing,
    WebhookServer,
};

#[tokio::main]
async fn main() {
    let matches = cli::build_cli().get_matches();
    let config = match Config::from_args(&matches) {
        Ok(config) => config,
        Err(e) => fatal_error(e.to_string()),
    };

    if let Err(e) = setup_tracing(&config.log_level, &config.log_fmt, config.log_no_color) {
        fatal_error(e.to_string());
    }
    debug!("tracing system ready");
    mark_tracing_initialized();

    // Both ring and aws-lc-rs end up in the dependency tree, rustls cannot
    // pick a default provider on its own.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        fatal_error("Cannot install the ring crypto provider".to_owned());
    }

    let server = match WebhookServer::new_from_config(config).await {
        Ok(server) => server,
        Err(e) => fatal_error(format!("Cannot start the webhook server: {e:?}")),
    };

    if let Err(e) = server.run().await {
        fatal_error(format!("Webhook server failure: {e:?}"));
    }
}
