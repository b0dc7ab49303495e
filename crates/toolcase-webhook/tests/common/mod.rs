use std::{collections::BTreeSet, fs, net::SocketAddr};

use axum::Router;
use tempfile::tempdir;
use toolcase_webhook::{
    config::{Config, InitContainerTemplate, TlsConfig, Tool, ToolRegistry},
    mutation::{MutatorKind, DEFAULT_NODE_ALLOCATABLE_CPU, DEFAULT_TOOL_ANNOTATION_PREFIX},
    WebhookServer,
};

pub(crate) const TOOLS_IMAGE: &str = "registry.example.com/tools:1.0";

pub(crate) fn default_test_config() -> Config {
    let certs_dir = tempdir().unwrap().into_path();
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["toolcase-webhook.default.svc".to_owned()])
            .unwrap();
    let cert_file = certs_dir.join("cert.pem");
    let key_file = certs_dir.join("key.pem");
    fs::write(&cert_file, cert.pem()).unwrap();
    fs::write(&key_file, key_pair.serialize_pem()).unwrap();

    Config {
        addr: SocketAddr::from(([127, 0, 0, 1], 8443)),
        tls_config: TlsConfig {
            cert_file,
            key_file,
        },
        mutators: BTreeSet::from(MutatorKind::ALL),
        tool_registry: ToolRegistry::new(
            TOOLS_IMAGE.to_owned(),
            vec![
                Tool {
                    name: "arthas".to_owned(),
                    path: "/opt/arthas".to_owned(),
                },
                Tool {
                    name: "busybox".to_owned(),
                    path: "/bin/busybox".to_owned(),
                },
            ],
        ),
        init_container: InitContainerTemplate::default(),
        tool_annotation_prefix: DEFAULT_TOOL_ANNOTATION_PREFIX.to_owned(),
        node_allocatable_cpu: DEFAULT_NODE_ALLOCATABLE_CPU.to_owned(),
        log_level: "info".to_owned(),
        log_fmt: "json".to_owned(),
        log_no_color: false,
    }
}

pub(crate) async fn app(config: Config) -> Router {
    // ring and aws-lc-rs are both available, the provider must be chosen
    // explicitly. Tests share the process, only the first call succeeds.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let server = WebhookServer::new_from_config(config).await.unwrap();

    server.router()
}
