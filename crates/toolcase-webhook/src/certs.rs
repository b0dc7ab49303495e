use std::{path::Path, sync::Arc};

use ::tracing::{info, warn};
use anyhow::{anyhow, Result};
use axum_server::tls_rustls::RustlsConfig;
use rustls::ServerConfig;
use rustls_pki_types::{pem::SliceIter, CertificateDer, PrivateKeyDer};

use crate::config::TlsConfig;

/// Build the TLS configuration of the HTTPS server. The certificate and its
/// key are read once, there's no reload when they change on disk.
pub(crate) async fn create_tls_config(tls_config: &TlsConfig) -> Result<RustlsConfig> {
    let (cert, key) = load_server_cert_and_key(&tls_config.cert_file, &tls_config.key_file).await?;
    info!(
        cert_file = %tls_config.cert_file.display(),
        certificates = cert.len(),
        "Loaded TLS certificate"
    );

    let server_config = build_tls_server_config(cert, key)?;
    Ok(RustlsConfig::from_config(Arc::new(server_config)))
}

fn build_tls_server_config(
    cert: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<ServerConfig> {
    let mut server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert, key)?;
    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(server_config)
}

/// Load the server certificate chain and its key. The key file must hold
/// exactly one private key.
pub(crate) async fn load_server_cert_and_key(
    cert_file: &Path,
    key_file: &Path,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let cert_contents = tokio::fs::read(cert_file)
        .await
        .map_err(|e| anyhow!("Cannot read certificate file {}: {e}", cert_file.display()))?;
    let key_contents = tokio::fs::read(key_file)
        .await
        .map_err(|e| anyhow!("Cannot read key file {}: {e}", key_file.display()))?;

    let cert_iterator: SliceIter<CertificateDer> = SliceIter::new(&cert_contents[..]);
    let certs: Vec<CertificateDer<'static>> = cert_iterator
        .filter_map(|it| {
            if let Err(ref e) = it {
                warn!("Cannot parse certificate: {e}");
            }
            it.ok()
        })
        .collect();

    if certs.is_empty() {
        return Err(anyhow!(
            "No certificate found inside of {}",
            cert_file.display()
        ));
    }

    let key_iterator: SliceIter<PrivateKeyDer> = SliceIter::new(&key_contents[..]);
    let mut keys: Vec<PrivateKeyDer<'static>> = key_iterator
        .filter_map(|it| {
            if let Err(ref e) = it {
                warn!("Cannot parse private key: {e}");
            }
            it.ok()
        })
        .collect();

    if keys.len() != 1 {
        return Err(anyhow!(
            "Expected exactly one key in key file, found {}",
            keys.len()
        ));
    }

    Ok((certs, keys.remove(0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TlsData {
        cert: String,
        key: String,
    }

    fn create_cert(hostname: &str) -> TlsData {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec![hostname.to_owned()]).unwrap();

        TlsData {
            cert: cert.pem(),
            key: key_pair.serialize_pem(),
        }
    }

    #[tokio::test]
    async fn load_valid_cert_and_key() {
        let certs_dir = tempfile::tempdir().unwrap();
        let cert_file = certs_dir.path().join("cert.pem");
        let key_file = certs_dir.path().join("key.pem");

        let tls_data = create_cert("toolcase-webhook.default.svc");
        std::fs::write(&cert_file, tls_data.cert).unwrap();
        std::fs::write(&key_file, tls_data.key).unwrap();

        let (certs, _key) = load_server_cert_and_key(&cert_file, &key_file)
            .await
            .unwrap();
        assert_eq!(certs.len(), 1);
    }

    #[tokio::test]
    async fn missing_files_are_reported() {
        let certs_dir = tempfile::tempdir().unwrap();
        let cert_file = certs_dir.path().join("cert.pem");
        let key_file = certs_dir.path().join("key.pem");

        let error = load_server_cert_and_key(&cert_file, &key_file)
            .await
            .unwrap_err();
        assert!(error.to_string().contains("Cannot read certificate file"));
    }

    #[tokio::test]
    async fn key_file_without_keys_is_rejected() {
        let certs_dir = tempfile::tempdir().unwrap();
        let cert_file = certs_dir.path().join("cert.pem");
        let key_file = certs_dir.path().join("key.pem");

        let tls_data = create_cert("toolcase-webhook.default.svc");
        std::fs::write(&cert_file, &tls_data.cert).unwrap();
        // a certificate is not a key
        std::fs::write(&key_file, &tls_data.cert).unwrap();

        let error = load_server_cert_and_key(&cert_file, &key_file)
            .await
            .unwrap_err();
        assert_eq!(
            error.to_string(),
            "Expected exactly one key in key file, found 0"
        );
    }
}
