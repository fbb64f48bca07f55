//! HTTPS connector construction.

use std::sync::{Arc, OnceLock};

use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use rustls::ClientConfig;
use rustls::crypto::CryptoProvider;
use rustls_pki_types::CertificateDer;

use crate::config::{TlsRootConfig, TransportSecurity};
use crate::error::HttpError;

/// OS trust store, loaded on first use.
static NATIVE_ROOTS: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

/// Connector for the given roots. Plain `http://` is only wired in when the
/// transport allows it.
///
/// # Errors
/// [`HttpError::Tls`] if the roots cannot be loaded.
pub fn https_connector(
    roots: TlsRootConfig,
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let with_tls = match roots {
        TlsRootConfig::WebPki => HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(provider())
            .map_err(|e| HttpError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => HttpsConnectorBuilder::new()
            .with_tls_config(native_client_config().map_err(|e| HttpError::Tls(e.into()))?),
    };

    let connector = match transport {
        TransportSecurity::AllowInsecureHttp => with_tls.https_or_http(),
        TransportSecurity::TlsOnly => with_tls.https_only(),
    };
    Ok(connector.enable_all_versions().build())
}

/// The process default provider if one is installed, else aws-lc-rs.
fn provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

fn native_roots() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS.get_or_init(|| {
        let loaded = rustls_native_certs::load_native_certs();
        for err in &loaded.errors {
            tracing::warn!(error = %err, "failed to load a native root certificate");
        }
        tracing::debug!(count = loaded.certs.len(), "native root certificates loaded");
        loaded.certs
    })
}

/// An empty or unparsable OS store fails here, at client build time.
fn native_client_config() -> Result<ClientConfig, String> {
    let mut store = rustls::RootCertStore::empty();
    let (added, ignored) = store.add_parsable_certificates(native_roots().iter().cloned());
    if added == 0 {
        return Err(format!(
            "no usable native root certificates ({ignored} could not be parsed)"
        ));
    }
    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates were skipped");
    }

    let builder = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| format!("unsupported TLS protocol versions: {e}"))?;
    Ok(builder.with_root_certificates(store).with_no_client_auth())
}
