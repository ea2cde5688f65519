//! Shared Postgres connection utilities with TLS support.

use std::ops::Deref;
use std::sync::Arc;

use rustls::ClientConfig;
use tokio::task::JoinHandle;
use tokio_postgres::Client;
use tokio_postgres_rustls_improved::MakeRustlsConnect;

use crate::error::{PgError, PgResult};

/// A client together with the task driving its connection.
pub struct PgConnection {
    client: Client,
    driver: JoinHandle<()>,
}

impl PgConnection {
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Drop the socket immediately, ending any statement in flight.
    pub fn terminate(&self) {
        self.driver.abort();
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

impl Deref for PgConnection {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

/// Connect to Postgres with appropriate TLS settings based on sslmode in connection string.
/// Spawns the connection task.
pub async fn connect_postgres(connection_string: &str) -> PgResult<PgConnection> {
    if requires_tls(connection_string) {
        let connector = MakeRustlsConnect::new(tls_config()?);
        let (client, connection) = tokio_postgres::connect(connection_string, connector)
            .await
            .map_err(|e| PgError::Connection(e.to_string()))?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Postgres connection error");
            }
        });
        Ok(PgConnection { client, driver })
    } else {
        let (client, connection) = tokio_postgres::connect(connection_string, tokio_postgres::NoTls)
            .await
            .map_err(|e| PgError::Connection(e.to_string()))?;
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Postgres connection error");
            }
        });
        Ok(PgConnection { client, driver })
    }
}

/// rustls client config trusting the webpki roots.
pub(crate) fn tls_config() -> PgResult<ClientConfig> {
    let config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| PgError::Connection(format!("TLS config error: {}", e)))?
            .with_root_certificates(root_certs())
            .with_no_client_auth();
    Ok(config)
}

/// Get root certificates from webpki-roots.
fn root_certs() -> rustls::RootCertStore {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

/// Check if the connection string requires TLS.
pub(crate) fn requires_tls(connection_string: &str) -> bool {
    connection_string.contains("sslmode=require")
        || connection_string.contains("sslmode=verify-ca")
        || connection_string.contains("sslmode=verify-full")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_tls() {
        assert!(requires_tls("postgres://u@h/db?sslmode=require"));
        assert!(requires_tls("host=h sslmode=verify-full"));
        assert!(!requires_tls("postgres://u@h/db"));
        assert!(!requires_tls("postgres://u@h/db?sslmode=disable"));
    }
}
