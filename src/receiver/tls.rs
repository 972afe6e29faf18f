//! Mutual TLS material for the statistics connection.
//!
//! Missing or unreadable material is a fatal startup error; nothing here is
//! retried.

use crate::core::config::TlsConfig;
use crate::core::{FlowstatError, Result};
use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore, ServerName};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsConnector;

/// Connector plus the name the server certificate is verified against
#[derive(Clone)]
pub struct TlsSettings {
    pub connector: TlsConnector,
    pub server_name: Option<ServerName>,
}

impl TlsSettings {
    /// Load CA, client certificate and key from `config`
    pub fn load(config: &TlsConfig) -> Result<Self> {
        let ca_file = required(&config.ca_file, "ca_file")?;
        let cert_file = required(&config.cert_file, "cert_file")?;
        let key_file = required(&config.key_file, "key_file")?;

        let mut roots = RootCertStore::empty();
        for cert in read_certs(ca_file)? {
            roots
                .add(&cert)
                .map_err(|e| FlowstatError::tls(format!("invalid CA certificate in {}: {}", ca_file.display(), e)))?;
        }

        let chain = read_certs(cert_file)?;
        let key = read_private_key(key_file)?;

        let client = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(roots)
            .with_client_auth_cert(chain, key)
            .map_err(|e| FlowstatError::tls(format!("invalid client certificate or key: {}", e)))?;

        let server_name = config
            .server_name
            .as_deref()
            .map(parse_server_name)
            .transpose()?;

        Ok(Self {
            connector: TlsConnector::from(Arc::new(client)),
            server_name,
        })
    }

    /// Name to verify: the override if set, else the URL host
    pub fn server_name_for(&self, host: &str) -> Result<ServerName> {
        match &self.server_name {
            Some(name) => Ok(name.clone()),
            None => parse_server_name(host),
        }
    }
}

fn required<'a>(path: &'a Option<PathBuf>, name: &str) -> Result<&'a Path> {
    path.as_deref()
        .ok_or_else(|| FlowstatError::tls(format!("tls.{} is not set", name)))
}

fn parse_server_name(name: &str) -> Result<ServerName> {
    ServerName::try_from(name).map_err(|_| FlowstatError::tls(format!("invalid server name '{}'", name)))
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| FlowstatError::tls(format!("cannot read {}: {}", path.display(), e)))
}

fn read_certs(path: &Path) -> Result<Vec<Certificate>> {
    let certs = rustls_pemfile::certs(&mut open(path)?)?;
    if certs.is_empty() {
        return Err(FlowstatError::tls(format!("no certificates found in {}", path.display())));
    }
    Ok(certs.into_iter().map(Certificate).collect())
}

fn read_private_key(path: &Path) -> Result<PrivateKey> {
    use rustls_pemfile::Item;

    let mut reader = open(path)?;
    while let Some(item) = rustls_pemfile::read_one(&mut reader)? {
        match item {
            Item::RSAKey(key) | Item::PKCS8Key(key) | Item::ECKey(key) => return Ok(PrivateKey(key)),
            _ => {},
        }
    }
    Err(FlowstatError::tls(format!("no private key found in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_with(dir: &tempfile::TempDir) -> TlsConfig {
        TlsConfig {
            enabled: true,
            ca_file: Some(dir.path().join("ca.crt")),
            cert_file: Some(dir.path().join("tls.crt")),
            key_file: Some(dir.path().join("tls.key")),
            server_name: None,
        }
    }

    #[test]
    fn test_missing_files_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = TlsSettings::load(&config_with(&dir)).err().unwrap();
        assert_eq!(err.category(), "tls");
        assert!(err.to_string().contains("ca.crt"));
    }

    #[test]
    fn test_empty_ca_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_with(&dir);
        let mut ca = File::create(config.ca_file.as_ref().unwrap()).unwrap();
        writeln!(ca, "not a certificate").unwrap();

        let err = TlsSettings::load(&config).err().unwrap();
        assert!(err.to_string().contains("no certificates found"));
    }

    #[test]
    fn test_unset_path_is_fatal() {
        let config = TlsConfig {
            enabled: true,
            ..TlsConfig::default()
        };
        let err = TlsSettings::load(&config).err().unwrap();
        assert!(err.to_string().contains("tls.ca_file is not set"));
    }

    #[test]
    fn test_server_name_parsing() {
        assert!(parse_server_name("engine.local").is_ok());
        assert!(parse_server_name("127.0.0.1").is_ok());
        assert!(parse_server_name("not a name").is_err());
    }
}
