//! # Bootstrap
//!
//! Resolves the two inputs the feed session needs before it can subscribe:
//!
//! 1. the feed credential, scraped from the `us_id = ...;` assignment of the
//!    city page (or taken from configuration as is);
//! 2. the [`Catalog`], resolved from the city script (or from a local copy of
//!    it for offline use).
//!
//! The steps run in that order and the first failure aborts the bootstrap.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use super::http::TextClient;
use crate::catalog::Catalog;
use crate::error::BootstrapError;

/// City page carrying the credential.
pub const DEFAULT_PAGE_URL: &str = "https://www.bustime.ru/norilsk/";

/// City script carrying the catalog payloads.
pub const DEFAULT_SCRIPT_URL: &str = "https://www.bustime.ru/static/js/city-20-10.js";

/// Sources of the bootstrap inputs.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub page_url: String,
    pub script_url: String,
    /// Used instead of scraping `page_url` when set.
    pub credential: Option<String>,
    /// Read instead of fetching `script_url` when set.
    pub script_path: Option<PathBuf>,
    pub request_timeout: Duration,
    pub max_retries: u32,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            page_url: DEFAULT_PAGE_URL.to_string(),
            script_url: DEFAULT_SCRIPT_URL.to_string(),
            credential: None,
            script_path: None,
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
        }
    }
}

/// Everything resolved by a successful bootstrap.
#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub credential: String,
    pub catalog: Catalog,
}

fn credential_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"us_id\s*=\s*([^;\s]+)").expect("static credential pattern"))
}

/// Pulls the credential out of the city page. Surrounding quotes are removed.
pub fn extract_credential(page: &str) -> Option<String> {
    let raw = credential_pattern().captures(page)?.get(1)?.as_str();
    let credential = raw.trim_matches(|c| c == '"' || c == '\'');
    (!credential.is_empty()).then(|| credential.to_string())
}

/// Fetches the credential and the catalog.
#[derive(Clone)]
pub struct BootstrapClient {
    config: BootstrapConfig,
    http: TextClient,
}

impl BootstrapClient {
    /// # Errors
    /// Fails only if the HTTP client cannot be built.
    pub fn new(config: BootstrapConfig) -> Result<Self, BootstrapError> {
        let http = TextClient::new(config.request_timeout, config.max_retries)?;
        Ok(Self { config, http })
    }

    /// The configured credential, or the one scraped from the city page.
    pub async fn credential(&self) -> Result<String, BootstrapError> {
        if let Some(credential) = &self.config.credential {
            log::info!("Using configured feed credential");
            return Ok(credential.clone());
        }

        let page = self.http.get_text(&self.config.page_url).await?;
        extract_credential(&page).ok_or_else(|| BootstrapError::CredentialNotFound(self.config.page_url.clone()))
    }

    /// The catalog resolved from the local script copy or the remote script.
    pub async fn catalog(&self) -> Result<Catalog, BootstrapError> {
        let script = match &self.config.script_path {
            Some(path) => {
                log::info!("Loading catalog script from {}", path.display());
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| BootstrapError::Io { path: path.display().to_string(), reason: e.to_string() })?
            }
            None => self.http.get_text(&self.config.script_url).await?,
        };
        Ok(Catalog::from_script(&script)?)
    }

    /// Credential first, catalog second.
    pub async fn run(&self) -> Result<Bootstrap, BootstrapError> {
        let credential = self.credential().await?;
        let catalog = self.catalog().await?;
        Ok(Bootstrap { credential, catalog })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    const SCRIPT: &str = r#"var x=1;stops=[{value:"Гвардейская",ids:[22411]}];BUSES={"2227":{name:"1",ttype:0}};"#;

    /// Serves `routes` (path, status, body) to `count` sequential requests.
    fn serve(routes: Vec<(&'static str, u16, String)>, count: usize) -> (String, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind to random port");
        let base = format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port());

        let handle = thread::spawn(move || {
            for _ in 0..count {
                let Ok((mut stream, _)) = listener.accept() else { return };
                let mut buf = [0u8; 2048];
                let n = stream.read(&mut buf).unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();

                let (status, body) = routes
                    .iter()
                    .find(|(p, _, _)| *p == path)
                    .map(|(_, s, b)| (*s, b.clone()))
                    .unwrap_or((404, String::new()));
                let response = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(response.as_bytes()).unwrap();
                stream.flush().unwrap();
            }
        });
        (base, handle)
    }

    #[test]
    fn test_extract_credential() {
        assert_eq!(extract_credential("var us_id = 123456;").as_deref(), Some("123456"));
        assert_eq!(extract_credential("us_id='abc-9' ;").as_deref(), Some("abc-9"));
        assert_eq!(extract_credential(r#"us_id = "x1";"#).as_deref(), Some("x1"));
        assert_eq!(extract_credential("no credential here"), None);
    }

    #[tokio::test]
    async fn test_bootstrap_fetches_credential_then_catalog() {
        let routes = vec![
            ("/norilsk/", 200, "<script>var us_id = '777';</script>".to_string()),
            ("/city.js", 200, SCRIPT.to_string()),
        ];
        let (base, handle) = serve(routes, 2);

        let client = BootstrapClient::new(BootstrapConfig {
            page_url: format!("{base}/norilsk/"),
            script_url: format!("{base}/city.js"),
            max_retries: 0,
            ..Default::default()
        })
        .unwrap();

        let bootstrap = client.run().await.unwrap();
        handle.join().unwrap();

        assert_eq!(bootstrap.credential, "777");
        assert_eq!(bootstrap.catalog.stop_name("22411"), "Гвардейская");
        assert_eq!(bootstrap.catalog.vehicle_name("2227"), Some("1"));
    }

    #[tokio::test]
    async fn test_missing_credential_and_bad_status_fail() {
        let routes = vec![("/norilsk/", 200, "<html></html>".to_string())];
        let (base, handle) = serve(routes, 2);

        let client = BootstrapClient::new(BootstrapConfig {
            page_url: format!("{base}/norilsk/"),
            script_url: format!("{base}/missing.js"),
            max_retries: 0,
            ..Default::default()
        })
        .unwrap();

        assert!(matches!(client.credential().await, Err(BootstrapError::CredentialNotFound(_))));
        assert!(matches!(client.catalog().await, Err(BootstrapError::Status { status: 404, .. })));
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn test_offline_sources_skip_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let script_path = dir.path().join("city.js");
        std::fs::write(&script_path, SCRIPT).unwrap();

        let client = BootstrapClient::new(BootstrapConfig {
            page_url: "http://127.0.0.1:1/unused".to_string(),
            script_url: "http://127.0.0.1:1/unused".to_string(),
            credential: Some("cfg".to_string()),
            script_path: Some(script_path),
            ..Default::default()
        })
        .unwrap();

        let bootstrap = client.run().await.unwrap();
        assert_eq!(bootstrap.credential, "cfg");
        assert_eq!(bootstrap.catalog.stops.len(), 1);

        std::fs::write(dir.path().join("broken.js"), "stops=[];").unwrap();
        let broken = BootstrapClient::new(BootstrapConfig {
            credential: Some("cfg".to_string()),
            script_path: Some(dir.path().join("broken.js")),
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(
            broken.catalog().await,
            Err(BootstrapError::Catalog(CatalogError::PatternNotFound("BUSES")))
        ));
    }
}
