//! HTTP(S) rule transport.
//!
//! Fetches are single attempts: no retries, no redirects, and any
//! non-success status fails. The body is read through a hard byte cap so an
//! oversized document is refused without buffering it whole.

use std::io::Read;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use tracing::debug;

use verdict_contracts::error::{EngineError, EngineResult};
use verdict_core::traits::RuleTransport;

use crate::settings::ResolverSettings;

/// Blocking HTTP client implementing `RuleTransport`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    max_bytes: u64,
}

impl HttpTransport {
    pub fn new(settings: &ResolverSettings) -> EngineResult<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| EngineError::Config {
                reason: format!("cannot build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            max_bytes: settings.max_bytes,
        })
    }
}

impl RuleTransport for HttpTransport {
    fn fetch(&self, uri: &str) -> EngineResult<Vec<u8>> {
        let failed = |reason: String| EngineError::RuleFetchFailed {
            uri: uri.to_string(),
            reason,
        };

        let response = self
            .client
            .get(uri)
            .send()
            .map_err(|e| failed(format!("request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("server answered {status}")));
        }

        let mut bytes = Vec::new();
        response
            .take(self.max_bytes.saturating_add(1))
            .read_to_end(&mut bytes)
            .map_err(|e| failed(format!("reading body failed: {e}")))?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(failed(format!("document exceeds {} bytes", self.max_bytes)));
        }

        debug!(uri, bytes = bytes.len(), "rule document fetched");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use tiny_http::{Header, Response, Server};

    use verdict_contracts::error::EngineError;
    use verdict_core::traits::RuleTransport;

    use super::*;

    /// Serve exactly one request with `status` and `body`, returning the base URL.
    fn serve_once(status: u16, body: &'static [u8]) -> (String, thread::JoinHandle<()>) {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let response = Response::from_data(body)
                    .with_status_code(status)
                    .with_header(Header::from_bytes("Content-Type", "application/json").unwrap());
                let _ = request.respond(response);
            }
        });
        (format!("http://{addr}"), handle)
    }

    fn transport(max_bytes: u64) -> HttpTransport {
        HttpTransport::new(&ResolverSettings {
            max_bytes,
            ..ResolverSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn test_fetch_returns_exact_body() {
        let (base, handle) = serve_once(200, br#"{"rules":[]}"#);
        let bytes = transport(1024).fetch(&format!("{base}/rules.json")).unwrap();
        assert_eq!(bytes, br#"{"rules":[]}"#);
        handle.join().unwrap();
    }

    #[test]
    fn test_error_status_is_fetch_failure() {
        let (base, handle) = serve_once(404, b"not found");
        let err = transport(1024).fetch(&format!("{base}/missing")).unwrap_err();
        match err {
            EngineError::RuleFetchFailed { ref reason, .. } => assert!(reason.contains("404")),
            other => panic!("expected RuleFetchFailed, got {:?}", other),
        }
        handle.join().unwrap();
    }

    #[test]
    fn test_oversized_body_refused() {
        let (base, handle) = serve_once(200, br#"{"rules":[],"padding":"xxxxxxxxxxxxxxxx"}"#);
        let err = transport(8).fetch(&format!("{base}/big")).unwrap_err();
        assert!(matches!(err, EngineError::RuleFetchFailed { .. }));
        handle.join().unwrap();
    }

    #[test]
    fn test_redirect_is_not_followed() {
        let server = Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let response = Response::from_string("")
                    .with_status_code(302)
                    .with_header(Header::from_bytes("Location", "http://127.0.0.1:1/elsewhere").unwrap());
                let _ = request.respond(response);
            }
        });
        let err = transport(1024).fetch(&format!("http://{addr}/moved")).unwrap_err();
        assert!(matches!(err, EngineError::RuleFetchFailed { .. }));
        handle.join().unwrap();
    }

    #[test]
    fn test_unreachable_host_is_fetch_failure() {
        // Port 1 on loopback refuses connections.
        let err = transport(1024).fetch("http://127.0.0.1:1/rules.json").unwrap_err();
        assert!(matches!(err, EngineError::RuleFetchFailed { .. }));
    }
}
