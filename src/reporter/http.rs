//! HTTP reporting sink.
//!
//! POSTs each cycle's events as a JSON array to the collector endpoint.

use std::time::Duration;

use reqwest::Client;

use crate::event::AttributedEvent;
use crate::reporter::{ReportError, ReportSink};

/// Default request timeout (5 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Reports events to a remote collector over HTTP.
pub struct HttpReporter {
    endpoint: reqwest::Url,
    client: Client,
    timeout: Duration,
}

impl HttpReporter {
    /// Create a reporter for `endpoint`.
    ///
    /// # Errors
    /// Returns `ReportError::Config` if the URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ReportError> {
        let endpoint = reqwest::Url::parse(endpoint).map_err(|e| {
            ReportError::Config(format!("invalid endpoint '{}': {}", endpoint, e))
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReportError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint,
            client,
            timeout,
        })
    }

    /// Collector endpoint.
    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

impl std::fmt::Debug for HttpReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReporter")
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl ReportSink for HttpReporter {
    async fn report(&self, events: Vec<AttributedEvent>) -> Result<(), ReportError> {
        let count = events.len();
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&events)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReportError::Timeout
                } else {
                    ReportError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                endpoint = %self.endpoint,
                status = status.as_u16(),
                events = count,
                "Collector rejected events"
            );
            return Err(ReportError::Status(status.as_u16()));
        }

        tracing::debug!(endpoint = %self.endpoint, events = count, "Events reported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_reporter_invalid_endpoint() {
        let result = HttpReporter::new("not a url", DEFAULT_REQUEST_TIMEOUT);
        assert!(matches!(result, Err(ReportError::Config(_))));
    }

    #[test]
    fn test_http_reporter_endpoint() {
        let reporter =
            HttpReporter::new("http://10.0.2.2:8080/addEvent", DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(reporter.endpoint(), "http://10.0.2.2:8080/addEvent");
    }

    #[tokio::test]
    async fn test_http_reporter_connection_refused() {
        // Port 9 (discard) is very unlikely to have a listener on loopback.
        let reporter =
            HttpReporter::new("http://127.0.0.1:9/addEvent", Duration::from_secs(2)).unwrap();
        let result = reporter.report(Vec::new()).await;
        assert!(matches!(
            result,
            Err(ReportError::Http(_)) | Err(ReportError::Timeout)
        ));
    }
}
