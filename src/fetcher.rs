use std::error::Error as _;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use crate::config::RunnerSettings;
use crate::utils::error::FetchError;

#[derive(Debug, Clone)]
pub struct Fetched {
    pub body: String,
    pub content_type: Option<String>,
}

/// Plain HTTP fetcher. One request per call, bounded by the configured
/// timeout; retry policy belongs to the run loop, not here.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    timeout_secs: u64,
}

impl Fetcher {
    pub fn new(settings: &RunnerSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Client {
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            timeout_secs: settings.request_timeout,
        })
    }

    pub async fn fetch(&self, url: &str) -> Result<Fetched, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response
            .text()
            .await
            .map_err(|e| classify(e, self.timeout_secs))?;

        Ok(Fetched { body, content_type })
    }
}

// reqwest does not expose DNS failures as their own kind; they surface
// inside the connect error chain.
fn classify(error: reqwest::Error, timeout_secs: u64) -> FetchError {
    if error.is_timeout() {
        return FetchError::Timeout { timeout_secs };
    }

    let mut message = error.to_string();
    let mut is_dns = false;
    let mut source: Option<&(dyn std::error::Error + 'static)> = error.source();
    while let Some(err) = source {
        let text = err.to_string();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            is_dns = true;
        }
        message = text;
        source = err.source();
    }

    if is_dns {
        FetchError::Dns { message }
    } else {
        FetchError::Connection { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_settings(timeout_secs: u64) -> RunnerSettings {
        RunnerSettings {
            request_timeout: timeout_secs,
            user_agent: "TestAgent/1.0".to_string(),
            retry_attempts: 1,
            retry_delay_ms: 10,
            min_sleep_ms: 10,
        }
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/product"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html>Add to Cart</html>")
                    .insert_header("content-type", "text/html"),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&test_settings(5)).unwrap();
        let fetched = fetcher.fetch(&format!("{}/product", server.uri())).await.unwrap();

        assert!(fetched.body.contains("Add to Cart"));
        assert_eq!(fetched.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn test_fetch_maps_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&test_settings(5)).unwrap();
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();

        assert!(matches!(err, FetchError::HttpStatus { status: 503 }));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_millis(1500)),
            )
            .mount(&server)
            .await;

        let fetcher = Fetcher::new(&test_settings(1)).unwrap();
        let err = fetcher.fetch(&server.uri()).await.unwrap_err();

        assert!(matches!(err, FetchError::Timeout { timeout_secs: 1 }));
    }

    #[tokio::test]
    async fn test_fetch_reports_connection_errors() {
        // Nothing listens on this port.
        let fetcher = Fetcher::new(&test_settings(2)).unwrap();
        let err = fetcher.fetch("http://127.0.0.1:9/").await.unwrap_err();

        assert!(matches!(
            err,
            FetchError::Connection { .. } | FetchError::Timeout { .. }
        ));
    }
}
