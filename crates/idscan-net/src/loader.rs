//! `reqwest`-backed [`Fetcher`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, trace, warn};

use crate::{Fetcher, NetError, Request, Response};

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Accept-Language header.
    pub accept_language: String,
    /// Transport timeout applied when the request sets none.
    pub default_timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("idscan-offline/{}", env!("CARGO_PKG_VERSION")),
            accept_language: "en-US,en;q=0.9".to_string(),
            default_timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// Performs live fetches over HTTP.
pub struct HttpFetcher {
    client: Client,
    config: LoaderConfig,
}

impl HttpFetcher {
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.default_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!(user_agent = %config.user_agent, "HttpFetcher initialized");

        Ok(Self { client, config })
    }

    fn classify(&self, request: &Request, err: reqwest::Error) -> NetError {
        if err.is_timeout() {
            NetError::Timeout(request.timeout.unwrap_or(self.config.default_timeout))
        } else if err.is_connect() {
            NetError::Unreachable(format!("{}: {}", request.url, err))
        } else {
            NetError::HttpError(err)
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, mode = ?request.mode, "Fetching resource");

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .header("Accept-Language", &self.config.accept_language);

        if let Some(ref body) = request.body {
            req_builder = req_builder.body(body.clone());
        }

        if let Some(timeout) = request.timeout {
            req_builder = req_builder.timeout(timeout);
        }

        let response = match req_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Network fetch failed");
                return Err(self.classify(request, e));
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await.map_err(|e| self.classify(request, e))?;

        trace!(
            url = %url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        Ok(Response {
            url,
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use url::Url;
    use wiremock::matchers::{headers, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_loader_config_default() {
        let config = LoaderConfig::default();
        assert!(config.user_agent.starts_with("idscan-offline/"));
        assert_eq!(config.max_redirects, 10);
    }

    #[tokio::test]
    async fn test_fetch_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.html"))
            .and(headers("accept-language", vec!["en-US", "en;q=0.9"]))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<h1>ID Scanner</h1>", "text/html"))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(LoaderConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/index.html", server.uri())).unwrap();
        let response = fetcher.fetch(&Request::get(url)).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type().unwrap().essence_str(), "text/html");
        assert_eq!(response.text().unwrap(), "<h1>ID Scanner</h1>");
    }

    #[tokio::test]
    async fn test_http_error_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.png"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(LoaderConfig::default()).unwrap();
        let url = Url::parse(&format!("{}/missing.png", server.uri())).unwrap();
        let response = fetcher.fetch(&Request::get(url)).await.unwrap();

        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert!(!response.ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        let fetcher = HttpFetcher::new(LoaderConfig {
            default_timeout: Duration::from_secs(5),
            ..Default::default()
        })
        .unwrap();
        let url = Url::parse("http://127.0.0.1:1/").unwrap();

        assert!(fetcher.fetch(&Request::get(url)).await.is_err());
    }
}
