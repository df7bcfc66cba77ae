use rand::prelude::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, ClientBuilder, Proxy, Response};
use std::time::Duration;

use super::HttpRequest;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) \
     Gecko/20100101 Firefox/120.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_0) AppleWebKit/605.1.15 \
     (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
];

/// Client used against the target under test.
///
/// Every request carries the configured per-request timeout; custom headers
/// are attached to every request and a desktop User-Agent is picked when the
/// caller did not set one.
pub struct HttpClient {
    inner: Client,
    timeout: Duration,
    default_headers: HeaderMap,
}

impl HttpClient {
    pub fn new(
        timeout: Duration,
        proxy_url: Option<&str>,
        custom_headers: &[(String, String)],
    ) -> Result<Self, reqwest::Error> {
        let mut builder = ClientBuilder::new()
            .timeout(timeout)
            .danger_accept_invalid_certs(true);

        if let Some(proxy) = proxy_url {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        let inner = builder.build()?;

        let mut default_headers = HeaderMap::new();
        for (key, val) in custom_headers {
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(val),
            ) {
                (Ok(name), Ok(value)) => {
                    default_headers.insert(name, value);
                }
                _ => log::warn!("Ignoring invalid header '{}'", key),
            }
        }

        Ok(Self {
            inner,
            timeout,
            default_headers,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn send_request(&self, req: &HttpRequest) -> Result<Response, reqwest::Error> {
        let mut builder = self.inner.request(req.method.clone(), req.url.as_str());

        for (name, value) in self.default_headers.iter() {
            builder = builder.header(name, value);
        }

        if !self.default_headers.contains_key(USER_AGENT) {
            builder = builder.header(USER_AGENT, random_user_agent());
        }

        if let Some(content_type) = req.body_type.content_type() {
            if !self.default_headers.contains_key(CONTENT_TYPE) {
                builder = builder.header(CONTENT_TYPE, content_type);
            }
            builder = builder.body(req.body.clone());
        }

        builder.timeout(self.timeout).send().await
    }
}

fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    USER_AGENTS.choose(&mut rng).copied().unwrap_or("Mozilla/5.0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_keeps_valid_headers_only() {
        let headers = vec![
            ("Authorization".to_string(), "Bearer abc".to_string()),
            ("Bad Header".to_string(), "x".to_string()),
        ];
        let client = HttpClient::new(Duration::from_secs(8), None, &headers).unwrap();
        assert_eq!(client.default_headers.len(), 1);
        assert_eq!(client.timeout(), Duration::from_secs(8));
    }

    #[test]
    fn test_invalid_proxy_is_an_error() {
        assert!(HttpClient::new(Duration::from_secs(1), Some("::not a proxy::"), &[]).is_err());
    }

    #[test]
    fn test_random_user_agent_from_pool() {
        assert!(USER_AGENTS.contains(&random_user_agent()));
    }
}
