//! Transports execute an `HttpRequest` and hand back an `HttpResponse`.
//!
//! `UreqTransport` is the blocking default. Status codes are never treated as
//! errors here; interpreting them is the client's job.

use std::fmt;
use std::time::Duration;

use ureq::tls::TlsConfig;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Largest response body read into memory.
pub const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

/// Executes one request/response exchange.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        (**self).send(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        (**self).send(request)
    }
}

/// Blocking HTTP(S) transport bound to one origin.
///
/// Paths starting with `http://` or `https://` are sent as-is; anything else
/// is resolved against the origin.
#[derive(Clone)]
pub struct UreqTransport {
    origin: String,
    agent: ureq::Agent,
}

impl fmt::Debug for UreqTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UreqTransport")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl UreqTransport {
    /// Transport for the configured host, port and scheme.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        Ok(Self::with_origin(config.origin()?, config))
    }

    /// Transport for an explicit `scheme://authority`, reusing the timeout
    /// and certificate policy from `config`.
    pub fn with_origin(origin: impl Into<String>, config: &ClientConfig) -> Self {
        Self {
            origin: origin.into().trim_end_matches('/').to_string(),
            agent: build_agent(config.timeout(), config.validate_ssl),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{path}", self.origin)
        } else {
            format!("{}/{path}", self.origin)
        }
    }
}

fn build_agent(timeout: Option<Duration>, validate_ssl: bool) -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(timeout)
        .tls_config(
            TlsConfig::builder()
                .disable_verification(!validate_ssl)
                .build(),
        )
        .build()
        .new_agent()
}

/// ureq derives Content-Length from the body itself.
fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = self.resolve(&request.path);
        let headers = &request.headers;
        tracing::debug!(method = %request.method, %url, "sending request");

        let mut response = match (request.method, request.body.as_deref()) {
            (HttpMethod::Get, _) => with_headers(self.agent.get(&url), headers).call(),
            (HttpMethod::Delete, _) => with_headers(self.agent.delete(&url), headers).call(),
            (HttpMethod::Post, Some(body)) => {
                with_headers(self.agent.post(&url), headers).send(body.as_bytes())
            }
            (HttpMethod::Post, None) => with_headers(self.agent.post(&url), headers).send_empty(),
            (HttpMethod::Put, Some(body)) => {
                with_headers(self.agent.put(&url), headers).send(body.as_bytes())
            }
            (HttpMethod::Put, None) => with_headers(self.agent.put(&url), headers).send_empty(),
        }?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        // Bodies that are not UTF-8 decode lossily so the loader still sees the status.
        let raw = response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_vec()?;
        let body = String::from_utf8_lossy(&raw).into_owned();
        tracing::debug!(status, bytes = raw.len(), "received response");

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> UreqTransport {
        let mut config = ClientConfig::new("localhost");
        config.port = Some(8080);
        config.ssl = false;
        UreqTransport::new(&config).unwrap()
    }

    #[test]
    fn origin_comes_from_config() {
        assert_eq!(transport().origin(), "http://localhost:8080");
    }

    #[test]
    fn relative_paths_resolve_against_origin() {
        let t = transport();
        assert_eq!(t.resolve("/api/obj"), "http://localhost:8080/api/obj");
        assert_eq!(t.resolve("api/obj"), "http://localhost:8080/api/obj");
    }

    #[test]
    fn absolute_urls_pass_through() {
        let t = transport();
        assert_eq!(t.resolve("https://other:9/api/obj/1"), "https://other:9/api/obj/1");
    }

    #[test]
    fn missing_host_is_a_config_error() {
        let err = UreqTransport::new(&ClientConfig::default()).unwrap_err();
        assert!(matches!(err, ApiError::InvalidConfig(_)));
    }

    #[test]
    fn explicit_origin_drops_trailing_slash() {
        let t = UreqTransport::with_origin("https://example.com/", &ClientConfig::default());
        assert_eq!(t.origin(), "https://example.com");
    }
}
