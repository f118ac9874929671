//! Blocking client for envelope-style JSON REST APIs.
//!
//! # Design
//! Every operation is three steps: build an `HttpRequest` (`build_request`),
//! hand it to a `Transport`, and interpret the `HttpResponse` (`load`). The
//! first and last steps are pure, so they are public and usable on their own
//! by callers that execute requests themselves.
//!
//! Responses are wrapped in an envelope, `{"meta": {...}, "data": ...}`.
//! `load` returns `data` untouched; identifier clean-up is left to
//! `record::normalize` so records are only rewritten when the caller asks.

use std::fmt::Display;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::form_urlencoded;
use url::Url;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::record::{record_id, Record};
use crate::resource::Resource;
use crate::transport::{Transport, UreqTransport};

pub type Result<T> = std::result::Result<T, ApiError>;

/// Outcome of `RestClient::create`.
#[derive(Debug, Clone, PartialEq)]
pub enum Created {
    /// Loaded `data` of the created resource.
    Loaded(Value),
    /// The raw 201 body, returned when `return_response` was requested and
    /// the server gave no path-rooted `Location`.
    Response(String),
}

impl Created {
    /// Collapse into a JSON value. A raw body that is not JSON becomes a string.
    pub fn into_value(self) -> Value {
        match self {
            Created::Loaded(value) => value,
            Created::Response(body) => {
                serde_json::from_str(&body).unwrap_or(Value::String(body))
            }
        }
    }
}

/// REST client bound to one configuration and one transport.
#[derive(Debug, Clone)]
pub struct RestClient<T = UreqTransport> {
    config: ClientConfig,
    transport: T,
}

impl RestClient<UreqTransport> {
    /// Client over HTTP(S) to the configured host.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = UreqTransport::new(&config)?;
        Ok(Self { config, transport })
    }
}

impl<T: Transport> RestClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Mutable access to the configuration. Path, credentials and verbosity
    /// take effect on the next request; host, port, scheme, timeout and
    /// certificate policy are baked into the transport at construction.
    pub fn config_mut(&mut self) -> &mut ClientConfig {
        &mut self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// View of the client bound to a single resource type.
    pub fn resource(&self, typ: impl Into<String>) -> Resource<'_, T> {
        Resource::new(self, typ)
    }

    /// `<path><typ>[/<id>][?<query>]`. An empty `id` is treated as absent.
    pub fn url(&self, typ: &str, id: Option<&str>, query: &[(&str, &str)]) -> String {
        let mut url = format!("{}{typ}", self.config.path);
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            url.push('/');
            url.push_str(id);
        }
        if !query.is_empty() {
            url.push('?');
            url.push_str(
                &form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(query)
                    .finish(),
            );
        }
        url
    }

    /// Describe a request: JSON accept header, Basic credentials when a user
    /// is configured, and a JSON body unless `body` is empty.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<HttpRequest> {
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];

        if let Some(user) = self.config.user.as_deref().filter(|u| !u.is_empty()) {
            let password = self.config.password.as_deref().unwrap_or_default();
            let token = STANDARD.encode(format!("{user}:{password}"));
            headers.push(("Authorization".to_string(), format!("Basic {token}")));
        }

        let body = match body.filter(|b| !is_falsy(b)) {
            Some(value) => {
                let encoded = serde_json::to_string(value)?;
                headers.push(("Content-Length".to_string(), encoded.len().to_string()));
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                Some(encoded)
            }
            None => None,
        };

        Ok(HttpRequest {
            method,
            path: path.to_string(),
            headers,
            body,
        })
    }

    /// Send a request over the client's own transport.
    pub fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        self.request_via(&self.transport, method, path, body)
    }

    /// Send a request over a caller-supplied transport.
    pub fn request_via<U: Transport + ?Sized>(
        &self,
        transport: &U,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<HttpResponse> {
        let request = self.build_request(method, path, body)?;
        if self.config.verbose {
            tracing::info!(
                method = %request.method,
                path = %request.path,
                headers = ?redacted(&request.headers),
                body = request.body.as_deref().unwrap_or(""),
                "request"
            );
        }
        transport.send(&request)
    }

    /// Interpret a response: `data` of the envelope below 300, a typed
    /// failure otherwise. An undecodable body reads as `{}`, and an empty
    /// body on success yields an empty array.
    pub fn load(&self, response: &HttpResponse) -> Result<Value> {
        let body = decode_body(&response.body);
        if response.status < 300 {
            return Ok(envelope_data(body));
        }
        Err(self.throw(response, &body))
    }

    /// Map a failing response to its typed failure.
    pub fn throw(&self, response: &HttpResponse, body: &Value) -> ApiError {
        if self.config.verbose {
            tracing::info!(status = response.status, body = %body, "error response");
        }
        let err = ApiError::from_response(response.status, body);
        tracing::debug!(error = %err, "request failed");
        err
    }

    /// List records of a type. `query` usually carries `skip` and `limit`.
    pub fn all(&self, typ: &str, query: &[(&str, &str)]) -> Result<Value> {
        let response = self.request(HttpMethod::Get, &self.url(typ, None, query), None)?;
        self.load(&response)
    }

    /// `all`, deserialized into `D`.
    pub fn all_as<D: DeserializeOwned>(&self, typ: &str, query: &[(&str, &str)]) -> Result<D> {
        Ok(serde_json::from_value(self.all(typ, query)?)?)
    }

    /// Fetch one record by id.
    pub fn get(&self, typ: &str, id: impl Display) -> Result<Value> {
        let id = id.to_string();
        let response = self.request(HttpMethod::Get, &self.url(typ, Some(&id), &[]), None)?;
        self.load(&response)
    }

    /// `get`, deserialized into `D`.
    pub fn get_as<D: DeserializeOwned>(&self, typ: &str, id: impl Display) -> Result<D> {
        Ok(serde_json::from_value(self.get(typ, id)?)?)
    }

    /// POST a new record. Only 201 counts as success.
    ///
    /// A path-rooted `Location` is fetched and its data returned. Otherwise
    /// `return_response` short-circuits to the raw 201 body; an absolute
    /// `http(s)` location is fetched over a transport to that authority; a
    /// missing location returns the data of the 201 body itself.
    pub fn create(&self, typ: &str, record: &Record, return_response: bool) -> Result<Created> {
        let body = Value::Object(record.clone());
        let response = self.request(HttpMethod::Post, &self.url(typ, None, &[]), Some(&body))?;
        if response.status != 201 {
            return Err(self.throw(&response, &decode_body(&response.body)));
        }

        let location = response.header("location");
        if let Some(path) = location.filter(|l| l.starts_with('/')) {
            let followed = self.request(HttpMethod::Get, path, None)?;
            return self.load(&followed).map(Created::Loaded);
        }
        if return_response {
            return Ok(Created::Response(response.body.clone()));
        }
        match location {
            Some(absolute) => self.follow_absolute(absolute).map(Created::Loaded),
            None => self.load(&response).map(Created::Loaded),
        }
    }

    fn follow_absolute(&self, location: &str) -> Result<Value> {
        let unsupported = || ApiError::UnsupportedRedirect(location.to_string());
        let url = Url::parse(location).map_err(|_| unsupported())?;
        if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
            return Err(unsupported());
        }

        let transport = UreqTransport::with_origin(url.origin().ascii_serialization(), &self.config);
        let path = match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        };
        tracing::debug!(origin = transport.origin(), %path, "following absolute location");
        let response = self.request_via(&transport, HttpMethod::Get, &path, None)?;
        self.load(&response)
    }

    /// PUT the given fields to an existing record.
    pub fn update(&self, typ: &str, id: impl Display, fields: &Record) -> Result<Value> {
        let id = id.to_string();
        let body = Value::Object(fields.clone());
        let response = self.request(HttpMethod::Put, &self.url(typ, Some(&id), &[]), Some(&body))?;
        self.load(&response)
    }

    /// Update when the record has an `id`, create otherwise.
    pub fn save(&self, typ: &str, record: &Record) -> Result<Value> {
        match record_id(record) {
            Some(id) => self.update(typ, id, record),
            None => self.create(typ, record, false).map(Created::into_value),
        }
    }

    /// DELETE a record.
    pub fn remove(&self, typ: &str, id: impl Display) -> Result<Value> {
        let id = id.to_string();
        let response = self.request(HttpMethod::Delete, &self.url(typ, Some(&id), &[]), None)?;
        self.load(&response)
    }
}

fn decode_body(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::Object(Map::new()))
}

fn envelope_data(body: Value) -> Value {
    if is_falsy(&body) {
        return Value::Array(Vec::new());
    }
    match body {
        Value::Object(mut envelope) => envelope
            .remove("data")
            .unwrap_or_else(|| Value::Array(Vec::new())),
        _ => Value::Array(Vec::new()),
    }
}

/// Empty containers, empty strings, zero, `false` and `null`.
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

fn redacted(headers: &[(String, String)]) -> Vec<(&str, &str)> {
    headers
        .iter()
        .map(|(name, value)| {
            if name.eq_ignore_ascii_case("authorization") {
                (name.as_str(), "<redacted>")
            } else {
                (name.as_str(), value.as_str())
            }
        })
        .collect()
}
