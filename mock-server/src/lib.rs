//! In-memory envelope API used to exercise the client end to end.
//!
//! Every body is `{"meta": {...}, "data": ...}`. Records are stored per
//! resource type with a numeric `_id` and a `_rev` that changes on each write.
//! Single-record endpoints answer with a one-element `data` list.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub type Record = Map<String, Value>;

/// Fields the server owns; ignored when present in request bodies.
const RESERVED: [&str; 4] = ["id", "_id", "_rev", "pk"];

#[derive(Debug, Clone, Default)]
pub struct Options {
    /// When set, every request must carry matching Basic credentials.
    pub credentials: Option<(String, String)>,
    /// Prefix for `Location` headers, e.g. `http://127.0.0.1:3000`. Empty
    /// means path-rooted locations.
    pub location_base: Option<String>,
}

#[derive(Debug, Default)]
pub struct Collection {
    next_id: u64,
    records: BTreeMap<u64, Record>,
}

pub type Db = Arc<RwLock<HashMap<String, Collection>>>;

#[derive(Clone)]
struct AppState {
    db: Db,
    options: Arc<Options>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

/// Error reply: status plus `meta`, with `meta.error` always set.
#[derive(Debug)]
pub struct Failure {
    status: StatusCode,
    meta: Record,
}

impl Failure {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        let mut meta = Record::new();
        meta.insert("error".to_string(), Value::String(error.into()));
        Self { status, meta }
    }

    fn with_field(mut self, field: &str, problem: &str) -> Self {
        self.meta
            .insert(field.to_string(), Value::String(problem.to_string()));
        self
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "meta": self.meta, "data": [] }))).into_response()
    }
}

fn envelope(status: StatusCode, data: Value) -> Response {
    (status, Json(json!({ "meta": {}, "data": data }))).into_response()
}

pub fn app() -> Router {
    app_with(Options::default())
}

pub fn app_with(options: Options) -> Router {
    let state = AppState {
        db: Db::default(),
        options: Arc::new(options),
    };
    Router::new()
        .route("/api/{typ}", get(list_records).post(create_record))
        .route(
            "/api/{typ}/{id}",
            get(get_record).put(update_record).delete(delete_record),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with(listener, Options::default()).await
}

pub async fn run_with(listener: TcpListener, options: Options) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(options)).await
}

/// `Basic base64(user:password)` for the given credentials.
pub fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some((user, password)) = &state.options.credentials {
        let expected = basic_auth(user, password);
        let supplied = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if supplied != Some(expected.as_str()) {
            tracing::warn!(uri = %request.uri(), "rejected unauthenticated request");
            return Failure::new(StatusCode::UNAUTHORIZED, "authentication required").into_response();
        }
    }
    next.run(request).await
}

/// Decode a request body into record fields, dropping server-owned keys.
fn parse_fields(body: &Bytes) -> Result<Record, Failure> {
    if body.is_empty() {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "record required"));
    }
    let mut fields = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => fields,
        Ok(_) => return Err(Failure::new(StatusCode::BAD_REQUEST, "record must be an object")),
        Err(e) => return Err(Failure::new(StatusCode::BAD_REQUEST, format!("invalid JSON: {e}"))),
    };
    for key in RESERVED {
        fields.remove(key);
    }
    let missing: Vec<String> = fields
        .iter()
        .filter(|(_, v)| v.is_null())
        .map(|(k, _)| k.clone())
        .collect();
    if !missing.is_empty() {
        return Err(missing.iter().fold(
            Failure::new(StatusCode::BAD_REQUEST, "value required"),
            |failure, field| failure.with_field(field, "value required"),
        ));
    }
    Ok(fields)
}

fn parse_id(typ: &str, raw: &str) -> Result<u64, Failure> {
    raw.parse()
        .map_err(|_| Failure::new(StatusCode::NOT_FOUND, format!("{typ} {raw} not found")))
}

fn stamp(id: u64, mut record: Record) -> Record {
    record.insert("_id".to_string(), json!(id));
    record.insert("_rev".to_string(), json!(Uuid::new_v4().to_string()));
    record
}

async fn list_records(
    State(state): State<AppState>,
    Path(typ): Path<String>,
    Query(params): Query<ListParams>,
) -> Response {
    let db = state.db.read().await;
    let records: Vec<Value> = db
        .get(&typ)
        .map(|c| {
            c.records
                .values()
                .skip(params.skip.unwrap_or(0))
                .take(params.limit.unwrap_or(usize::MAX))
                .cloned()
                .map(Value::Object)
                .collect()
        })
        .unwrap_or_default();
    tracing::debug!(%typ, count = records.len(), "listed records");
    envelope(StatusCode::OK, Value::Array(records))
}

async fn create_record(
    State(state): State<AppState>,
    Path(typ): Path<String>,
    body: Bytes,
) -> Result<Response, Failure> {
    let fields = parse_fields(&body)?;
    let mut db = state.db.write().await;
    let collection = db.entry(typ.clone()).or_default();
    collection.next_id += 1;
    let id = collection.next_id;
    let record = stamp(id, fields);
    collection.records.insert(id, record.clone());
    tracing::info!(%typ, id, "created record");

    let base = state.options.location_base.as_deref().unwrap_or("");
    let location = format!("{base}/api/{typ}/{id}");
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&location) {
        headers.insert(header::LOCATION, value);
    }
    Ok((
        StatusCode::CREATED,
        headers,
        Json(json!({ "meta": {}, "data": [record] })),
    )
        .into_response())
}

async fn get_record(
    State(state): State<AppState>,
    Path((typ, id)): Path<(String, String)>,
) -> Result<Response, Failure> {
    let id = parse_id(&typ, &id)?;
    let db = state.db.read().await;
    let record = db
        .get(&typ)
        .and_then(|c| c.records.get(&id))
        .cloned()
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, format!("{typ} {id} not found")))?;
    Ok(envelope(StatusCode::OK, json!([record])))
}

async fn update_record(
    State(state): State<AppState>,
    Path((typ, id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, Failure> {
    let id = parse_id(&typ, &id)?;
    let fields = parse_fields(&body)?;
    let mut db = state.db.write().await;
    let record = db
        .get_mut(&typ)
        .and_then(|c| c.records.get_mut(&id))
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, format!("{typ} {id} not found")))?;
    let mut merged = std::mem::take(record);
    merged.extend(fields);
    *record = stamp(id, merged);
    tracing::info!(%typ, id, "updated record");
    Ok(envelope(StatusCode::OK, json!([record.clone()])))
}

async fn delete_record(
    State(state): State<AppState>,
    Path((typ, id)): Path<(String, String)>,
) -> Result<StatusCode, Failure> {
    let id = parse_id(&typ, &id)?;
    let mut db = state.db.write().await;
    db.get_mut(&typ)
        .and_then(|c| c.records.remove(&id))
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, format!("{typ} {id} not found")))?;
    tracing::info!(%typ, id, "deleted record");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fields_drops_reserved_keys() {
        let body = Bytes::from_static(br#"{"id":1,"_id":1,"_rev":"x","pk":1,"name":"a"}"#);
        let fields = parse_fields(&body).unwrap();
        assert_eq!(Value::Object(fields), json!({ "name": "a" }));
    }

    #[test]
    fn parse_fields_requires_a_body() {
        let failure = parse_fields(&Bytes::new()).unwrap_err();
        assert_eq!(failure.status, StatusCode::BAD_REQUEST);
        assert_eq!(failure.meta["error"], "record required");
    }

    #[test]
    fn parse_fields_rejects_non_objects() {
        let failure = parse_fields(&Bytes::from_static(b"[1,2]")).unwrap_err();
        assert_eq!(failure.meta["error"], "record must be an object");
    }

    #[test]
    fn parse_fields_reports_null_fields() {
        let failure = parse_fields(&Bytes::from_static(br#"{"name":null,"size":3}"#)).unwrap_err();
        assert_eq!(failure.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            Value::Object(failure.meta),
            json!({ "error": "value required", "name": "value required" })
        );
    }

    #[test]
    fn stamp_sets_identity_and_fresh_revision() {
        let first = stamp(4, Record::new());
        let second = stamp(4, first.clone());
        assert_eq!(first["_id"], 4);
        assert_ne!(first["_rev"], second["_rev"]);
    }

    #[test]
    fn non_numeric_id_is_not_found() {
        let failure = parse_id("obj", "abc").unwrap_err();
        assert_eq!(failure.status, StatusCode::NOT_FOUND);
        assert_eq!(failure.meta["error"], "obj abc not found");
    }

    #[test]
    fn basic_auth_header() {
        assert_eq!(basic_auth("user", "pass"), "Basic dXNlcjpwYXNz");
    }
}
