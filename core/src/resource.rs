//! Per-type view over a `RestClient`.
//!
//! `client.resource("obj")` forwards `all/get/save/remove` with the type
//! filled in; it holds nothing but the borrowed client and the name.

use std::fmt::Display;

use serde_json::Value;

use crate::client::{RestClient, Result};
use crate::record::Record;
use crate::transport::Transport;

/// A `RestClient` with the resource type filled in.
#[derive(Debug)]
pub struct Resource<'a, T> {
    client: &'a RestClient<T>,
    typ: String,
}

impl<'a, T: Transport> Resource<'a, T> {
    pub fn new(client: &'a RestClient<T>, typ: impl Into<String>) -> Self {
        Self {
            client,
            typ: typ.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.typ
    }

    pub fn all(&self, query: &[(&str, &str)]) -> Result<Value> {
        self.client.all(&self.typ, query)
    }

    pub fn get(&self, id: impl Display) -> Result<Value> {
        self.client.get(&self.typ, id)
    }

    pub fn save(&self, record: &Record) -> Result<Value> {
        self.client.save(&self.typ, record)
    }

    pub fn remove(&self, id: impl Display) -> Result<Value> {
        self.client.remove(&self.typ, id)
    }
}
