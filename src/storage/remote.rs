use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::CACHE_CONTROL;
use serde::Serialize;
use serde_json::Value;

use super::{records_from_values, RecordStore, StoreError};
use crate::record::Record;

/// HTTP JSON endpoint: `GET` answers `{ok, items}`, `POST {items}` answers
/// `{ok}`.
pub struct RemoteStore {
    endpoint: String,
    client: Client,
}

#[derive(Serialize)]
struct SaveBody<'a> {
    items: &'a [Record],
}

impl RemoteStore {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            endpoint: endpoint.trim().to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn read_body(response: Response) -> Result<Value, StoreError> {
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status(status.as_u16()));
        }
        let text = response.text()?;
        let body: Value = serde_json::from_str(&text).map_err(StoreError::Decode)?;
        if !body.get("ok").map(is_truthy).unwrap_or(false) {
            return Err(StoreError::Rejected);
        }
        Ok(body)
    }
}

impl RecordStore for RemoteStore {
    fn load(&self) -> Result<Vec<Record>, StoreError> {
        let response = self
            .client
            .get(&self.endpoint)
            .header(CACHE_CONTROL, "no-store")
            .send()?;
        let mut body = Self::read_body(response)?;
        match body.get_mut("items").map(Value::take) {
            Some(Value::Array(values)) => Ok(records_from_values(values)),
            _ => Ok(Vec::new()),
        }
    }

    fn save(&self, records: &[Record]) -> Result<(), StoreError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SaveBody { items: records })
            .send()?;
        Self::read_body(response)?;
        Ok(())
    }
}

/// JavaScript-style truthiness, as the endpoint's `ok` flag is loosely typed.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().map(|n| n != 0.0 && !n.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
