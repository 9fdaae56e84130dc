//! REST data service adapter speaking the PostgREST query dialect.
//!
//! Reads render as `GET /{resource}?select=..&col=eq.v&col=in.(a,b)&order=..`;
//! upserts are `POST` with `Prefer: resolution=merge-duplicates`; deletes are
//! `DELETE /{resource}?col=eq.v`. Every request carries the project key both
//! as `apikey` and as a bearer token.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::histogram;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::client::{DataService, Filter, Order, SelectRequest, ServiceError};
use crate::config::ServiceSettings;

use super::error::InfraError;

const SOURCE: &str = "infra::rest";
const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=representation";
const PREFER_INSERT: &str = "return=representation";

#[derive(Clone, Debug)]
pub struct RestDataService {
    client: Client,
    base: Url,
    api_key: String,
}

impl RestDataService {
    pub fn new(base: Url, api_key: impl Into<String>, timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base: with_trailing_slash(base),
            api_key: api_key.into(),
        })
    }

    pub fn from_settings(settings: &ServiceSettings) -> Result<Self, InfraError> {
        let url = settings.url.clone().ok_or_else(|| {
            InfraError::configuration("service.url is required to reach the data service")
        })?;
        let api_key = settings.api_key.clone().ok_or_else(|| {
            InfraError::configuration("service.api_key is required to reach the data service")
        })?;
        Self::new(url, api_key, settings.timeout)
    }

    pub fn user_agent() -> &'static str {
        concat!("pressroom/", env!("CARGO_PKG_VERSION"))
    }

    fn url(&self, resource: &str, pairs: &[(String, String)]) -> Result<Url, ServiceError> {
        let mut url = self
            .base
            .join(resource)
            .map_err(|err| ServiceError::invalid_request(format!("resource `{resource}`: {err}")))?;
        url.set_query(None);
        if !pairs.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in pairs {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, resource: &str, request: RequestBuilder) -> Result<Response, ServiceError> {
        let started = Instant::now();
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        histogram!("pressroom_service_request_ms", "resource" => resource.to_string())
            .record(started.elapsed().as_secs_f64() * 1000.0);
        debug!(
            target = SOURCE,
            resource,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "data service responded"
        );

        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status.as_u16(), &body))
    }

    async fn rows(&self, resource: &str, request: RequestBuilder) -> Result<Vec<Value>, ServiceError> {
        let response = self.send(resource, request).await?;
        let bytes = response.bytes().await.map_err(map_transport_error)?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes)
            .map_err(|err| ServiceError::decode(format!("{resource} response: {err}")))
    }
}

#[async_trait]
impl DataService for RestDataService {
    async fn select(&self, request: &SelectRequest) -> Result<Vec<Value>, ServiceError> {
        let url = self.url(&request.resource, &select_pairs(request))?;
        self.rows(&request.resource, self.request(Method::GET, url))
            .await
    }

    async fn upsert(&self, resource: &str, rows: Vec<Value>) -> Result<Vec<Value>, ServiceError> {
        let url = self.url(resource, &[])?;
        let request = self
            .request(Method::POST, url)
            .header("Prefer", PREFER_UPSERT)
            .json(&rows);
        self.rows(resource, request).await
    }

    async fn insert(&self, resource: &str, rows: Vec<Value>) -> Result<Vec<Value>, ServiceError> {
        let url = self.url(resource, &[])?;
        let request = self
            .request(Method::POST, url)
            .header("Prefer", PREFER_INSERT)
            .json(&rows);
        self.rows(resource, request).await
    }

    async fn delete(
        &self,
        resource: &str,
        filters: &BTreeMap<String, Filter>,
    ) -> Result<(), ServiceError> {
        let url = self.url(resource, &filter_pairs(filters))?;
        self.send(resource, self.request(Method::DELETE, url))
            .await
            .map(|_| ())
    }
}

/// Query parameters for a read, in the order they are sent.
pub fn select_pairs(request: &SelectRequest) -> Vec<(String, String)> {
    let mut pairs = vec![("select".to_string(), request.select.clone())];
    pairs.extend(filter_pairs(&request.filters));
    if !request.order.is_empty() {
        pairs.push(("order".to_string(), render_order(&request.order)));
    }
    match (request.range, request.limit) {
        (Some(range), _) => {
            pairs.push(("offset".to_string(), range.from.to_string()));
            pairs.push(("limit".to_string(), range.len().to_string()));
        }
        (None, Some(limit)) => pairs.push(("limit".to_string(), limit.to_string())),
        (None, None) => {}
    }
    pairs
}

pub fn filter_pairs(filters: &BTreeMap<String, Filter>) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|(column, filter)| (column.clone(), render_filter(filter)))
        .collect()
}

fn render_filter(filter: &Filter) -> String {
    match filter {
        Filter::Eq(value) => format!("eq.{}", scalar(value)),
        Filter::In(values) => {
            let items: Vec<String> = values.iter().map(list_item).collect();
            format!("in.({})", items.join(","))
        }
        Filter::Compare { operator, value } => format!("{operator}.{}", scalar(value)),
    }
}

fn render_order(order: &[Order]) -> String {
    order
        .iter()
        .map(|order| {
            let direction = if order.ascending { "asc" } else { "desc" };
            format!("{}.{direction}", order.column)
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// List members containing reserved characters are double-quoted.
fn list_item(value: &Value) -> String {
    let text = scalar(value);
    let reserved = |c: char| matches!(c, ',' | '(' | ')' | '"' | '\\' | ' ' | '.' | ':');
    if value.is_string() && text.contains(reserved) {
        format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        text
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn status_error(status: u16, body: &str) -> ServiceError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => ServiceError::status(
            status,
            parsed.code,
            parsed.message.unwrap_or_else(|| body.to_string()),
        ),
        Err(_) => ServiceError::status(status, None, body.to_string()),
    }
}

fn map_transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::timeout(err.to_string())
    } else if err.is_decode() || err.is_body() {
        ServiceError::decode(err.to_string())
    } else if err.is_builder() {
        ServiceError::invalid_request(err.to_string())
    } else {
        ServiceError::network(err.to_string())
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
