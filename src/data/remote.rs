//! Remote feature layer access.
//!
//! Layers are configured as `id -> layer URL` pairs pointing at a feature
//! service REST endpoint: `<layer-url>?f=json` returns layer metadata and
//! `<layer-url>/query` returns attribute rows for a `WHERE` predicate.
//! Every outbound call is bounded by the configured timeout.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use super::{filter, DataError, FieldDef, LayerSchema, Record};

/// Client over the configured set of remote feature layers.
pub struct RemoteLayers {
    client: reqwest::Client,
    api_key: Option<String>,
    layers: HashMap<String, Url>,
}

impl RemoteLayers {
    /// Build the client from configured `(id, url)` pairs.
    pub fn new(
        layers: &[(String, String)],
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut parsed = HashMap::new();
        for (id, raw) in layers {
            let url = Url::parse(raw)
                .map_err(|e| anyhow::anyhow!("invalid URL for layer '{}': {}", id, e))?;
            parsed.insert(id.clone(), url);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("atlas-agent/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            layers: parsed,
        })
    }

    /// Configured layer ids, for prompt assembly.
    pub fn layer_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.layers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Fetch field names and types for a layer.
    pub async fn describe_layer(&self, layer_id: &str) -> Result<LayerSchema, DataError> {
        let base = self.layer_url(layer_id)?;

        let mut url = base.clone();
        self.append_auth(&mut url);
        url.query_pairs_mut().append_pair("f", "json");

        let body = self.fetch_json(url).await?;
        if let Some(error) = body.get("error") {
            return Err(DataError::SourceUnavailable(service_error_text(error)));
        }

        let fields = body
            .get("fields")
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|f| {
                        Some(FieldDef {
                            name: f.get("name")?.as_str()?.to_string(),
                            field_type: f
                                .get("type")
                                .and_then(Value::as_str)
                                .unwrap_or("unknown")
                                .to_string(),
                            alias: f.get("alias").and_then(Value::as_str).map(str::to_string),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(LayerSchema {
            layer: layer_id.to_string(),
            name: body
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            geometry_type: body
                .get("geometryType")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            fields,
        })
    }

    /// Query attribute rows matching a filter expression.
    ///
    /// The expression is validated locally before any network traffic. An
    /// empty match is an empty vec, not an error.
    pub async fn query_layer(
        &self,
        layer_id: &str,
        filter_expression: &str,
        max_rows: usize,
    ) -> Result<Vec<Record>, DataError> {
        let base = self.layer_url(layer_id)?;
        filter::validate(filter_expression)?;

        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| DataError::SourceUnavailable(format!("layer URL is not a base: {}", base)))?
            .pop_if_empty()
            .push("query");
        self.append_auth(&mut url);
        url.query_pairs_mut()
            .append_pair("where", filter_expression)
            .append_pair("outFields", "*")
            .append_pair("returnGeometry", "false")
            .append_pair("resultRecordCount", &max_rows.to_string())
            .append_pair("f", "json");

        let body = self.fetch_json(url).await?;
        if let Some(error) = body.get("error") {
            // The filter passed local validation, so a service-side rejection
            // means a predicate over fields the layer does not have.
            return Err(DataError::InvalidFilter(service_error_text(error)));
        }

        let rows = body
            .get("features")
            .and_then(Value::as_array)
            .map(|features| {
                features
                    .iter()
                    .filter_map(|f| f.get("attributes").and_then(Value::as_object).cloned())
                    .take(max_rows)
                    .collect()
            })
            .unwrap_or_default();

        Ok(rows)
    }

    fn layer_url(&self, layer_id: &str) -> Result<&Url, DataError> {
        self.layers
            .get(layer_id)
            .ok_or_else(|| DataError::NotFound(format!("unknown layer: {}", layer_id)))
    }

    fn append_auth(&self, url: &mut Url) {
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("token", key);
        }
    }

    async fn fetch_json(&self, url: Url) -> Result<Value, DataError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataError::SourceUnavailable(format!(
                "feature service returned {}",
                status
            )));
        }

        response.json().await.map_err(transport_error)
    }
}

fn transport_error(e: reqwest::Error) -> DataError {
    if e.is_timeout() {
        DataError::SourceUnavailable("feature service timed out".to_string())
    } else {
        DataError::SourceUnavailable(format!("feature service unreachable: {}", e))
    }
}

fn service_error_text(error: &Value) -> String {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("feature service rejected the request");
    match error.get("code").and_then(Value::as_i64) {
        Some(code) => format!("{} (code {})", message, code),
        None => message.to_string(),
    }
}
