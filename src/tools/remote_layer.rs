//! Tools over the remote feature layers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    optional_str, optional_usize, required_str, ParamKind, ParamSpec, QueryResult, Tool,
    ToolDescriptor, ToolError, ToolId,
};
use crate::data::RemoteLayers;

fn layer_list(remote: &RemoteLayers) -> String {
    let ids = remote.layer_ids();
    if ids.is_empty() {
        "none configured".to_string()
    } else {
        ids.join(", ")
    }
}

/// Fetch the schema of a feature layer.
pub struct DescribeLayerTool {
    remote: Arc<RemoteLayers>,
}

impl DescribeLayerTool {
    pub fn new(remote: Arc<RemoteLayers>) -> Self {
        Self { remote }
    }
}

#[async_trait]
impl Tool for DescribeLayerTool {
    fn id(&self) -> ToolId {
        ToolId::DescribeLayer
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: ToolId::DescribeLayer.as_str(),
            purpose: format!(
                "Get the schema of a remote feature layer: field names, types, and geometry type. \
                 Call this before querying a layer to learn what fields are available. \
                 Available layers: {}",
                layer_list(&self.remote)
            ),
            params: vec![ParamSpec {
                name: "layer",
                kind: ParamKind::String,
                required: true,
                description: "Id of the layer to describe",
            }],
        }
    }

    async fn execute(&self, args: &Value) -> Result<QueryResult, ToolError> {
        let layer = required_str(args, "layer")?;
        let schema = self.remote.describe_layer(layer).await?;
        Ok(QueryResult::Schema { schema })
    }
}

/// Query attribute rows of a feature layer with a filter expression.
pub struct QueryLayerTool {
    remote: Arc<RemoteLayers>,
    max_rows: usize,
}

impl QueryLayerTool {
    pub fn new(remote: Arc<RemoteLayers>, max_rows: usize) -> Self {
        Self { remote, max_rows }
    }
}

#[async_trait]
impl Tool for QueryLayerTool {
    fn id(&self) -> ToolId {
        ToolId::QueryLayer
    }

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: ToolId::QueryLayer.as_str(),
            purpose: format!(
                "Query a remote feature layer with a boolean filter over its fields, \
                 e.g. \"country = 'France'\" or \"1=1\" for all rows. \
                 Available layers: {}",
                layer_list(&self.remote)
            ),
            params: vec![
                ParamSpec {
                    name: "layer",
                    kind: ParamKind::String,
                    required: true,
                    description: "Id of the layer to query",
                },
                ParamSpec {
                    name: "where",
                    kind: ParamKind::String,
                    required: false,
                    description: "Filter expression over layer fields (default: 1=1, all rows)",
                },
                ParamSpec {
                    name: "max_rows",
                    kind: ParamKind::Integer,
                    required: false,
                    description: "Maximum rows to return (capped by the server)",
                },
            ],
        }
    }

    async fn execute(&self, args: &Value) -> Result<QueryResult, ToolError> {
        let layer = required_str(args, "layer")?;
        let filter = optional_str(args, "where", "1=1");
        let max_rows = optional_usize(args, "max_rows", self.max_rows).min(self.max_rows);

        let rows = self.remote.query_layer(layer, filter, max_rows).await?;
        Ok(QueryResult::rows(rows))
    }
}
