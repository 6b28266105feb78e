//! Tool registry: the agent-facing boundary over the data access layer.
//!
//! Every data operation is exposed as a named, schema-declared tool. The
//! registry validates the tool name and arguments before anything touches
//! the data layer, and converts every data failure into a structured
//! [`QueryResult`] — a tool invocation never raises past this boundary.

pub mod local_table;
pub mod remote_layer;

pub use local_table::QueryTableTool;
pub use remote_layer::{DescribeLayerTool, QueryLayerTool};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::data::{DataError, LayerSchema, LocalTables, Record, RemoteLayers};

/// The closed set of tools the agent may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolId {
    DescribeLayer,
    QueryLayer,
    QueryTable,
}

impl ToolId {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolId::DescribeLayer => "describe_layer",
            ToolId::QueryLayer => "query_layer",
            ToolId::QueryTable => "query_table",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "describe_layer" => Some(ToolId::DescribeLayer),
            "query_layer" => Some(ToolId::QueryLayer),
            "query_table" => Some(ToolId::QueryTable),
            _ => None,
        }
    }
}

/// Primitive types a tool parameter may have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
}

impl ParamKind {
    fn json_type(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
        }
    }

    fn admits(self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => value.is_i64() || value.is_u64(),
            ParamKind::Boolean => value.is_boolean(),
        }
    }
}

/// Declaration of one tool parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

/// Declared shape of a tool: stable name, purpose for the reasoning step,
/// and the parameter schema arguments are validated against.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub purpose: String,
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    /// Render as an OpenAI-style function declaration.
    pub fn function_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            properties.insert(
                param.name.to_string(),
                json!({"type": param.kind.json_type(), "description": param.description}),
            );
            if param.required {
                required.push(Value::from(param.name));
            }
        }
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.purpose,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

/// Machine-checkable error kinds carried by error results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceUnavailable,
    NotFound,
    InvalidFilter,
    UnknownTool,
    InvalidArguments,
}

/// The structured outcome of every tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum QueryResult {
    Rows { count: usize, rows: Vec<Record> },
    Schema { schema: LayerSchema },
    Error { kind: ErrorKind, message: String },
}

impl QueryResult {
    pub fn rows(rows: Vec<Record>) -> Self {
        QueryResult::Rows {
            count: rows.len(),
            rows,
        }
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        QueryResult::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryResult::Error { .. })
    }

    /// JSON form fed back to the reasoning backend as a tool message.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"result":"error","kind":"source_unavailable","message":"result serialization failed: {}"}}"#,
                e
            )
        })
    }
}

/// Failures inside a tool body. Converted to error results by the registry.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl ToolError {
    fn kind(&self) -> ErrorKind {
        match self {
            ToolError::Data(DataError::SourceUnavailable(_)) => ErrorKind::SourceUnavailable,
            ToolError::Data(DataError::NotFound(_)) => ErrorKind::NotFound,
            ToolError::Data(DataError::InvalidFilter(_)) => ErrorKind::InvalidFilter,
            ToolError::InvalidArguments(_) => ErrorKind::InvalidArguments,
        }
    }
}

/// A named, schema-declared callable over the data access layer.
#[async_trait]
pub trait Tool: Send + Sync {
    fn id(&self) -> ToolId;

    fn descriptor(&self) -> ToolDescriptor;

    /// Run the tool with pre-validated arguments.
    async fn execute(&self, args: &Value) -> Result<QueryResult, ToolError>;
}

/// Registry mapping tool ids to validated handlers.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new(remote: Arc<RemoteLayers>, tables: Arc<LocalTables>, max_rows: usize) -> Self {
        Self {
            tools: vec![
                Box::new(DescribeLayerTool::new(Arc::clone(&remote))),
                Box::new(QueryLayerTool::new(remote, max_rows)),
                Box::new(QueryTableTool::new(tables, max_rows)),
            ],
        }
    }

    /// Function declarations for every registered tool.
    pub fn schemas(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|tool| tool.descriptor().function_schema())
            .collect()
    }

    /// Invoke a tool by wire name. Total: every failure mode comes back as
    /// an error-kind [`QueryResult`], never as an Err or a panic.
    pub async fn invoke(&self, tool_name: &str, arguments: &Value) -> QueryResult {
        let Some(id) = ToolId::parse(tool_name) else {
            return QueryResult::error(
                ErrorKind::UnknownTool,
                format!("unknown tool: {}", tool_name),
            );
        };
        let Some(tool) = self.tools.iter().find(|t| t.id() == id) else {
            return QueryResult::error(
                ErrorKind::UnknownTool,
                format!("tool not registered: {}", tool_name),
            );
        };

        if let Err(message) = validate_arguments(&tool.descriptor(), arguments) {
            return QueryResult::error(ErrorKind::InvalidArguments, message);
        }

        match tool.execute(arguments).await {
            Ok(result) => result,
            Err(e) => QueryResult::error(e.kind(), e.to_string()),
        }
    }
}

/// Check an argument object against a descriptor. Unknown names, missing
/// required parameters, and mistyped values are all rejected here, before
/// the data layer is touched.
fn validate_arguments(descriptor: &ToolDescriptor, arguments: &Value) -> Result<(), String> {
    let object = match arguments {
        Value::Object(map) => map,
        Value::Null => {
            if let Some(param) = descriptor.params.iter().find(|p| p.required) {
                return Err(format!("missing required argument: {}", param.name));
            }
            return Ok(());
        }
        other => {
            return Err(format!(
                "arguments must be a JSON object, got {}",
                json_type_name(other)
            ))
        }
    };

    for param in descriptor.params.iter().filter(|p| p.required) {
        match object.get(param.name) {
            None | Some(Value::Null) => {
                return Err(format!("missing required argument: {}", param.name))
            }
            Some(_) => {}
        }
    }

    for (name, value) in object {
        let Some(param) = descriptor.params.iter().find(|p| p.name == name.as_str()) else {
            return Err(format!("unknown argument: {}", name));
        };
        if value.is_null() {
            continue;
        }
        if !param.kind.admits(value) {
            return Err(format!(
                "argument '{}' must be a {}",
                name,
                param.kind.json_type()
            ));
        }
    }

    Ok(())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── typed accessors used by tool bodies after validation ──────────────────

pub(crate) fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing required argument: {}", key)))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str, default: &'a str) -> &'a str {
    args.get(key).and_then(Value::as_str).unwrap_or(default)
}

pub(crate) fn optional_usize(args: &Value, key: &str, default: usize) -> usize {
    args.get(key)
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(default)
}

pub(crate) fn optional_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}
