//! Data access layer: read-only queries over two kinds of sources.
//!
//! - Remote feature layers, reached over the feature service REST API
//! - Local CSV tables, loaded once at startup and frozen for the process

pub mod filter;
pub mod remote;
pub mod tables;

pub use remote::RemoteLayers;
pub use tables::LocalTables;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single attribute row returned by any data source.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Failures the data access layer can surface. Every variant is recovered
/// at the tool boundary and turned into a structured result.
#[derive(Debug, Error)]
pub enum DataError {
    /// The remote source could not be reached, timed out, or replied with
    /// a non-success status.
    #[error("data source unavailable: {0}")]
    SourceUnavailable(String),

    /// Unknown layer id or table name.
    #[error("not found: {0}")]
    NotFound(String),

    /// A filter expression that failed validation, or was rejected by the
    /// data source.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

/// Schema description of a remote feature layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerSchema {
    /// Layer id as registered in the configuration
    pub layer: String,

    /// Layer name as reported by the service
    pub name: String,

    /// Geometry type (point, polyline, ...)
    pub geometry_type: String,

    /// Attribute fields
    pub fields: Vec<FieldDef>,
}

/// One attribute field of a feature layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}
