//! Tool over the local tabular datasets.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    optional_bool, optional_str, optional_usize, required_str, ParamKind, ParamSpec, QueryResult,
    Tool, ToolDescriptor, ToolError, ToolId,
};
use crate::data::LocalTables;

/// Substring search against one field of a local table.
pub struct QueryTableTool {
    tables: Arc<LocalTables>,
    max_rows: usize,
}

impl QueryTableTool {
    pub fn new(tables: Arc<LocalTables>, max_rows: usize) -> Self {
        Self { tables, max_rows }
    }
}

#[async_trait]
impl Tool for QueryTableTool {
    fn id(&self) -> ToolId {
        ToolId::QueryTable
    }

    fn descriptor(&self) -> ToolDescriptor {
        let catalog = self
            .tables
            .catalog()
            .iter()
            .map(|(name, fields)| format!("{} ({})", name, fields.join(", ")))
            .collect::<Vec<_>>()
            .join("; ");
        ToolDescriptor {
            name: ToolId::QueryTable.as_str(),
            purpose: format!(
                "Search a local table by matching a substring against one field. \
                 An empty substring returns all rows. Available tables: {}",
                if catalog.is_empty() { "none loaded".to_string() } else { catalog }
            ),
            params: vec![
                ParamSpec {
                    name: "table",
                    kind: ParamKind::String,
                    required: true,
                    description: "Name of the table to search",
                },
                ParamSpec {
                    name: "field",
                    kind: ParamKind::String,
                    required: true,
                    description: "Field to match against",
                },
                ParamSpec {
                    name: "substring",
                    kind: ParamKind::String,
                    required: false,
                    description: "Substring to look for (default: empty, matches all rows)",
                },
                ParamSpec {
                    name: "case_insensitive",
                    kind: ParamKind::Boolean,
                    required: false,
                    description: "Ignore case when matching (default: true)",
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
        let table = required_str(args, "table")?;
        let field = required_str(args, "field")?;
        let substring = optional_str(args, "substring", "");
        let case_insensitive = optional_bool(args, "case_insensitive", true);
        let max_rows = optional_usize(args, "max_rows", self.max_rows).min(self.max_rows);

        let rows = self
            .tables
            .query(table, field, substring, case_insensitive, max_rows)?;
        Ok(QueryResult::rows(rows))
    }
}
