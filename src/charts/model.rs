//! Chart entity and its variants

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One column a chart's SQL result must provide
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub description: String,
    pub optional: bool,
}

impl ChartColumn {
    fn required(name: &str, column_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            column_type: column_type.to_string(),
            description: description.to_string(),
            optional: false,
        }
    }
}

/// Output schema shared by category/value charts
pub fn categorical_schema() -> Vec<ChartColumn> {
    vec![
        ChartColumn::required("Category", "string", "Used as the X-Basis for the chart"),
        ChartColumn::required("Value", "numerical", "Used to display the amount on the chart"),
    ]
}

/// Optional display mapping of a category/value chart
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoricalMapping {
    pub categorical_column_name: Option<String>,
    pub value_column_name: Option<String>,
}

/// Chart variant with its variant-specific fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChartKind {
    Bar(CategoricalMapping),
    Line(CategoricalMapping),
}

impl ChartKind {
    /// Canonical type name, as persisted and shown to the LLM
    pub fn type_name(&self) -> &'static str {
        match self {
            ChartKind::Bar(_) => "Bar",
            ChartKind::Line(_) => "Line",
        }
    }

    /// Columns the variant's SQL result must project
    pub fn output_schema(&self) -> Vec<ChartColumn> {
        match self {
            ChartKind::Bar(_) | ChartKind::Line(_) => categorical_schema(),
        }
    }

    pub fn mapping(&self) -> &CategoricalMapping {
        match self {
            ChartKind::Bar(m) | ChartKind::Line(m) => m,
        }
    }

    /// Same variant carrying `mapping`
    pub fn with_mapping(&self, mapping: CategoricalMapping) -> ChartKind {
        match self {
            ChartKind::Bar(_) => ChartKind::Bar(mapping),
            ChartKind::Line(_) => ChartKind::Line(mapping),
        }
    }
}

impl std::fmt::Display for ChartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A persisted chart definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub id: Uuid,
    pub title: String,
    pub database_id: Uuid,
    /// SQL executed verbatim to produce the chart data
    pub query: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub is_archived: bool,
    pub is_deleted: bool,
    #[serde(flatten)]
    pub kind: ChartKind,
}

impl Chart {
    /// Create a new live chart with a fresh id.
    pub fn new(
        kind: ChartKind,
        title: impl Into<String>,
        query: impl Into<String>,
        database_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            database_id,
            query: query.into(),
            created_at: now,
            modified_at: now,
            is_archived: false,
            is_deleted: false,
            kind,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Mark deleted and bump `modified_at`.
    pub fn soft_delete(&mut self) {
        self.is_deleted = true;
        self.modified_at = Utc::now();
    }
}
