//! Chart type registry
//!
//! Maps canonical type names to a prototype of each variant. The prototype is
//! only used to resolve a name to a variant and to read its output schema;
//! it never carries chart data.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

use super::model::{CategoricalMapping, ChartKind};
use crate::error::{ChartAiError, ChartAiResult};

static GLOBAL: Lazy<ChartRegistry> = Lazy::new(ChartRegistry::with_builtin);

/// Registry of chart variants keyed by lower-cased type name
#[derive(Debug, Clone, Default)]
pub struct ChartRegistry {
    charts: BTreeMap<String, ChartKind>,
}

impl ChartRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in variant registered
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(ChartKind::Bar(CategoricalMapping::default()));
        registry.register(ChartKind::Line(CategoricalMapping::default()));
        registry
    }

    /// Process-wide registry of built-in variants
    pub fn global() -> &'static ChartRegistry {
        &GLOBAL
    }

    /// Register a prototype under its type name, replacing any previous one.
    pub fn register(&mut self, prototype: ChartKind) {
        let key = prototype.type_name().to_lowercase();
        self.charts.insert(key, prototype.with_mapping(CategoricalMapping::default()));
    }

    /// Resolve a type name case-insensitively.
    ///
    /// Surrounding whitespace and quote characters are ignored so a raw LLM
    /// reply such as `"Bar"\n` resolves.
    pub fn lookup(&self, name: &str) -> ChartAiResult<ChartKind> {
        let cleaned = name
            .trim()
            .trim_matches(|c| c == '"' || c == '\'' || c == '`')
            .trim();

        self.charts
            .get(&cleaned.to_lowercase())
            .cloned()
            .ok_or_else(|| ChartAiError::UnsupportedChartType(cleaned.to_string()))
    }

    /// Canonical names in registry order
    pub fn names(&self) -> Vec<&'static str> {
        self.charts.values().map(ChartKind::type_name).collect()
    }

    pub fn prototypes(&self) -> impl Iterator<Item = &ChartKind> {
        self.charts.values()
    }

    pub fn len(&self) -> usize {
        self.charts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }
}
