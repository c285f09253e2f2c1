//! Chart model and chart type registry
//!
//! A chart is a persisted SQL statement bound to a registered database plus a
//! variant ([`ChartKind`]) that fixes the output schema the SQL must project.

pub mod model;
pub mod registry;

pub use model::{CategoricalMapping, Chart, ChartColumn, ChartKind, categorical_schema};
pub use registry::ChartRegistry;
