//! Prompt construction and reply clean-up
//!
//! Every prompt asks for a bare, single-value reply so the answer can be
//! handled with plain string operations.

use std::fmt::Write;

use crate::charts::ChartColumn;
use crate::database::Table;

/// Prompt asking for a short chart title.
pub fn title_prompt(request: &str) -> String {
    format!(
        "Given the following user request: '{}', suggest a title for this chart concise into a single short phrase. \
         The output must be just the chart title, no markdown, no code, just text",
        request
    )
}

/// Prompt asking to pick one of `type_names`.
pub fn classification_prompt(request: &str, type_names: &[&str]) -> String {
    let options = type_names
        .iter()
        .map(|name| format!("\"{}\"", name))
        .collect::<Vec<_>>()
        .join(" or ");

    format!(
        "Given the following user request: '{}', suggest the most appropriate chart type from the following options: {}. \
         Only reply with the chart type name and nothing else with no markdown formatting or characters.",
        request, options
    )
}

/// Render the introspected schema, one line per column.
pub fn render_schema(tables: &[Table]) -> String {
    let mut out = String::from("Database Schema:\n");
    for table in tables {
        let _ = writeln!(out, "Table '{}':", table.name);
        for column in &table.columns {
            let _ = write!(out, "  - {} ({})", column.name, column.data_type);
            if column.is_primary_key {
                out.push_str(" (Primary Key)");
            }
            if let Some(fk) = &column.foreign_key {
                let _ = write!(
                    out,
                    " (Foreign Key to {}.{})",
                    fk.target_table, fk.target_column
                );
            }
            out.push('\n');
        }
    }
    out
}

/// Render a chart output schema, one expected column per line.
pub fn render_output_schema(columns: &[ChartColumn]) -> String {
    columns
        .iter()
        .map(|column| {
            let required = if column.optional { "" } else { " NOT NULL" };
            format!(
                "- \"{}\" {}{} '{}'",
                column.name, column.column_type, required, column.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt asking for a single SQL statement in `dialect`.
pub fn sql_prompt(
    request: &str,
    output_schema: &[ChartColumn],
    tables: &[Table],
    dialect: &str,
) -> String {
    format!(
        r#"Given the following database schema and chart requirements, generate a {dialect} query for this request: "{request}"

Expected Columns of the Query are:
{expected}

Current Database modeling:
{schema}
Rules:
1. The output must follow the expected struct format
2. The query must return exactly the columns needed for the chart type
3. Use appropriate joins if needed
4. Only return the SQL query, no explanations and no markdown formatting or comments
5. Respect the words of the tables and columns names are case sensitive and all the tables and columns names should be in double quotes
6. Generate a query compatible with the {dialect} database"#,
        dialect = dialect,
        request = request,
        expected = render_output_schema(output_schema),
        schema = render_schema(tables),
    )
}

/// Strip the wrappers LLMs commonly put around a SQL reply.
pub fn sanitize_sql(answer: &str) -> String {
    let mut sql = answer.trim();
    sql = sql.strip_prefix("SQL Query: ").unwrap_or(sql);
    sql = sql.strip_prefix("```sql").unwrap_or(sql);
    sql = sql.strip_prefix("```").unwrap_or(sql);
    sql = sql.strip_suffix("```").unwrap_or(sql);
    sql.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::charts::categorical_schema;
    use crate::database::Column;

    #[test]
    fn test_sanitize_sql() {
        assert_eq!(
            sanitize_sql("```sql\nSELECT \"Category\", \"Value\" FROM \"sales\"\n```"),
            "SELECT \"Category\", \"Value\" FROM \"sales\""
        );
        assert_eq!(sanitize_sql("SQL Query: SELECT 1"), "SELECT 1");
        assert_eq!(sanitize_sql("```\nSELECT 1\n```\n"), "SELECT 1");
        assert_eq!(sanitize_sql("  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn test_classification_prompt_lists_options() {
        let prompt = classification_prompt("sales by month", &["Bar", "Line"]);
        assert!(prompt.contains("'sales by month'"));
        assert!(prompt.contains("\"Bar\" or \"Line\""));
    }

    #[test]
    fn test_render_schema_annotations() {
        let tables = vec![
            Table::new("customers", vec![Column::new("id", "integer").primary_key()]),
            Table::new(
                "orders",
                vec![Column::new("customer_id", "integer").references("customers", "id")],
            ),
        ];
        let text = render_schema(&tables);
        assert!(text.starts_with("Database Schema:\n"));
        assert!(text.contains("Table 'customers':\n  - id (integer) (Primary Key)\n"));
        assert!(text.contains("  - customer_id (integer) (Foreign Key to customers.id)\n"));
    }

    #[test]
    fn test_sql_prompt_embeds_everything() {
        let tables = vec![Table::new("sales", vec![Column::new("amount", "numeric")])];
        let prompt = sql_prompt("sales by month", &categorical_schema(), &tables, "PostgreSQL");

        assert!(prompt.contains("generate a PostgreSQL query for this request: \"sales by month\""));
        assert!(prompt.contains("- \"Category\" string NOT NULL 'Used as the X-Basis for the chart'\n"));
        assert!(prompt.contains("- \"Value\" numerical NOT NULL"));
        assert!(prompt.contains("  - amount (numeric)"));
        assert!(prompt.contains("double quotes"));
    }
}
