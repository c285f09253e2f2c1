//! Registered database record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::DatabaseKind;
use super::schema::{SchemaSnapshot, Table};

/// A database registered by connection string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseRecord {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DatabaseKind,
    pub connection_string: String,
    /// Last captured schema; replaced wholesale on every sync
    pub schema: Option<SchemaSnapshot>,
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub is_archived: bool,
    pub is_deleted: bool,
}

impl DatabaseRecord {
    pub fn new(name: impl Into<String>, kind: DatabaseKind, connection_string: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            connection_string: connection_string.into(),
            schema: None,
            last_sync: None,
            created_at: now,
            modified_at: now,
            is_archived: false,
            is_deleted: false,
        }
    }

    /// Replace the schema snapshot and stamp `last_sync` with `at`.
    pub fn replace_schema(&mut self, tables: Vec<Table>, at: DateTime<Utc>) {
        self.schema = Some(SchemaSnapshot::new(tables));
        self.last_sync = Some(at);
    }

    /// Tables of the last snapshot, empty when never synced
    pub fn tables(&self) -> &[Table] {
        self.schema.as_ref().map(|s| s.tables.as_slice()).unwrap_or(&[])
    }

    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }
}
