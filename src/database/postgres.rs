//! PostgreSQL adapter
//!
//! Opens a single dedicated connection per adapter. Introspection reads the
//! `information_schema` and `pg_catalog` for the `public` schema. Queries are
//! executed verbatim. Cells are scanned raw in binary format and coerced by
//! declared type; statements returning a type without a binary decoder run
//! over the simple query protocol and are read in text form instead.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use std::fmt::Write;
use std::net::IpAddr;
use tokio::task::JoinHandle;
use tokio_postgres::types::{FromSql, Kind, Type};
use tokio_postgres::{Client, SimpleQueryMessage, Statement};

use super::coerce::{RawValue, coerce_value};
use super::schema::{Column, ForeignKey, Table};
use super::{DatabaseAdapter, DatabaseError, DatabaseResult, QueryResult, QueryRow};

/// Schema the adapter introspects
pub const INTROSPECTED_SCHEMA: &str = "public";

// Keys are resolved through `pg_constraint` by relation oid; constraint
// names are only unique per table.
const INTROSPECTION_SQL: &str = r#"
SELECT c.table_name::text AS table_name,
       c.column_name::text AS column_name,
       c.data_type::text AS data_type,
       EXISTS (
           SELECT 1
           FROM pg_catalog.pg_constraint pk
           WHERE pk.contype = 'p'
             AND pk.conrelid = cls.oid
             AND att.attnum = ANY (pk.conkey)
       ) AS is_primary_key,
       fk.target_table AS fk_table,
       fk.target_column AS fk_column
FROM information_schema.columns c
JOIN information_schema.tables t
  ON t.table_schema = c.table_schema
 AND t.table_name = c.table_name
 AND t.table_type = 'BASE TABLE'
JOIN pg_catalog.pg_namespace ns
  ON ns.nspname = c.table_schema::name
JOIN pg_catalog.pg_class cls
  ON cls.relnamespace = ns.oid
 AND cls.relname = c.table_name::name
JOIN pg_catalog.pg_attribute att
  ON att.attrelid = cls.oid
 AND att.attname = c.column_name::name
LEFT JOIN LATERAL (
    SELECT ref.relname::text AS target_table,
           ref_att.attname::text AS target_column
    FROM pg_catalog.pg_constraint con
    CROSS JOIN LATERAL unnest(con.conkey, con.confkey) AS k(attnum, ref_attnum)
    JOIN pg_catalog.pg_class ref
      ON ref.oid = con.confrelid
    JOIN pg_catalog.pg_attribute ref_att
      ON ref_att.attrelid = con.confrelid
     AND ref_att.attnum = k.ref_attnum
    WHERE con.contype = 'f'
      AND con.conrelid = cls.oid
      AND k.attnum = att.attnum
    ORDER BY con.conname
    LIMIT 1
) fk ON true
WHERE c.table_schema = $1::text
ORDER BY c.table_name, c.ordinal_position
"#;

/// PostgreSQL adapter over one `tokio_postgres` connection
pub struct PostgresAdapter {
    connection_string: String,
    client: Option<Client>,
    connection_task: Option<JoinHandle<()>>,
}

impl PostgresAdapter {
    /// Connect using a libpq-style or URL connection string.
    pub async fn connect(connection_string: &str) -> DatabaseResult<Self> {
        let (client, connection) =
            tokio_postgres::connect(connection_string, tokio_postgres::NoTls)
                .await
                .map_err(|e| {
                    DatabaseError::ConnectionFailed(format!(
                        "Failed to connect to PostgreSQL: {}",
                        e
                    ))
                })?;

        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self {
            connection_string: connection_string.to_string(),
            client: Some(client),
            connection_task: Some(connection_task),
        })
    }

    /// Get the connection string (masked for security)
    pub fn connection_string_masked(&self) -> String {
        super::mask_connection_string(&self.connection_string)
    }

    fn client(&self) -> DatabaseResult<&Client> {
        self.client.as_ref().ok_or(DatabaseError::Closed)
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    async fn get_schema(&self) -> DatabaseResult<Vec<Table>> {
        let client = self.client()?;
        let rows = client
            .query(INTROSPECTION_SQL, &[&INTROSPECTED_SCHEMA])
            .await
            .map_err(|e| DatabaseError::IntrospectionFailed(e.to_string()))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let read = |e: tokio_postgres::Error| DatabaseError::IntrospectionFailed(e.to_string());
            let table: String = row.try_get("table_name").map_err(read)?;
            let name: String = row.try_get("column_name").map_err(read)?;
            let data_type: String = row.try_get("data_type").map_err(read)?;
            let is_primary_key: bool = row.try_get("is_primary_key").map_err(read)?;
            let fk_table: Option<String> = row.try_get("fk_table").map_err(read)?;
            let fk_column: Option<String> = row.try_get("fk_column").map_err(read)?;

            let foreign_key = match (fk_table, fk_column) {
                (Some(target_table), Some(target_column)) => Some(ForeignKey {
                    target_table,
                    target_column,
                }),
                _ => None,
            };

            entries.push((
                table,
                Column {
                    name,
                    data_type,
                    is_primary_key,
                    foreign_key,
                },
            ));
        }

        let tables = group_columns(entries);
        tracing::debug!(
            "Introspected {} tables from {}",
            tables.len(),
            self.connection_string_masked()
        );
        Ok(tables)
    }

    async fn run_query(&self, sql: &str) -> DatabaseResult<QueryResult> {
        let start = std::time::Instant::now();
        let client = self.client()?;

        let statement = client.prepare(sql).await.map_err(query_failed)?;

        let columns: Vec<(String, Type)> = statement
            .columns()
            .iter()
            .map(|c| (c.name().to_string(), c.type_().clone()))
            .collect();

        let rows = if columns.iter().all(|(_, ty)| has_binary_decoder(ty)) {
            query_binary(client, &statement, &columns).await?
        } else {
            tracing::debug!("Falling back to text result format for {}", sql);
            query_text(client, sql, &columns).await?
        };

        Ok(QueryResult {
            columns: columns.into_iter().map(|(name, _)| name).collect(),
            rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn close(&mut self) {
        self.client.take();
        if let Some(task) = self.connection_task.take() {
            task.abort();
        }
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }
}

/// Fold `(table, column)` pairs, already ordered by table, into tables.
fn group_columns(entries: Vec<(String, Column)>) -> Vec<Table> {
    let mut tables: Vec<Table> = Vec::new();
    for (table, column) in entries {
        match tables.last_mut() {
            Some(last) if last.name == table => last.columns.push(column),
            _ => tables.push(Table::new(table, vec![column])),
        }
    }
    tables
}

/// Undecoded binary cell; accepts every column type including NULL
struct RawCell<'a>(Option<&'a [u8]>);

impl<'a> FromSql<'a> for RawCell<'a> {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(RawCell(Some(raw)))
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(RawCell(None))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

impl RawCell<'_> {
    /// Decode the wire representation into a [`RawValue`].
    ///
    /// Malformed values degrade to their hex dump rather than failing the row.
    fn into_raw(self, ty: &Type) -> RawValue {
        let Some(raw) = self.0 else {
            return RawValue::Null;
        };
        decode_binary(ty, raw).unwrap_or_else(|| text(format_bytea(raw)))
    }
}

fn query_failed(e: tokio_postgres::Error) -> DatabaseError {
    DatabaseError::QueryFailed(format!("Query failed: {}", e))
}

fn scan_failed(name: &str, e: tokio_postgres::Error) -> DatabaseError {
    DatabaseError::QueryFailed(format!("Failed to scan column {}: {}", name, e))
}

fn declared_name(ty: &Type) -> String {
    ty.name().to_uppercase()
}

async fn query_binary(
    client: &Client,
    statement: &Statement,
    columns: &[(String, Type)],
) -> DatabaseResult<Vec<QueryRow>> {
    let rows = client.query(statement, &[]).await.map_err(query_failed)?;

    let mut json_rows = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut map = QueryRow::new();
        for (idx, (name, ty)) in columns.iter().enumerate() {
            let cell: RawCell<'_> = row.try_get(idx).map_err(|e| scan_failed(name, e))?;
            map.insert(name.clone(), coerce_value(&declared_name(ty), cell.into_raw(ty)));
        }
        json_rows.push(map);
    }
    Ok(json_rows)
}

/// Run `sql` over the simple query protocol, which returns every cell in
/// the server's text form.
async fn query_text(
    client: &Client,
    sql: &str,
    columns: &[(String, Type)],
) -> DatabaseResult<Vec<QueryRow>> {
    let messages = client.simple_query(sql).await.map_err(query_failed)?;

    let mut json_rows = Vec::new();
    for message in messages {
        if let SimpleQueryMessage::Row(row) = message {
            let mut map = QueryRow::new();
            for (idx, (name, ty)) in columns.iter().enumerate() {
                let cell = row.try_get(idx).map_err(|e| scan_failed(name, e))?;
                let raw = cell.map_or(RawValue::Null, |t| decode_text(ty, t));
                map.insert(name.clone(), coerce_value(&declared_name(ty), raw));
            }
            json_rows.push(map);
        }
    }
    Ok(json_rows)
}

/// Whether cells of `ty` can be decoded from the binary wire format.
fn has_binary_decoder(ty: &Type) -> bool {
    match ty.kind() {
        Kind::Array(element) => has_binary_decoder(element),
        Kind::Domain(inner) => has_binary_decoder(inner),
        Kind::Enum(_) => true,
        _ => matches!(
            *ty,
            Type::BOOL
                | Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::OID
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::NUMERIC
                | Type::MONEY
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
                | Type::TIME
                | Type::TIMETZ
                | Type::INTERVAL
                | Type::JSON
                | Type::JSONB
                | Type::UUID
                | Type::BYTEA
                | Type::INET
                | Type::CIDR
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::CHAR
                | Type::UNKNOWN
        ),
    }
}

fn text(value: String) -> RawValue {
    RawValue::Native(Value::String(value))
}

fn utc(ts: NaiveDateTime) -> RawValue {
    RawValue::Timestamp(ts.and_utc().fixed_offset())
}

fn decode_binary(ty: &Type, raw: &[u8]) -> Option<RawValue> {
    match ty.kind() {
        Kind::Array(element) => return decode_array(element, raw).map(RawValue::Native),
        Kind::Domain(inner) => return decode_binary(inner, raw),
        Kind::Enum(_) => return Some(RawValue::Bytes(raw.to_vec())),
        _ => {}
    }

    let value = match *ty {
        Type::BOOL => RawValue::Native(Value::Bool(bool::from_sql(ty, raw).ok()?)),
        Type::INT2 => RawValue::Native(i16::from_sql(ty, raw).ok()?.into()),
        Type::INT4 => RawValue::Native(i32::from_sql(ty, raw).ok()?.into()),
        Type::INT8 => RawValue::Native(i64::from_sql(ty, raw).ok()?.into()),
        Type::OID => RawValue::Native(u32::from_sql(ty, raw).ok()?.into()),
        Type::FLOAT4 => RawValue::Bytes(f32::from_sql(ty, raw).ok()?.to_string().into_bytes()),
        Type::FLOAT8 => RawValue::Bytes(f64::from_sql(ty, raw).ok()?.to_string().into_bytes()),
        Type::NUMERIC => RawValue::Bytes(decode_numeric(raw)?.into_bytes()),
        Type::MONEY => text(format_money(WireReader(raw).i64()?)),
        // Naive timestamps and dates are read as UTC
        Type::TIMESTAMP => utc(NaiveDateTime::from_sql(ty, raw).ok()?),
        Type::TIMESTAMPTZ => {
            let ts = DateTime::<Utc>::from_sql(ty, raw).ok()?;
            RawValue::Timestamp(ts.fixed_offset())
        }
        Type::DATE => utc(NaiveDate::from_sql(ty, raw).ok()?.and_hms_opt(0, 0, 0)?),
        Type::TIME => text(NaiveTime::from_sql(ty, raw).ok()?.to_string()),
        Type::TIMETZ => text(decode_timetz(raw)?),
        Type::INTERVAL => text(decode_interval(raw)?),
        Type::JSON | Type::JSONB => RawValue::Native(Value::from_sql(ty, raw).ok()?),
        Type::UUID => text(uuid::Uuid::from_sql(ty, raw).ok()?.to_string()),
        Type::BYTEA => text(format_bytea(raw)),
        Type::INET | Type::CIDR => text(decode_inet(raw, *ty == Type::CIDR)?),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::CHAR | Type::UNKNOWN => {
            RawValue::Bytes(raw.to_vec())
        }
        _ => return None,
    };
    Some(value)
}

/// Interpret a cell in the server's text output format.
fn decode_text(ty: &Type, value: &str) -> RawValue {
    if let Kind::Domain(inner) = ty.kind() {
        return decode_text(inner, value);
    }

    let parsed = match *ty {
        Type::BOOL => Some(RawValue::Native(Value::Bool(value == "t"))),
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => {
            value.parse::<i64>().ok().map(|n| RawValue::Native(n.into()))
        }
        Type::TIMESTAMPTZ => DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z")
            .ok()
            .map(RawValue::Timestamp),
        Type::TIMESTAMP => NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(utc),
        Type::DATE => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(utc),
        Type::JSON | Type::JSONB => serde_json::from_str(value).ok().map(RawValue::Native),
        _ => None,
    };
    parsed.unwrap_or_else(|| RawValue::Bytes(value.as_bytes().to_vec()))
}

/// Big-endian cursor over a binary cell
struct WireReader<'a>(&'a [u8]);

impl<'a> WireReader<'a> {
    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.0.len() < n {
            return None;
        }
        let (head, tail) = self.0.split_at(n);
        self.0 = tail;
        Some(head)
    }

    fn i32(&mut self) -> Option<i32> {
        Some(i32::from_be_bytes(self.take(4)?.try_into().ok()?))
    }

    fn i64(&mut self) -> Option<i64> {
        Some(i64::from_be_bytes(self.take(8)?.try_into().ok()?))
    }
}

/// Decode a binary array into nested JSON arrays, one level per dimension.
///
/// Layout: ndim, has-null flag, element oid, then `(length, lower bound)` per
/// dimension, then length-prefixed elements (`-1` for NULL) in row-major order.
fn decode_array(element: &Type, raw: &[u8]) -> Option<Value> {
    let mut reader = WireReader(raw);
    let ndim = usize::try_from(reader.i32()?).ok()?;
    reader.i32()?;
    reader.i32()?;

    let mut dims = Vec::with_capacity(ndim.min(6));
    for _ in 0..ndim {
        dims.push(usize::try_from(reader.i32()?).ok()?);
        reader.i32()?;
    }
    if dims.is_empty() {
        return Some(Value::Array(Vec::new()));
    }

    let count = dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))?;
    let declared = declared_name(element);
    let mut values = Vec::with_capacity(count.min(raw.len()));
    for _ in 0..count {
        let len = reader.i32()?;
        let cell = match usize::try_from(len) {
            Ok(len) => Some(reader.take(len)?),
            Err(_) => None,
        };
        values.push(coerce_value(&declared, RawCell(cell).into_raw(element)));
    }

    for &len in dims[1..].iter().rev() {
        values = values
            .chunks(len.max(1))
            .map(|chunk| Value::Array(chunk.to_vec()))
            .collect();
    }
    Some(Value::Array(values))
}

/// `HH:MM:SS[.ffffff]` for a signed microsecond count
fn format_clock(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let total = micros.unsigned_abs();
    let secs = total / 1_000_000;
    let fraction = total % 1_000_000;

    let mut out = format!(
        "{}{:02}:{:02}:{:02}",
        sign,
        secs / 3600,
        secs % 3600 / 60,
        secs % 60
    );
    if fraction != 0 {
        let digits = format!("{:06}", fraction);
        out.push('.');
        out.push_str(digits.trim_end_matches('0'));
    }
    out
}

/// Time of day followed by the zone offset; the wire stores seconds west of UTC.
fn decode_timetz(raw: &[u8]) -> Option<String> {
    let mut reader = WireReader(raw);
    let micros = reader.i64()?;
    let east = -reader.i32()?;

    let sign = if east < 0 { '-' } else { '+' };
    let offset = east.unsigned_abs();
    let mut out = format_clock(micros);
    let _ = write!(out, "{}{:02}", sign, offset / 3600);
    if offset % 3600 != 0 {
        let _ = write!(out, ":{:02}", offset % 3600 / 60);
    }
    Some(out)
}

fn interval_unit(count: i32, unit: &str) -> String {
    if count == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

/// Render an interval the way the server's `postgres` style does.
fn decode_interval(raw: &[u8]) -> Option<String> {
    let mut reader = WireReader(raw);
    let micros = reader.i64()?;
    let days = reader.i32()?;
    let months = reader.i32()?;

    let mut parts = Vec::new();
    if months / 12 != 0 {
        parts.push(interval_unit(months / 12, "year"));
    }
    if months % 12 != 0 {
        parts.push(interval_unit(months % 12, "mon"));
    }
    if days != 0 {
        parts.push(interval_unit(days, "day"));
    }
    if micros != 0 || parts.is_empty() {
        parts.push(format_clock(micros));
    }
    Some(parts.join(" "))
}

fn format_bytea(raw: &[u8]) -> String {
    let mut out = String::with_capacity(2 + raw.len() * 2);
    out.push_str("\\x");
    for byte in raw {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

/// Layout: family, netmask bits, cidr flag, address length, address bytes.
fn decode_inet(raw: &[u8], is_cidr: bool) -> Option<String> {
    let mut reader = WireReader(raw);
    let header = reader.take(4)?;
    let (family, bits) = (header[0], header[1]);
    let address = reader.take(usize::from(header[3]))?;

    let (ip, max_bits) = match family {
        PGSQL_AF_INET => (IpAddr::from(<[u8; 4]>::try_from(address).ok()?), 32),
        PGSQL_AF_INET6 => (IpAddr::from(<[u8; 16]>::try_from(address).ok()?), 128),
        _ => return None,
    };

    if is_cidr || bits != max_bits {
        Some(format!("{}/{}", ip, bits))
    } else {
        Some(ip.to_string())
    }
}

/// Money is stored as an integer count of cents.
fn format_money(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let amount = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, amount / 100, amount % 100)
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Render the binary `numeric` wire format as decimal text.
///
/// Layout: ndigits, weight, sign, dscale (all 16-bit big-endian) followed by
/// `ndigits` base-10000 digit groups.
fn decode_numeric(raw: &[u8]) -> Option<String> {
    let word = |i: usize| -> Option<u16> {
        let bytes = raw.get(i * 2..i * 2 + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    };

    let ndigits = word(0)? as usize;
    let weight = word(1)? as i16 as i32;
    let sign = word(2)?;
    let dscale = word(3)? as usize;

    match sign {
        NUMERIC_NAN => return Some("NaN".to_string()),
        NUMERIC_PINF => return Some("Infinity".to_string()),
        NUMERIC_NINF => return Some("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(4 + i))
        .collect::<Option<Vec<u16>>>()?;
    let group = |i: i32| -> u16 {
        if i >= 0 {
            digits.get(i as usize).copied().unwrap_or(0)
        } else {
            0
        }
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&group(0).to_string());
        for i in 1..=weight {
            out.push_str(&format!("{:04}", group(i)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::new();
        let mut i = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", group(i)));
            i += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn numeric(weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(digits.len() as u16).to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    #[test]
    fn test_decode_numeric() {
        assert_eq!(decode_numeric(&numeric(0, 0, 1, &[12, 5000])).unwrap(), "12.5");
        assert_eq!(decode_numeric(&numeric(-1, 0, 2, &[500])).unwrap(), "0.05");
        assert_eq!(decode_numeric(&numeric(-2, 0, 5, &[5000])).unwrap(), "0.00005");
        assert_eq!(decode_numeric(&numeric(1, 0, 1, &[1, 0, 5000])).unwrap(), "10000.5");
        assert_eq!(decode_numeric(&numeric(1, 0, 0, &[1])).unwrap(), "10000");
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_NEG, 2, &[3, 1400])).unwrap(), "-3.14");
        assert_eq!(decode_numeric(&numeric(0, 0, 2, &[])).unwrap(), "0.00");
    }

    #[test]
    fn test_decode_numeric_special_values() {
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_NAN, 0, &[])).unwrap(), "NaN");
        assert_eq!(decode_numeric(&numeric(0, NUMERIC_PINF, 0, &[])).unwrap(), "Infinity");
        assert!(decode_numeric(&[0, 1]).is_none());
    }

    #[test]
    fn test_numeric_cell_coerces_to_number() {
        let raw = numeric(0, 0, 1, &[12, 5000]);
        let value = coerce_value("NUMERIC", RawCell(Some(&raw)).into_raw(&Type::NUMERIC));
        assert_eq!(value, json!(12.5));
    }

    #[test]
    fn test_text_and_null_cells() {
        let value = coerce_value("TEXT", RawCell(Some(b"Jan")).into_raw(&Type::TEXT));
        assert_eq!(value, json!("Jan"));
        assert_eq!(RawCell(None).into_raw(&Type::INT4), RawValue::Null);
    }

    #[test]
    fn test_int_cell_is_native() {
        let raw = 42i32.to_be_bytes();
        assert_eq!(
            RawCell(Some(&raw)).into_raw(&Type::INT4),
            RawValue::Native(json!(42))
        );
    }

    fn cell(ty: &Type, raw: &[u8]) -> serde_json::Value {
        coerce_value(&declared_name(ty), RawCell(Some(raw)).into_raw(ty))
    }

    fn micros_since_2000(ts: NaiveDateTime) -> i64 {
        let epoch = NaiveDate::from_ymd_opt(2000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (ts - epoch).num_microseconds().unwrap()
    }

    #[test]
    fn test_timestamp_cell_is_read_as_utc() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let raw = micros_since_2000(ts).to_be_bytes();

        assert_eq!(cell(&Type::TIMESTAMP, &raw), json!("2024-03-01T09:30:00Z"));
        assert_eq!(cell(&Type::TIMESTAMPTZ, &raw), json!("2024-03-01T09:30:00Z"));
    }

    #[test]
    fn test_date_cell_renders_midnight_utc() {
        let days = (NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
            - NaiveDate::from_ymd_opt(2000, 1, 1).unwrap())
        .num_days() as i32;

        assert_eq!(
            cell(&Type::DATE, &days.to_be_bytes()),
            json!("2024-03-01T00:00:00Z")
        );
    }

    #[test]
    fn test_time_cells() {
        let noon_thirty = 45_000_000_000i64;
        assert_eq!(cell(&Type::TIME, &noon_thirty.to_be_bytes()), json!("12:30:00"));

        // 12:30:00 at UTC+2, stored as seconds west
        let mut raw = noon_thirty.to_be_bytes().to_vec();
        raw.extend_from_slice(&(-7200i32).to_be_bytes());
        assert_eq!(cell(&Type::TIMETZ, &raw), json!("12:30:00+02"));

        let mut raw = noon_thirty.to_be_bytes().to_vec();
        raw.extend_from_slice(&19800i32.to_be_bytes());
        assert_eq!(cell(&Type::TIMETZ, &raw), json!("12:30:00-05:30"));
    }

    #[test]
    fn test_interval_cell() {
        let interval = |micros: i64, days: i32, months: i32| {
            let mut raw = micros.to_be_bytes().to_vec();
            raw.extend_from_slice(&days.to_be_bytes());
            raw.extend_from_slice(&months.to_be_bytes());
            cell(&Type::INTERVAL, &raw)
        };

        assert_eq!(interval(0, 3, 0), json!("3 days"));
        assert_eq!(
            interval(14_706_000_000, 1, 14),
            json!("1 year 2 mons 1 day 04:05:06")
        );
        assert_eq!(interval(-1_500_000, 0, 0), json!("-00:00:01.5"));
        assert_eq!(interval(0, 0, 0), json!("00:00:00"));
    }

    #[test]
    fn test_bytea_cell_renders_hex() {
        assert_eq!(cell(&Type::BYTEA, &[0x00, 0x1f, 0xab]), json!("\\x001fab"));
    }

    #[test]
    fn test_inet_cells() {
        assert_eq!(
            cell(&Type::INET, &[PGSQL_AF_INET, 32, 0, 4, 192, 168, 0, 1]),
            json!("192.168.0.1")
        );
        assert_eq!(
            cell(&Type::CIDR, &[PGSQL_AF_INET, 24, 1, 4, 10, 0, 0, 0]),
            json!("10.0.0.0/24")
        );

        let mut v6 = vec![PGSQL_AF_INET6, 64, 0, 16];
        v6.extend_from_slice(&[0x20, 0x01, 0x0d, 0xb8]);
        v6.extend_from_slice(&[0; 12]);
        assert_eq!(cell(&Type::INET, &v6), json!("2001:db8::/64"));
    }

    #[test]
    fn test_money_cell() {
        assert_eq!(cell(&Type::MONEY, &1234i64.to_be_bytes()), json!("12.34"));
        assert_eq!(cell(&Type::MONEY, &(-5i64).to_be_bytes()), json!("-0.05"));
    }

    fn int4_array(dims: &[i32], elements: &[Option<i32>]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(dims.len() as i32).to_be_bytes());
        raw.extend_from_slice(&(elements.iter().any(Option::is_none) as i32).to_be_bytes());
        raw.extend_from_slice(&23i32.to_be_bytes());
        for d in dims {
            raw.extend_from_slice(&d.to_be_bytes());
            raw.extend_from_slice(&1i32.to_be_bytes());
        }
        for e in elements {
            match e {
                Some(v) => {
                    raw.extend_from_slice(&4i32.to_be_bytes());
                    raw.extend_from_slice(&v.to_be_bytes());
                }
                None => raw.extend_from_slice(&(-1i32).to_be_bytes()),
            }
        }
        raw
    }

    #[test]
    fn test_array_cells() {
        let raw = int4_array(&[2], &[Some(1), Some(2)]);
        assert_eq!(cell(&Type::INT4_ARRAY, &raw), json!([1, 2]));

        let raw = int4_array(&[3], &[Some(7), None, Some(9)]);
        assert_eq!(cell(&Type::INT4_ARRAY, &raw), json!([7, null, 9]));

        let raw = int4_array(&[2, 2], &[Some(1), Some(2), Some(3), Some(4)]);
        assert_eq!(cell(&Type::INT4_ARRAY, &raw), json!([[1, 2], [3, 4]]));

        assert_eq!(cell(&Type::INT4_ARRAY, &int4_array(&[], &[])), json!([]));
    }

    #[test]
    fn test_text_array_cell() {
        let mut raw = Vec::new();
        for word in [1i32, 0, 25, 1, 1] {
            raw.extend_from_slice(&word.to_be_bytes());
        }
        raw.extend_from_slice(&3i32.to_be_bytes());
        raw.extend_from_slice(b"Jan");
        assert_eq!(cell(&Type::TEXT_ARRAY, &raw), json!(["Jan"]));
    }

    #[test]
    fn test_truncated_cell_degrades_to_hex() {
        assert_eq!(cell(&Type::INT8, &[0x01, 0x02]), json!("\\x0102"));
        assert_eq!(cell(&Type::INT4_ARRAY, &[0, 0, 0, 1]), json!("\\x00000001"));
    }

    #[test]
    fn test_binary_decoder_coverage() {
        assert!(has_binary_decoder(&Type::INT4));
        assert!(has_binary_decoder(&Type::INTERVAL));
        assert!(has_binary_decoder(&Type::INT4_ARRAY));
        assert!(has_binary_decoder(&Type::TEXT_ARRAY));
        assert!(!has_binary_decoder(&Type::POINT));
        assert!(!has_binary_decoder(&Type::POINT_ARRAY));
        assert!(!has_binary_decoder(&Type::TS_VECTOR));
    }

    #[test]
    fn test_text_format_cells() {
        let text = |ty: &Type, value: &str| coerce_value(&declared_name(ty), decode_text(ty, value));

        assert_eq!(text(&Type::POINT, "(1,2)"), json!("(1,2)"));
        assert_eq!(text(&Type::INT4, "42"), json!(42));
        assert_eq!(text(&Type::BOOL, "t"), json!(true));
        assert_eq!(text(&Type::NUMERIC, "12.50"), json!(12.5));
        assert_eq!(
            text(&Type::TIMESTAMPTZ, "2024-03-01 09:30:00+00"),
            json!("2024-03-01T09:30:00Z")
        );
        assert_eq!(
            text(&Type::TIMESTAMPTZ, "2024-03-01 11:30:00.25+02"),
            json!("2024-03-01T11:30:00+02:00")
        );
        assert_eq!(
            text(&Type::TIMESTAMP, "2024-03-01 09:30:00"),
            json!("2024-03-01T09:30:00Z")
        );
        assert_eq!(text(&Type::DATE, "2024-03-01"), json!("2024-03-01T00:00:00Z"));
        assert_eq!(text(&Type::JSONB, r#"{"a":1}"#), json!({"a": 1}));
    }

    #[test]
    fn test_foreign_keys_resolve_by_owning_relation() {
        assert!(INTROSPECTION_SQL.contains("con.conrelid = cls.oid"));
        assert!(INTROSPECTION_SQL.contains("unnest(con.conkey, con.confkey)"));
        assert!(INTROSPECTION_SQL.contains("pk.conrelid = cls.oid"));
        assert!(!INTROSPECTION_SQL.contains("constraint_column_usage"));
    }

    #[test]
    fn test_group_columns_preserves_order() {
        let tables = group_columns(vec![
            ("customers".to_string(), Column::new("id", "integer").primary_key()),
            ("customers".to_string(), Column::new("name", "text")),
            (
                "orders".to_string(),
                Column::new("customer_id", "integer").references("customers", "id"),
            ),
        ]);

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "customers");
        assert_eq!(tables[0].columns[1].name, "name");
        assert!(tables[1].columns[0].foreign_key.is_some());
    }
}
