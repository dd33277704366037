use std::collections::BTreeMap;
use std::path::Path;

use log::debug;
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, Params, ToSql};
use sea_query::{Alias, Asterisk, Query, SqliteQueryBuilder, Value};

use crate::config::TableMappingConfig;
use crate::error::StoreError;
use crate::executor::{AnnotationStore, CellValue, TabularResult};
use crate::schema::Table;
use crate::sql_compiler::CompiledQuery;

/// Annotation Store backed by a SQLite database file (EnsDb / TxDb style).
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens an annotation database read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type IN ('table', 'view') ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Columns of `table` in declaration order.
    pub fn list_columns(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Err(StoreError::UnknownTable(table.to_string()));
        }
        Ok(columns)
    }

    /// Checks that every logical table exists under its mapped name with the
    /// columns the compiler may reference.
    pub fn check_schema(&self, mapping: &TableMappingConfig) -> Result<(), StoreError> {
        for table in Table::ALL {
            let physical = mapping.table_name(table);
            let present = self.list_columns(physical)?;
            if let Some(missing) = table.columns().iter().find(|c| !present.iter().any(|p| p == *c)) {
                return Err(StoreError::MissingColumn {
                    table: physical.to_string(),
                    column: missing.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Chromosome names and lengths: the `chromosome` table of EnsDb files,
    /// or `chrominfo` in TxDb files.
    pub fn chromosomes(&self) -> Result<TabularResult, StoreError> {
        let tables = self.list_tables()?;
        let table = ["chromosome", "chrominfo"]
            .into_iter()
            .find(|name| tables.iter().any(|t| t == *name))
            .ok_or_else(|| StoreError::UnknownTable("chromosome".to_string()))?;
        self.read_table(table)
    }

    /// The `metadata` table as name -> value pairs (genome build, source
    /// database version and the like).
    pub fn metadata(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let columns = self.list_columns("metadata")?;
        for column in ["name", "value"] {
            if !columns.iter().any(|c| c == column) {
                return Err(StoreError::MissingColumn {
                    table: "metadata".to_string(),
                    column: column.to_string(),
                });
            }
        }
        let sql = Query::select()
            .columns([Alias::new("name"), Alias::new("value")])
            .from(Alias::new("metadata"))
            .to_string(SqliteQueryBuilder);
        let rows = self.query_rows(&sql, [])?;
        Ok(rows
            .records()
            .iter()
            .map(|record| (record.values()[0].to_string(), record.values()[1].to_string()))
            .collect())
    }

    /// Every row of `table`, columns in declaration order.
    pub fn read_table(&self, table: &str) -> Result<TabularResult, StoreError> {
        self.list_columns(table)?;
        let sql = Query::select()
            .column(Asterisk)
            .from(Alias::new(table))
            .to_string(SqliteQueryBuilder);
        self.query_rows(&sql, [])
    }

    fn query_rows<P: Params>(&self, sql: &str, params: P) -> Result<TabularResult, StoreError> {
        debug!("executing: {}", sql);

        let mut stmt = self.conn.prepare(sql)?;
        let mut result = TabularResult::new(stmt.column_names().into_iter().map(String::from));
        let width = result.columns().len();

        let mut rows = stmt.query(params)?;
        while let Some(row) = rows.next()? {
            let values = (0..width)
                .map(|i| row.get_ref(i).map(CellValue::from))
                .collect::<Result<Vec<_>, _>>()?;
            result.push(values)?;
        }
        Ok(result)
    }
}

impl AnnotationStore for SqliteStore {
    fn run(&self, query: &CompiledQuery) -> Result<TabularResult, StoreError> {
        let (sql, values) = query.build();
        self.query_rows(&sql, params_from_iter(values.0.iter().map(BoundValue)))
    }
}

impl From<ValueRef<'_>> for CellValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => CellValue::Null,
            ValueRef::Integer(i) => CellValue::Integer(i),
            ValueRef::Real(r) => CellValue::Real(r),
            ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => CellValue::Blob(b.to_vec()),
        }
    }
}

/// Binds a sea-query value as a SQLite parameter.
struct BoundValue<'a>(&'a Value);

impl ToSql for BoundValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match self.0 {
            Value::Bool(Some(b)) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*b))),
            Value::Int(Some(i)) => ToSqlOutput::Owned(SqlValue::Integer(i64::from(*i))),
            Value::BigInt(Some(i)) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            Value::Double(Some(d)) => ToSqlOutput::Owned(SqlValue::Real(*d)),
            Value::String(Some(s)) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(Some(b)) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            other => {
                return Err(rusqlite::Error::ToSqlConversionFailure(
                    format!("unsupported parameter {:?}", other).into(),
                ))
            }
        };
        Ok(output)
    }
}
