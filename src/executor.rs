//! Query execution: the Annotation Store seam and the tabular result type.

use std::fmt;
use std::sync::Arc;

use log::debug;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::ast::Expression;
use crate::error::{FilterResult, StoreError};
use crate::schema::Table;
use crate::sql_compiler::{CompiledQuery, SqlCompiler};

/// A relational backend holding the annotation tables.
///
/// Implementations run the query as given and return every row. Failures are
/// reported, never retried.
pub trait AnnotationStore {
    fn run(&self, query: &CompiledQuery) -> Result<TabularResult, StoreError>;
}

impl<S: AnnotationStore + ?Sized> AnnotationStore for &S {
    fn run(&self, query: &CompiledQuery) -> Result<TabularResult, StoreError> {
        (**self).run(query)
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("NULL"),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Real(r) => write!(f, "{}", r),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// One result row: column name to value, in result column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<CellValue>,
}

impl Record {
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.columns.iter().map(String::as_str).zip(&self.values)
    }

    pub fn values(&self) -> &[CellValue] {
        &self.values
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Ordered rows sharing one column list.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TabularResult {
    #[serde(serialize_with = "serialize_columns")]
    columns: Arc<[String]>,
    records: Vec<Record>,
}

fn serialize_columns<S: Serializer>(columns: &Arc<[String]>, serializer: S) -> Result<S::Ok, S::Error> {
    columns.as_ref().serialize(serializer)
}

impl TabularResult {
    pub fn new(columns: impl IntoIterator<Item = String>) -> Self {
        Self {
            columns: columns.into_iter().collect(),
            records: Vec::new(),
        }
    }

    /// Appends a row; `values` must follow the column order.
    pub fn push(&mut self, values: Vec<CellValue>) -> Result<(), StoreError> {
        if values.len() != self.columns.len() {
            return Err(StoreError::RowShape {
                expected: self.columns.len(),
                found: values.len(),
            });
        }
        self.records.push(Record {
            columns: Arc::clone(&self.columns),
            values,
        });
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&CellValue>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.records.iter().map(|r| &r.values[index]).collect())
    }
}

/// Runs compiled queries against an [`AnnotationStore`].
#[derive(Debug)]
pub struct QueryExecutor<S> {
    store: S,
    compiler: SqlCompiler,
}

impl<S: AnnotationStore> QueryExecutor<S> {
    pub fn new(store: S) -> Self {
        Self::with_compiler(store, SqlCompiler::new())
    }

    pub fn with_compiler(store: S, compiler: SqlCompiler) -> Self {
        Self { store, compiler }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn compiler(&self) -> &SqlCompiler {
        &self.compiler
    }

    pub fn execute(&self, query: &CompiledQuery) -> FilterResult<TabularResult> {
        execute(query, &self.store)
    }

    /// Compiles `expression` against `anchor` and runs it, adding `columns`
    /// from other tables to the output.
    pub fn select(&self, anchor: Table, expression: &Expression, columns: &[&str]) -> FilterResult<TabularResult> {
        let query = self.compiler.compile_select(expression, anchor, columns)?;
        self.execute(&query)
    }

    pub fn genes(&self, expression: &Expression) -> FilterResult<TabularResult> {
        self.select(Table::Gene, expression, &[])
    }

    pub fn transcripts(&self, expression: &Expression) -> FilterResult<TabularResult> {
        self.select(Table::Transcript, expression, &[])
    }

    pub fn exons(&self, expression: &Expression) -> FilterResult<TabularResult> {
        self.select(Table::Exon, expression, &[])
    }

    pub fn protein_mappings(&self, expression: &Expression) -> FilterResult<TabularResult> {
        self.select(Table::ProteinMapping, expression, &[])
    }
}

/// Runs `query` on `store`. Store failures surface as [`FilterError::Store`].
///
/// [`FilterError::Store`]: crate::error::FilterError::Store
pub fn execute<S: AnnotationStore + ?Sized>(query: &CompiledQuery, store: &S) -> FilterResult<TabularResult> {
    let result = store.run(query)?;
    debug!(
        "{} rows from {} joined over {} table(s)",
        result.len(),
        query.join_plan().anchor(),
        query.join_plan().tables().len()
    );
    Ok(result)
}
