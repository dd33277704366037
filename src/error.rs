//! Error types for building, compiling and executing annotation filters.

use thiserror::Error;

use crate::ast::{Field, Operator};
use crate::schema::Table;

/// Errors raised by the Annotation Store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error from the SQLite driver.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The store does not contain the requested table.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// The table lacks a column the schema requires.
    #[error("Table {table} has no column {column}")]
    MissingColumn { table: String, column: String },

    /// A row does not match the result's column count.
    #[error("Row has {found} values, expected {expected}")]
    RowShape { expected: usize, found: usize },
}

/// Errors that can occur while building or compiling a filter expression.
#[derive(Error, Debug)]
pub enum FilterError {
    /// Operand does not fit the field's domain or the operator's shape.
    #[error("Invalid operand for {field}: {reason}")]
    InvalidOperand {
        /// Field the leaf targets.
        field: Field,
        /// What was wrong with the operand.
        reason: String,
    },

    /// Operator is not defined for the field's domain.
    #[error("Operator {operator:?} is not supported for {field}")]
    UnsupportedOperator { field: Field, operator: Operator },

    /// Set-membership operand with no values.
    #[error("Empty operand for {field}")]
    EmptyOperand { field: Field },

    /// Expression shape that cannot be lowered to a backend predicate.
    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// No join path connects two tables of the schema.
    #[error("No join path from {from} to {to}")]
    EmptyJoinPath { from: Table, to: Table },

    /// Requested output column is not hosted by any table.
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    /// Error from the Annotation Store, surfaced verbatim.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for filter operations.
pub type FilterResult<T> = std::result::Result<T, FilterError>;
