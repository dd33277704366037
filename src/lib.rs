//! # annotation_query
//!
//! Composable, type-checked filters over genome annotation tables (genes,
//! transcripts, exons, protein mappings) and their compilation to SQL.
//!
//! ```no_run
//! use annotation_query::{and, Expression, Field, GenomicInterval, QueryExecutor, SqliteStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteStore::open("EnsDb.Hsapiens.v108.sqlite")?;
//! let executor = QueryExecutor::new(store);
//!
//! let filter = and(
//!     Expression::one_of(Field::GeneBiotype, ["protein_coding"])?,
//!     Expression::overlapping("1:77000000-78000000".parse::<GenomicInterval>()?)?,
//! );
//! let genes = executor.genes(&filter)?;
//! println!("{} genes", genes.len());
//! # Ok(())
//! # }
//! ```
//!
//! Note the algebra of [`Expression::Empty`]: it is the identity of `and`,
//! but `or` with `Empty` yields `Empty`, and negating it is a compile error.

pub mod ast;
pub mod config;
pub mod error;
pub mod executor;
pub mod schema;
pub mod sql_compiler;
pub mod sqlite_store;

pub use ast::{and, empty, leaf, not, or, Expression, Field, GenomicInterval, Operand, Operator, Scalar, Strand};
pub use config::{CompilerConfig, JoinKind, TableMappingConfig};
pub use error::{FilterError, FilterResult, StoreError};
pub use executor::{execute, AnnotationStore, CellValue, QueryExecutor, Record, TabularResult};
pub use schema::Table;
pub use sql_compiler::{compile, CompiledQuery, JoinPlan, SqlCompiler};
pub use sqlite_store::SqliteStore;
