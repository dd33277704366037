//! Compiler configuration and JSON loading.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::schema::Table;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Cannot parse config file {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    /// Mapping key is not a logical table of the schema.
    #[error("Unknown logical table in table mapping: {0}")]
    UnknownTable(String),

    #[error("Empty physical name for table {0}")]
    EmptyTableName(Table),

    /// Two logical tables would resolve to the same physical table.
    #[error("Tables {first} and {second} both map to {physical}")]
    DuplicateTableName {
        physical: String,
        first: Table,
        second: Table,
    },
}

/// Maps logical table names to the physical names used by a concrete store,
/// e.g. `{"transcript": "tx"}` for Ensembl-style databases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct TableMappingConfig {
    mappings: BTreeMap<Table, String>,
}

impl TryFrom<BTreeMap<String, String>> for TableMappingConfig {
    type Error = ConfigError;

    fn try_from(raw: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        let mappings = raw
            .into_iter()
            .map(|(logical, physical)| {
                Table::from_name(&logical)
                    .map(|table| (table, physical))
                    .ok_or(ConfigError::UnknownTable(logical))
            })
            .collect::<Result<_, _>>()?;
        let config = Self { mappings };
        config.validate()?;
        Ok(config)
    }
}

impl From<TableMappingConfig> for BTreeMap<String, String> {
    fn from(config: TableMappingConfig) -> Self {
        config
            .mappings
            .into_iter()
            .map(|(table, physical)| (table.name().to_string(), physical))
            .collect()
    }
}

impl TableMappingConfig {
    /// Loads a table mapping from a JSON object of logical -> physical names.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw: BTreeMap<String, String> = read_json(path.as_ref())?;
        Self::try_from(raw)
    }

    /// Checks that every physical name is non-empty and that no two logical
    /// tables share one, mapped or not.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen: BTreeMap<&str, Table> = BTreeMap::new();
        for table in Table::ALL {
            let physical = self.table_name(table);
            if physical.trim().is_empty() {
                return Err(ConfigError::EmptyTableName(table));
            }
            if let Some(first) = seen.insert(physical, table) {
                return Err(ConfigError::DuplicateTableName {
                    physical: physical.to_string(),
                    first,
                    second: table,
                });
            }
        }
        Ok(())
    }

    /// Builder form; the result is not validated until [`Self::validate`].
    pub fn with_mapping(mut self, table: Table, physical: impl Into<String>) -> Self {
        self.mappings.insert(table, physical.into());
        self
    }

    /// Physical name of `table`; unmapped tables keep their logical name.
    pub fn table_name(&self, table: Table) -> &str {
        self.mappings
            .get(&table)
            .map(String::as_str)
            .unwrap_or_else(|| table.name())
    }

    pub fn mappings(&self) -> &BTreeMap<Table, String> {
        &self.mappings
    }
}

/// How tables in the join plan are joined.
///
/// With `Left`, anchor rows without joined rows carry NULL in the joined
/// columns. SQL comparisons against NULL are neither true nor false, so a
/// negated condition on a joined column (`not(transcript_is_canonical = true)`)
/// does not match those rows either; only rows with a joined value can pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

/// Predicate rewrites the compiler may apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Minimum number of same-field equalities under one OR before they are
    /// collapsed into a single IN clause.
    pub min_or_equalities_for_in: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            min_or_equalities_for_in: 3,
        }
    }
}

/// Compiler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub table_mapping: TableMappingConfig,
    pub join_kind: JoinKind,
    /// Drop duplicate rows produced by joins that only serve filtering.
    pub distinct: bool,
    pub optimization: OptimizationConfig,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            table_mapping: TableMappingConfig::default(),
            join_kind: JoinKind::default(),
            distinct: true,
            optimization: OptimizationConfig::default(),
        }
    }
}

impl CompilerConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        read_json(path.as_ref())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ConfigError::Json {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_valid_table_mapping() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "transcript": "tx", "protein_mapping": "uniprot" }}"#).unwrap();

        let config = TableMappingConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.table_name(Table::Transcript), "tx");
        assert_eq!(config.table_name(Table::ProteinMapping), "uniprot");
        assert_eq!(config.table_name(Table::Gene), "gene");
    }

    #[test]
    fn test_unknown_logical_table_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "chromosome": "chrom" }}"#).unwrap();

        let result = TableMappingConfig::from_json_file(file.path());
        assert!(matches!(
            result,
            Err(ConfigError::UnknownTable(ref name)) if name == "chromosome"
        ));
    }

    #[test]
    fn test_physical_name_collision_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "transcript": "gene" }}"#).unwrap();

        let result = TableMappingConfig::from_json_file(file.path());
        assert!(matches!(
            result,
            Err(ConfigError::DuplicateTableName { ref physical, first: Table::Gene, second: Table::Transcript })
                if physical == "gene"
        ));

        // swapping two names is still a one-to-one mapping
        let swapped = TableMappingConfig::default()
            .with_mapping(Table::Gene, "transcript")
            .with_mapping(Table::Transcript, "gene");
        assert!(swapped.validate().is_ok());
    }

    #[test]
    fn test_empty_physical_name_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "exon": "" }}"#).unwrap();

        let result = TableMappingConfig::from_json_file(file.path());
        assert!(matches!(result, Err(ConfigError::EmptyTableName(Table::Exon))));
    }

    #[test]
    fn test_nested_mapping_is_validated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "table_mapping": {{ "exon": "gene" }} }}"#).unwrap();

        // nested inside CompilerConfig the error surfaces through serde
        let result = CompilerConfig::from_json_file(file.path());
        assert!(matches!(result, Err(ConfigError::Json { .. })));
    }

    #[test]
    fn test_invalid_json_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "invalid json").unwrap();

        let result = CompilerConfig::from_json_file(file.path());
        assert!(matches!(result, Err(ConfigError::Json { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = CompilerConfig::from_json_file("non_existent_file.json");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_compiler_config_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{ "join_kind": "left", "table_mapping": {{ "transcript": "tx" }} }}"#
        )
        .unwrap();

        let config = CompilerConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.join_kind, JoinKind::Left);
        assert!(config.distinct);
        assert_eq!(config.optimization, OptimizationConfig::default());
        assert_eq!(config.table_mapping.table_name(Table::Transcript), "tx");
    }

    #[test]
    fn test_default_config() {
        let config = CompilerConfig::default();
        assert_eq!(config.join_kind, JoinKind::Inner);
        assert!(config.distinct);
        assert_eq!(config.table_mapping.table_name(Table::Exon), "exon");
    }
}
