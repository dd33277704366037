//! Shared fixture: a small annotation database in memory.
#![allow(dead_code)]

use annotation_query::{SqliteStore, Table, TableMappingConfig, TabularResult};

pub fn init_logging() {
    let _ = pretty_env_logger::formatted_builder().is_test(true).try_init();
}

/// Genes (id, name, biotype, seqname, start, end, strand).
const GENES: &[(&str, &str, &str, &str, i64, i64, i64)] = &[
    ("ENSG01", "GENEA", "protein_coding", "chr1", 900, 1100, 1),
    ("ENSG02", "GENEB", "protein_coding", "chr1", 2001, 3000, -1),
    ("ENSG03", "GENEC", "protein_coding", "chr2", 1500, 1600, 1),
    ("ENSG04", "LNC1", "lncRNA", "chr1", 1200, 1800, -1),
    ("ENSG05", "LNC2", "lncRNA", "chr2", 10, 50, 1),
];

/// Transcripts (id, gene_id, biotype, is_canonical, start, end). GENEC and
/// LNC2 have none.
const TRANSCRIPTS: &[(&str, &str, &str, bool, i64, i64)] = &[
    ("ENST01", "ENSG01", "protein_coding", true, 900, 1100),
    ("ENST02", "ENSG01", "nonsense_mediated_decay", false, 950, 1100),
    ("ENST03", "ENSG02", "protein_coding", true, 2001, 3000),
    ("ENST04", "ENSG04", "lncRNA", true, 1200, 1800),
];

/// Exons (id, transcript_id, start, end).
const EXONS: &[(&str, &str, i64, i64)] = &[
    ("ENSE01", "ENST01", 900, 950),
    ("ENSE02", "ENST01", 1000, 1100),
    ("ENSE03", "ENST02", 950, 1100),
    ("ENSE04", "ENST03", 2001, 2500),
    ("ENSE05", "ENST04", 1200, 1800),
];

/// Protein mappings (protein_id, database, mapping_type, gene_id).
const PROTEINS: &[(&str, &str, &str, &str)] = &[
    ("P01", "Uniprot/SWISSPROT", "DIRECT", "ENSG01"),
    ("P02", "Uniprot/SPTREMBL", "SEQUENCE_MATCH", "ENSG02"),
];

pub fn fixture_store() -> anyhow::Result<SqliteStore> {
    fixture_store_with_names(&TableMappingConfig::default())
}

/// Same data, with tables created under their mapped physical names.
pub fn fixture_store_with_names(names: &TableMappingConfig) -> anyhow::Result<SqliteStore> {
    let store = SqliteStore::open_in_memory()?;
    let conn = store.connection();
    let gene = names.table_name(Table::Gene);
    let transcript = names.table_name(Table::Transcript);
    let exon = names.table_name(Table::Exon);
    let protein = names.table_name(Table::ProteinMapping);

    conn.execute_batch(&format!(
        r#"CREATE TABLE "{gene}" (id TEXT PRIMARY KEY, name TEXT, biotype TEXT, seqname TEXT,
                                  "start" INTEGER, "end" INTEGER, strand INTEGER);
           CREATE TABLE "{transcript}" (id TEXT PRIMARY KEY, gene_id TEXT, biotype TEXT,
                                        is_canonical INTEGER, "start" INTEGER, "end" INTEGER);
           CREATE TABLE "{exon}" (id TEXT, transcript_id TEXT, "start" INTEGER, "end" INTEGER);
           CREATE TABLE "{protein}" (protein_id TEXT, "database" TEXT, mapping_type TEXT, gene_id TEXT);"#
    ))?;

    for (id, name, biotype, seqname, start, end, strand) in GENES {
        conn.execute(
            &format!(r#"INSERT INTO "{gene}" VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#),
            rusqlite::params![id, name, biotype, seqname, start, end, strand],
        )?;
    }
    for (id, gene_id, biotype, canonical, start, end) in TRANSCRIPTS {
        conn.execute(
            &format!(r#"INSERT INTO "{transcript}" VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#),
            rusqlite::params![id, gene_id, biotype, canonical, start, end],
        )?;
    }
    for (id, transcript_id, start, end) in EXONS {
        conn.execute(
            &format!(r#"INSERT INTO "{exon}" VALUES (?1, ?2, ?3, ?4)"#),
            rusqlite::params![id, transcript_id, start, end],
        )?;
    }
    for (protein_id, database, mapping_type, gene_id) in PROTEINS {
        conn.execute(
            &format!(r#"INSERT INTO "{protein}" VALUES (?1, ?2, ?3, ?4)"#),
            rusqlite::params![protein_id, database, mapping_type, gene_id],
        )?;
    }

    Ok(store)
}

/// Values of a text column, sorted, since row order is not part of the contract.
pub fn sorted_texts(result: &TabularResult, column: &str) -> Vec<String> {
    let mut values: Vec<String> = result
        .column(column)
        .unwrap_or_default()
        .into_iter()
        .map(|v| v.to_string())
        .collect();
    values.sort();
    values
}
