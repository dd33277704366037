//! Static description of the annotation schema and the field resolver.
//!
//! The schema is four tables linked by `_id` foreign keys:
//!
//! ```text
//! gene ──< transcript ──< exon
//!   └───< protein_mapping
//! ```
//!
//! Everything here is immutable, `'static` data; resolution is a pure lookup.

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use crate::ast::{Expression, Field};
use crate::error::{FilterError, FilterResult};

/// Logical tables of the Annotation Store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Gene,
    Transcript,
    Exon,
    ProteinMapping,
}

impl Table {
    /// In degree order: the anchor first, then tables further away from it.
    pub const ALL: [Table; 4] = [
        Table::Gene,
        Table::Transcript,
        Table::Exon,
        Table::ProteinMapping,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Gene => "gene",
            Table::Transcript => "transcript",
            Table::Exon => "exon",
            Table::ProteinMapping => "protein_mapping",
        }
    }

    pub fn from_name(name: &str) -> Option<Table> {
        Table::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Natural column order of the table.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Table::Gene => &["id", "name", "biotype", "seqname", "start", "end", "strand"],
            Table::Transcript => &["id", "gene_id", "biotype", "is_canonical", "start", "end"],
            Table::Exon => &["id", "transcript_id", "start", "end"],
            Table::ProteinMapping => &["protein_id", "database", "mapping_type", "gene_id"],
        }
    }

    /// The `'static` spelling of `column` if this table has it.
    pub fn column(self, column: &str) -> Option<&'static str> {
        self.columns().iter().copied().find(|c| *c == column)
    }

    /// Foreign keys walked from `gene` to reach this table.
    pub fn path_from_gene(self) -> &'static [ForeignKey] {
        match self {
            Table::Gene => &[],
            Table::Transcript => &FOREIGN_KEYS[..1],
            Table::Exon => &FOREIGN_KEYS[..2],
            Table::ProteinMapping => &FOREIGN_KEYS[2..],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `child.child_column` references `parent.parent_column`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    pub parent: Table,
    pub parent_column: &'static str,
    pub child: Table,
    pub child_column: &'static str,
}

impl ForeignKey {
    /// Orients the key as a join that reaches the far side from `from`.
    fn step_from(&self, from: Table) -> Option<JoinStep> {
        if from == self.parent {
            Some(JoinStep {
                table: self.child,
                column: self.child_column,
                joined_to: self.parent,
                joined_column: self.parent_column,
            })
        } else if from == self.child {
            Some(JoinStep {
                table: self.parent,
                column: self.parent_column,
                joined_to: self.child,
                joined_column: self.child_column,
            })
        } else {
            None
        }
    }
}

pub const FOREIGN_KEYS: [ForeignKey; 3] = [
    ForeignKey {
        parent: Table::Gene,
        parent_column: "id",
        child: Table::Transcript,
        child_column: "gene_id",
    },
    ForeignKey {
        parent: Table::Transcript,
        parent_column: "id",
        child: Table::Exon,
        child_column: "transcript_id",
    },
    ForeignKey {
        parent: Table::Gene,
        parent_column: "id",
        child: Table::ProteinMapping,
        child_column: "gene_id",
    },
];

/// One join: bring in `table` on `table.column = joined_to.joined_column`,
/// where `joined_to` is already part of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JoinStep {
    pub table: Table,
    pub column: &'static str,
    pub joined_to: Table,
    pub joined_column: &'static str,
}

/// Columns a field is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRef {
    Column(&'static str),
    Interval {
        seqname: &'static str,
        start: &'static str,
        end: &'static str,
        strand: &'static str,
    },
}

/// Where a field lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub table: Table,
    pub column: ColumnRef,
    /// Foreign keys walked from the `gene` anchor to `table`.
    pub join_path: &'static [ForeignKey],
}

/// Home table and column(s) of `field`.
pub fn resolve(field: Field) -> Resolved {
    use ColumnRef::Column;

    let (table, column) = match field {
        Field::GeneId => (Table::Gene, Column("id")),
        Field::GeneBiotype => (Table::Gene, Column("biotype")),
        Field::GeneName => (Table::Gene, Column("name")),
        Field::SeqName => (Table::Gene, Column("seqname")),
        Field::GeneRange => (
            Table::Gene,
            ColumnRef::Interval {
                seqname: "seqname",
                start: "start",
                end: "end",
                strand: "strand",
            },
        ),
        Field::TranscriptId => (Table::Transcript, Column("id")),
        Field::TranscriptBiotype => (Table::Transcript, Column("biotype")),
        Field::Canonical => (Table::Transcript, Column("is_canonical")),
        Field::ExonId => (Table::Exon, Column("id")),
        Field::ProteinId => (Table::ProteinMapping, Column("protein_id")),
        Field::ProteinDatabase => (Table::ProteinMapping, Column("database")),
        Field::ProteinMappingType => (Table::ProteinMapping, Column("mapping_type")),
    };

    Resolved {
        table,
        column,
        join_path: table.path_from_gene(),
    }
}

/// Tables hosting the fields referenced anywhere in `expression`.
pub fn tables_touched_by(expression: &Expression) -> BTreeSet<Table> {
    let mut tables = BTreeSet::new();
    expression.for_each_leaf(&mut |predicate| {
        tables.insert(resolve(predicate.field()).table);
    });
    tables
}

/// Shortest chain of joins from `from` to `to` (empty when they are equal).
pub fn join_path(from: Table, to: Table) -> FilterResult<Vec<JoinStep>> {
    // Breadth-first search; `came_by[t]` is the step that first reached `t`.
    let mut came_by: [Option<JoinStep>; Table::ALL.len()] = [None; Table::ALL.len()];
    let mut seen = BTreeSet::from([from]);
    let mut queue = VecDeque::from([from]);

    while let Some(current) = queue.pop_front() {
        if current == to {
            let mut path = Vec::new();
            let mut at = to;
            while let Some(step) = came_by[at as usize] {
                path.push(step);
                at = step.joined_to;
            }
            path.reverse();
            return Ok(path);
        }
        for key in &FOREIGN_KEYS {
            if let Some(step) = key.step_from(current) {
                if seen.insert(step.table) {
                    came_by[step.table as usize] = Some(step);
                    queue.push_back(step.table);
                }
            }
        }
    }

    Err(FilterError::EmptyJoinPath { from, to })
}

/// Finds the table hosting an output column name.
///
/// `name` is either qualified (`transcript.biotype`) or bare (`biotype`).
/// Bare names prefer `anchor`, then follow [`Table::ALL`] order.
pub fn table_for_column(name: &str, anchor: Table) -> FilterResult<(Table, &'static str)> {
    let unknown = || FilterError::UnknownColumn(name.to_string());

    if let Some((table, column)) = name.split_once('.') {
        let table = Table::from_name(table).ok_or_else(unknown)?;
        let column = table.column(column).ok_or_else(unknown)?;
        return Ok((table, column));
    }

    std::iter::once(anchor)
        .chain(Table::ALL)
        .find_map(|table| table.column(name).map(|column| (table, column)))
        .ok_or_else(unknown)
}
