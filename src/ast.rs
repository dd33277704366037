//! Filter expression tree: leaf predicates over a closed set of annotation
//! fields, and the AND / OR / NOT combinators that build trees out of them.
//!
//! Combinators never mutate their inputs. Two rules differ from textbook
//! boolean algebra and callers must be aware of them:
//!
//! - `Empty` matches every row. It is the identity of AND, but **OR with
//!   `Empty` yields `Empty`** ("everything OR anything" is "everything"); it is
//!   not treated as an OR identity.
//! - `not(empty())` is accepted here but rejected by the compiler with
//!   [`FilterError::UnsupportedExpression`].

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{FilterError, FilterResult};

/// Fields a leaf predicate can target. Each one has exactly one home table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    GeneId,
    GeneBiotype,
    GeneName,
    /// Sequence (chromosome) name of the gene.
    SeqName,
    /// Genomic interval of the gene: seqname, start, end, strand.
    GeneRange,
    TranscriptId,
    TranscriptBiotype,
    ExonId,
    /// Whether the transcript is the canonical one for its gene.
    Canonical,
    ProteinId,
    ProteinDatabase,
    ProteinMappingType,
}

impl Field {
    pub const ALL: [Field; 12] = [
        Field::GeneId,
        Field::GeneBiotype,
        Field::GeneName,
        Field::SeqName,
        Field::GeneRange,
        Field::TranscriptId,
        Field::TranscriptBiotype,
        Field::ExonId,
        Field::Canonical,
        Field::ProteinId,
        Field::ProteinDatabase,
        Field::ProteinMappingType,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::GeneId => "gene_id",
            Field::GeneBiotype => "gene_biotype",
            Field::GeneName => "gene_name",
            Field::SeqName => "seq_name",
            Field::GeneRange => "gene_range",
            Field::TranscriptId => "transcript_id",
            Field::TranscriptBiotype => "transcript_biotype",
            Field::ExonId => "exon_id",
            Field::Canonical => "canonical",
            Field::ProteinId => "protein_id",
            Field::ProteinDatabase => "protein_database",
            Field::ProteinMappingType => "protein_mapping_type",
        }
    }

    /// The type of value this field holds.
    pub fn domain(self) -> FieldDomain {
        match self {
            Field::GeneRange => FieldDomain::Interval,
            Field::Canonical => FieldDomain::Boolean,
            _ => FieldDomain::Text,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value domain of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDomain {
    Text,
    Boolean,
    Interval,
}

impl FieldDomain {
    /// Whether `operator` is defined for fields of this domain.
    pub fn supports(self, operator: Operator) -> bool {
        match self {
            FieldDomain::Text | FieldDomain::Boolean => {
                matches!(operator, Operator::Equals | Operator::In)
            }
            FieldDomain::Interval => {
                matches!(operator, Operator::RangeOverlaps | Operator::RangeWithin)
            }
        }
    }
}

/// Leaf operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `field = value`
    Equals,
    /// `field IN (values)`
    In,
    /// Row interval intersects the query interval.
    RangeOverlaps,
    /// Row interval lies entirely inside the query interval.
    RangeWithin,
}

/// A single scalar operand value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scalar {
    Text(String),
    Bool(bool),
}

impl Scalar {
    fn domain(&self) -> FieldDomain {
        match self {
            Scalar::Text(_) => FieldDomain::Text,
            Scalar::Bool(_) => FieldDomain::Boolean,
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// Strand of a genomic feature, stored as `1` / `-1` in the annotation tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn as_i64(self) -> i64 {
        match self {
            Strand::Forward => 1,
            Strand::Reverse => -1,
        }
    }
}

impl FromStr for Strand {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" | "1" => Ok(Strand::Forward),
            "-" | "-1" => Ok(Strand::Reverse),
            other => Err(FilterError::InvalidOperand {
                field: Field::GeneRange,
                reason: format!("unknown strand '{}'", other),
            }),
        }
    }
}

/// A genomic interval, 1-based and closed: `[start, end]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenomicInterval {
    pub seqname: String,
    pub start: i64,
    pub end: i64,
    /// When set, only features on this strand match.
    pub strand: Option<Strand>,
}

impl GenomicInterval {
    pub fn new(seqname: impl Into<String>, start: i64, end: i64) -> Self {
        Self {
            seqname: seqname.into(),
            start,
            end,
            strand: None,
        }
    }

    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = Some(strand);
        self
    }

    /// Closed-interval intersection test, the same condition the compiler emits.
    pub fn overlaps(&self, seqname: &str, start: i64, end: i64) -> bool {
        self.seqname == seqname && start <= self.end && end >= self.start
    }

    /// Containment test, the same condition the compiler emits for `RangeWithin`.
    pub fn contains(&self, seqname: &str, start: i64, end: i64) -> bool {
        self.seqname == seqname && start >= self.start && end <= self.end
    }

    fn validate(&self, field: Field) -> FilterResult<()> {
        let reason = if self.seqname.is_empty() {
            "sequence name is empty".to_string()
        } else if self.start < 1 {
            format!("start {} is not a 1-based position", self.start)
        } else if self.start > self.end {
            format!("start {} is after end {}", self.start, self.end)
        } else {
            return Ok(());
        };
        Err(FilterError::InvalidOperand { field, reason })
    }
}

/// Parses region strings such as `1:77000000-78000000` or `chrX:100-200:-`.
impl FromStr for GenomicInterval {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| FilterError::InvalidOperand {
            field: Field::GeneRange,
            reason,
        };

        let (region, strand) = match s.strip_suffix(":+").or_else(|| s.strip_suffix(":-")) {
            Some(region) => (region, Some(s[region.len() + 1..].parse::<Strand>()?)),
            None => (s, None),
        };
        let (seqname, range) = region
            .rsplit_once(':')
            .ok_or_else(|| invalid(format!("region '{}' has no ':'", s)))?;
        let (start, end) = range
            .split_once('-')
            .ok_or_else(|| invalid(format!("region '{}' has no '-'", s)))?;
        let parse_pos = |pos: &str| {
            pos.trim()
                .replace(',', "")
                .parse::<i64>()
                .map_err(|e| invalid(format!("bad position '{}': {}", pos, e)))
        };

        let interval = GenomicInterval {
            seqname: seqname.to_string(),
            start: parse_pos(start)?,
            end: parse_pos(end)?,
            strand,
        };
        interval.validate(Field::GeneRange)?;
        Ok(interval)
    }
}

/// Operand of a leaf predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Scalar(Scalar),
    Set(BTreeSet<Scalar>),
    Interval(GenomicInterval),
}

impl Operand {
    /// Builds a set operand from any collection of scalar-convertible values.
    pub fn set<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        Operand::Set(values.into_iter().map(Into::into).collect())
    }

    fn kind(&self) -> &'static str {
        match self {
            Operand::Scalar(_) => "scalar",
            Operand::Set(_) => "set",
            Operand::Interval(_) => "interval",
        }
    }
}

impl From<Scalar> for Operand {
    fn from(value: Scalar) -> Self {
        Operand::Scalar(value)
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Scalar(value.into())
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Operand::Scalar(value.into())
    }
}

impl From<GenomicInterval> for Operand {
    fn from(value: GenomicInterval) -> Self {
        Operand::Interval(value)
    }
}

/// A validated single-field condition. Only constructible through
/// [`Predicate::new`], so every instance satisfies its field's domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Predicate {
    field: Field,
    operator: Operator,
    operand: Operand,
}

impl Predicate {
    pub fn new(field: Field, operator: Operator, operand: Operand) -> FilterResult<Self> {
        let domain = field.domain();
        if !domain.supports(operator) {
            return Err(FilterError::UnsupportedOperator { field, operator });
        }

        let check_scalar = |value: &Scalar| {
            if value.domain() == domain {
                Ok(())
            } else {
                Err(FilterError::InvalidOperand {
                    field,
                    reason: format!("{:?} value does not fit a {:?} field", value, domain),
                })
            }
        };

        match (&operator, &operand) {
            (Operator::Equals, Operand::Scalar(value)) => check_scalar(value)?,
            (Operator::In, Operand::Set(values)) => {
                if values.is_empty() {
                    return Err(FilterError::EmptyOperand { field });
                }
                values.iter().try_for_each(check_scalar)?;
            }
            (Operator::RangeOverlaps | Operator::RangeWithin, Operand::Interval(interval)) => {
                interval.validate(field)?
            }
            (op, operand) => {
                return Err(FilterError::InvalidOperand {
                    field,
                    reason: format!("{} operand cannot be used with {:?}", operand.kind(), op),
                })
            }
        }

        Ok(Self {
            field,
            operator,
            operand,
        })
    }

    pub fn field(&self) -> Field {
        self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }
}

/// Filter expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expression {
    /// Matches every row.
    Empty,
    Leaf(Predicate),
    /// Conjunction of at least one child, never directly nesting another `And`.
    And(Vec<Expression>),
    /// Disjunction of at least one child, never directly nesting another `Or`.
    Or(Vec<Expression>),
    Not(Box<Expression>),
}

impl Default for Expression {
    fn default() -> Self {
        Expression::Empty
    }
}

impl Expression {
    pub fn empty() -> Self {
        Expression::Empty
    }

    pub fn leaf(field: Field, operator: Operator, operand: impl Into<Operand>) -> FilterResult<Self> {
        Predicate::new(field, operator, operand.into()).map(Expression::Leaf)
    }

    /// `field = value`
    pub fn equals(field: Field, value: impl Into<Scalar>) -> FilterResult<Self> {
        Self::leaf(field, Operator::Equals, Operand::Scalar(value.into()))
    }

    /// `field IN (values)`
    pub fn one_of<I, V>(field: Field, values: I) -> FilterResult<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Scalar>,
    {
        Self::leaf(field, Operator::In, Operand::set(values))
    }

    /// Genes overlapping `interval`.
    pub fn overlapping(interval: GenomicInterval) -> FilterResult<Self> {
        Self::leaf(Field::GeneRange, Operator::RangeOverlaps, interval)
    }

    /// Genes lying entirely inside `interval`.
    pub fn within(interval: GenomicInterval) -> FilterResult<Self> {
        Self::leaf(Field::GeneRange, Operator::RangeWithin, interval)
    }

    /// Conjunction. `Empty` is the identity; nested `And`s are flattened.
    pub fn and(self, other: Expression) -> Expression {
        match (self, other) {
            (Expression::Empty, e) | (e, Expression::Empty) => e,
            (a, b) => Expression::And(concat(a, b, |e| match e {
                Expression::And(children) => Ok(children),
                other => Err(other),
            })),
        }
    }

    /// Disjunction. Either side being `Empty` yields `Empty`; nested `Or`s are
    /// flattened.
    pub fn or(self, other: Expression) -> Expression {
        match (self, other) {
            (Expression::Empty, _) | (_, Expression::Empty) => Expression::Empty,
            (a, b) => Expression::Or(concat(a, b, |e| match e {
                Expression::Or(children) => Ok(children),
                other => Err(other),
            })),
        }
    }

    /// Negation. `not(not(e))` collapses to `e`; `not(empty())` stays literal.
    ///
    /// Negation follows SQL three-valued logic: a row whose field is NULL,
    /// e.g. a gene without transcripts under [`JoinKind::Left`](crate::config::JoinKind),
    /// matches neither the condition nor its negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expression {
        match self {
            Expression::Not(inner) => *inner,
            other => Expression::Not(Box::new(other)),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Expression::Empty)
    }

    /// Calls `visit` on every leaf, left to right.
    pub fn for_each_leaf<'a>(&'a self, visit: &mut impl FnMut(&'a Predicate)) {
        match self {
            Expression::Empty => {}
            Expression::Leaf(predicate) => visit(predicate),
            Expression::And(children) | Expression::Or(children) => {
                for child in children {
                    child.for_each_leaf(visit);
                }
            }
            Expression::Not(child) => child.for_each_leaf(visit),
        }
    }

    /// Distinct fields referenced by the tree, in first-appearance order.
    pub fn fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();
        self.for_each_leaf(&mut |predicate| {
            if !fields.contains(&predicate.field) {
                fields.push(predicate.field);
            }
        });
        fields
    }
}

fn concat(
    a: Expression,
    b: Expression,
    split: impl Fn(Expression) -> Result<Vec<Expression>, Expression>,
) -> Vec<Expression> {
    let mut children = split(a).unwrap_or_else(|single| vec![single]);
    match split(b) {
        Ok(mut rest) => children.append(&mut rest),
        Err(single) => children.push(single),
    }
    children
}

pub fn empty() -> Expression {
    Expression::empty()
}

pub fn leaf(field: Field, operator: Operator, operand: impl Into<Operand>) -> FilterResult<Expression> {
    Expression::leaf(field, operator, operand)
}

pub fn and(a: Expression, b: Expression) -> Expression {
    a.and(b)
}

/// See [`Expression::or`]: OR with `Empty` is `Empty`.
pub fn or(a: Expression, b: Expression) -> Expression {
    a.or(b)
}

pub fn not(a: Expression) -> Expression {
    a.not()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn biotype(value: &str) -> Expression {
        Expression::equals(Field::GeneBiotype, value).unwrap()
    }

    #[test]
    fn test_and_flattens_nested_conjunctions() {
        let (a, b, c) = (biotype("a"), biotype("b"), biotype("c"));
        let nested = and(and(a.clone(), b.clone()), c.clone());
        assert_eq!(nested, Expression::And(vec![a.clone(), b.clone(), c.clone()]));

        let right = and(a.clone(), and(b.clone(), c.clone()));
        assert_eq!(right, Expression::And(vec![a, b, c]));
    }

    #[test]
    fn test_or_flattens_but_keeps_and_children() {
        let (a, b, c) = (biotype("a"), biotype("b"), biotype("c"));
        let conj = and(a.clone(), b.clone());
        let expr = or(conj.clone(), c.clone());
        assert_eq!(expr, Expression::Or(vec![conj, c]));
    }

    #[test]
    fn test_empty_is_and_identity() {
        let a = biotype("protein_coding");
        assert_eq!(and(a.clone(), empty()), a);
        assert_eq!(and(empty(), a.clone()), a);
        assert_eq!(and(empty(), empty()), empty());
    }

    #[test]
    fn test_or_with_empty_is_empty() {
        let a = biotype("protein_coding");
        assert_eq!(or(a.clone(), empty()), empty());
        assert_eq!(or(empty(), a), empty());
    }

    #[test]
    fn test_double_negation_eliminated() {
        let a = biotype("lncRNA");
        assert_eq!(not(not(a.clone())), a);
        assert_eq!(not(a.clone()), Expression::Not(Box::new(a)));
    }

    #[test]
    fn test_not_empty_stays_literal() {
        assert_eq!(not(empty()), Expression::Not(Box::new(Expression::Empty)));
        assert_eq!(not(not(empty())), empty());
    }

    #[test]
    fn test_empty_set_operand_rejected() {
        let err = leaf(Field::GeneBiotype, Operator::In, Operand::Set(BTreeSet::new())).unwrap_err();
        assert!(matches!(err, FilterError::EmptyOperand { field: Field::GeneBiotype }));
    }

    #[test]
    fn test_range_operator_rejected_on_scalar_field() {
        let err = leaf(
            Field::GeneName,
            Operator::RangeOverlaps,
            GenomicInterval::new("1", 1, 10),
        )
        .unwrap_err();
        assert!(matches!(err, FilterError::UnsupportedOperator { .. }));

        let err = leaf(Field::GeneRange, Operator::Equals, "1").unwrap_err();
        assert!(matches!(err, FilterError::UnsupportedOperator { .. }));
    }

    #[test]
    fn test_mismatched_operand_rejected() {
        // bool value on a text field
        let err = leaf(Field::GeneBiotype, Operator::Equals, true).unwrap_err();
        assert!(matches!(err, FilterError::InvalidOperand { .. }));

        // set operand with Equals
        let err = leaf(Field::GeneId, Operator::Equals, Operand::set(["ENSG1"])).unwrap_err();
        assert!(matches!(err, FilterError::InvalidOperand { .. }));

        // text value on the canonical flag
        let err = leaf(Field::Canonical, Operator::In, Operand::set(["yes"])).unwrap_err();
        assert!(matches!(err, FilterError::InvalidOperand { .. }));

        // inverted interval
        let err = Expression::overlapping(GenomicInterval::new("1", 20, 10)).unwrap_err();
        assert!(matches!(err, FilterError::InvalidOperand { .. }));
    }

    #[test]
    fn test_set_operand_deduplicates() {
        let expr = Expression::one_of(Field::GeneId, ["ENSG2", "ENSG1", "ENSG2"]).unwrap();
        match expr {
            Expression::Leaf(predicate) => {
                assert_eq!(predicate.operand(), &Operand::set(["ENSG1", "ENSG2"]));
            }
            other => panic!("Expected leaf, got {:?}", other),
        }
    }

    #[test]
    fn test_fields_in_first_appearance_order() {
        let expr = and(
            Expression::equals(Field::TranscriptBiotype, "protein_coding").unwrap(),
            or(
                Expression::equals(Field::ExonId, "ENSE1").unwrap(),
                Expression::equals(Field::TranscriptBiotype, "lncRNA").unwrap(),
            ),
        );
        assert_eq!(expr.fields(), vec![Field::TranscriptBiotype, Field::ExonId]);
        assert!(empty().fields().is_empty());
    }

    #[test]
    fn test_region_string_parsing() {
        let interval: GenomicInterval = "1:77000000-78000000".parse().unwrap();
        assert_eq!(interval, GenomicInterval::new("1", 77_000_000, 78_000_000));

        let stranded: GenomicInterval = "chrX:1,000-2,000:-".parse().unwrap();
        assert_eq!(
            stranded,
            GenomicInterval::new("chrX", 1000, 2000).with_strand(Strand::Reverse)
        );

        assert!("chr1".parse::<GenomicInterval>().is_err());
        assert!("chr1:100".parse::<GenomicInterval>().is_err());
        assert!("chr1:0-10".parse::<GenomicInterval>().is_err());
        assert!("chr1:a-10".parse::<GenomicInterval>().is_err());
    }

    #[test]
    fn test_interval_closed_semantics() {
        let query = GenomicInterval::new("chr1", 1000, 2000);
        assert!(query.overlaps("chr1", 2000, 3000));
        assert!(query.overlaps("chr1", 500, 1000));
        assert!(!query.overlaps("chr1", 2001, 3000));
        assert!(!query.overlaps("chr2", 1500, 1600));
        assert!(query.contains("chr1", 1000, 2000));
        assert!(!query.contains("chr1", 999, 1500));
    }
}
