//! Query compiler: lowers a filter [`Expression`] into a join plan plus a
//! sea-query predicate, and renders both as a SQLite `SELECT`.

use std::collections::BTreeSet;

use log::{debug, log_enabled, trace, Level};
use sea_query::{
    Alias, Expr, Iden, JoinType, SelectStatement, SimpleExpr, SqliteQueryBuilder, Value, Values,
};

use crate::ast::{Expression, Field, Operand, Operator, Predicate, Scalar};
use crate::config::{CompilerConfig, JoinKind};
use crate::error::{FilterError, FilterResult};
use crate::schema::{join_path, resolve, table_for_column, tables_touched_by, ColumnRef, JoinStep, Table};

/// Physical table identifier for sea-query
#[derive(Debug, Clone)]
pub struct TableName(pub String);

impl Iden for TableName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Column identifier wrapper
#[derive(Debug, Clone)]
pub struct ColumnName(pub &'static str);

impl Iden for ColumnName {
    fn unquoted(&self, s: &mut dyn std::fmt::Write) {
        write!(s, "{}", self.0).unwrap();
    }
}

/// Deduplicated joins needed to reach every table an expression touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPlan {
    anchor: Table,
    steps: Vec<JoinStep>,
}

impl JoinPlan {
    /// Union of the shortest paths from `anchor` to each target; every table
    /// is joined at most once, and always after the table it joins to.
    pub fn build(anchor: Table, targets: impl IntoIterator<Item = Table>) -> FilterResult<Self> {
        let mut joined = BTreeSet::from([anchor]);
        let mut steps = Vec::new();

        for target in targets {
            for step in join_path(anchor, target)? {
                if joined.insert(step.table) {
                    steps.push(step);
                }
            }
        }

        Ok(Self { anchor, steps })
    }

    pub fn anchor(&self) -> Table {
        self.anchor
    }

    pub fn steps(&self) -> &[JoinStep] {
        &self.steps
    }

    /// The anchor followed by joined tables in join order.
    pub fn tables(&self) -> Vec<Table> {
        std::iter::once(self.anchor)
            .chain(self.steps.iter().map(|step| step.table))
            .collect()
    }

    pub fn contains(&self, table: Table) -> bool {
        self.anchor == table || self.steps.iter().any(|step| step.table == table)
    }
}

/// A column in the result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputColumn {
    pub table: Table,
    pub column: &'static str,
    /// Bare column name for anchor columns, `table.column` otherwise.
    pub label: String,
}

/// Represents a rewrite applied during compilation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Optimization {
    /// Same-field equalities under one OR merged into a single IN clause.
    OrToIn { field: Field, value_count: usize },
}

/// Join plan and predicate ready for execution.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    join_plan: JoinPlan,
    /// `None` when the expression matches every row.
    predicate: Option<SimpleExpr>,
    columns: Vec<OutputColumn>,
    statement: SelectStatement,
    optimizations: Vec<Optimization>,
}

impl CompiledQuery {
    pub fn join_plan(&self) -> &JoinPlan {
        &self.join_plan
    }

    pub fn predicate(&self) -> Option<&SimpleExpr> {
        self.predicate.as_ref()
    }

    pub fn columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    pub fn optimizations(&self) -> &[Optimization] {
        &self.optimizations
    }

    pub fn statement(&self) -> &SelectStatement {
        &self.statement
    }

    /// SQL with values inlined, for display and logging.
    pub fn to_sql(&self) -> String {
        self.statement.to_string(SqliteQueryBuilder)
    }

    /// Parameterized SQL and its bound values.
    pub fn build(&self) -> (String, Values) {
        self.statement.build(SqliteQueryBuilder)
    }
}

/// Lowered form of a sub-expression.
enum Lowered {
    /// Matches every row; emitted as no WHERE condition at all.
    Always,
    Condition(SimpleExpr),
}

/// Compiles filter expressions against the annotation schema.
#[derive(Debug, Clone, Default)]
pub struct SqlCompiler {
    config: CompilerConfig,
}

impl SqlCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile `expression` into a query returning the columns of `anchor`.
    pub fn compile(&self, expression: &Expression, anchor: Table) -> FilterResult<CompiledQuery> {
        self.compile_select(expression, anchor, &[])
    }

    /// Like [`SqlCompiler::compile`], additionally selecting `columns` from
    /// other tables. Names are bare (looked up on the anchor first) or
    /// qualified as `table.column`.
    pub fn compile_select(
        &self,
        expression: &Expression,
        anchor: Table,
        columns: &[&str],
    ) -> FilterResult<CompiledQuery> {
        let mut output: Vec<OutputColumn> = anchor
            .columns()
            .iter()
            .map(|&column| OutputColumn {
                table: anchor,
                column,
                label: column.to_string(),
            })
            .collect();
        for name in columns {
            let (table, column) = table_for_column(name, anchor)?;
            if output.iter().any(|c| c.table == table && c.column == column) {
                continue;
            }
            output.push(OutputColumn {
                table,
                column,
                label: format!("{}.{}", table, column),
            });
        }

        let mut targets = tables_touched_by(expression);
        targets.extend(output.iter().map(|c| c.table));
        let join_plan = JoinPlan::build(anchor, targets)?;

        let mut optimizations = Vec::new();
        let predicate = match self.lower(expression, &mut optimizations)? {
            Lowered::Always => None,
            Lowered::Condition(condition) => Some(condition),
        };

        let statement = self.render(&join_plan, &output, predicate.clone());
        let compiled = CompiledQuery {
            join_plan,
            predicate,
            columns: output,
            statement,
            optimizations,
        };

        if log_enabled!(Level::Debug) {
            debug!(
                "compiled {} query joining {:?}: {}",
                anchor,
                compiled.join_plan.tables(),
                compiled.to_sql()
            );
        }
        Ok(compiled)
    }

    fn table(&self, table: Table) -> TableName {
        TableName(self.config.table_mapping.table_name(table).to_string())
    }

    fn col(&self, table: Table, column: &'static str) -> Expr {
        Expr::col((self.table(table), ColumnName(column)))
    }

    fn render(
        &self,
        plan: &JoinPlan,
        output: &[OutputColumn],
        predicate: Option<SimpleExpr>,
    ) -> SelectStatement {
        let mut select = SelectStatement::new();
        select.from(self.table(plan.anchor()));
        if self.config.distinct {
            select.distinct();
        }

        for column in output {
            if column.table == plan.anchor() {
                select.column((self.table(column.table), ColumnName(column.column)));
            } else {
                select.expr_as(
                    self.col(column.table, column.column),
                    Alias::new(column.label.as_str()),
                );
            }
        }

        let join_type = match self.config.join_kind {
            JoinKind::Inner => JoinType::InnerJoin,
            JoinKind::Left => JoinType::LeftJoin,
        };
        for step in plan.steps() {
            select.join(
                join_type,
                self.table(step.table),
                Expr::col((self.table(step.table), ColumnName(step.column)))
                    .equals((self.table(step.joined_to), ColumnName(step.joined_column))),
            );
        }

        if let Some(predicate) = predicate {
            select.and_where(predicate);
        }
        select
    }

    fn lower(&self, expression: &Expression, optimizations: &mut Vec<Optimization>) -> FilterResult<Lowered> {
        let lowered = match expression {
            Expression::Empty => Lowered::Always,
            Expression::Leaf(predicate) => Lowered::Condition(self.lower_leaf(predicate)?),
            Expression::And(children) => {
                if children.is_empty() {
                    return Err(FilterError::UnsupportedExpression(
                        "AND node without children".to_string(),
                    ));
                }
                let mut conditions = Vec::new();
                for child in children {
                    if let Lowered::Condition(condition) = self.lower(child, optimizations)? {
                        conditions.push(condition);
                    }
                }
                match conditions.into_iter().reduce(SimpleExpr::and) {
                    Some(condition) => Lowered::Condition(condition),
                    None => Lowered::Always,
                }
            }
            Expression::Or(children) => {
                if children.is_empty() {
                    return Err(FilterError::UnsupportedExpression(
                        "OR node without children".to_string(),
                    ));
                }
                if let Some((condition, optimization)) = self.try_optimize_or_to_in(children) {
                    optimizations.push(optimization);
                    return Ok(Lowered::Condition(condition));
                }
                // Lower every child before deciding, so a bad branch is never skipped.
                let mut conditions = Vec::new();
                let mut matches_all = false;
                for child in children {
                    match self.lower(child, optimizations)? {
                        Lowered::Always => matches_all = true,
                        Lowered::Condition(condition) => conditions.push(condition),
                    }
                }
                match conditions.into_iter().reduce(SimpleExpr::or) {
                    Some(condition) if !matches_all => Lowered::Condition(condition),
                    _ => Lowered::Always,
                }
            }
            Expression::Not(child) => match self.lower(child, optimizations)? {
                Lowered::Condition(condition) => Lowered::Condition(condition.not()),
                Lowered::Always => {
                    return Err(FilterError::UnsupportedExpression(
                        "negation of the empty filter is undefined".to_string(),
                    ))
                }
            },
        };
        Ok(lowered)
    }

    fn lower_leaf(&self, predicate: &Predicate) -> FilterResult<SimpleExpr> {
        let resolved = resolve(predicate.field());
        let table = resolved.table;
        trace!(
            "lowering {:?} on {} against {}",
            predicate.operator(),
            predicate.field(),
            table
        );

        let condition = match (resolved.column, predicate.operator(), predicate.operand()) {
            (ColumnRef::Column(column), Operator::Equals, Operand::Scalar(value)) => {
                self.col(table, column).eq(scalar_value(value))
            }
            (ColumnRef::Column(column), Operator::In, Operand::Set(values)) => {
                self.col(table, column).is_in(values.iter().map(scalar_value))
            }
            (
                ColumnRef::Interval {
                    seqname,
                    start,
                    end,
                    strand,
                },
                operator @ (Operator::RangeOverlaps | Operator::RangeWithin),
                Operand::Interval(query),
            ) => {
                let same_seq = self.col(table, seqname).eq(query.seqname.as_str());
                let bounds = if operator == Operator::RangeOverlaps {
                    // closed intervals: [start, end] meets [query.start, query.end]
                    self.col(table, start)
                        .lte(query.end)
                        .and(self.col(table, end).gte(query.start))
                } else {
                    self.col(table, start)
                        .gte(query.start)
                        .and(self.col(table, end).lte(query.end))
                };
                let condition = same_seq.and(bounds);
                match query.strand {
                    Some(s) => condition.and(self.col(table, strand).eq(s.as_i64())),
                    None => condition,
                }
            }
            (_, operator, _) => {
                return Err(FilterError::UnsupportedExpression(format!(
                    "cannot lower {:?} on {}",
                    operator,
                    predicate.field()
                )))
            }
        };
        Ok(condition)
    }

    /// Merges an OR made only of equality / IN leaves on one field into a
    /// single IN clause, when it has enough children to be worth it.
    fn try_optimize_or_to_in(&self, children: &[Expression]) -> Option<(SimpleExpr, Optimization)> {
        let threshold = self.config.optimization.min_or_equalities_for_in.max(2);
        if children.len() < threshold {
            return None;
        }

        let mut field = None;
        let mut values = BTreeSet::new();
        for child in children {
            let Expression::Leaf(predicate) = child else {
                return None;
            };
            if *field.get_or_insert(predicate.field()) != predicate.field() {
                return None;
            }
            match predicate.operand() {
                Operand::Scalar(value) => {
                    values.insert(value);
                }
                Operand::Set(set) => values.extend(set),
                Operand::Interval(_) => return None,
            }
        }

        let field = field?;
        let ColumnRef::Column(column) = resolve(field).column else {
            return None;
        };
        let condition = self
            .col(resolve(field).table, column)
            .is_in(values.iter().map(|v| scalar_value(v)));
        Some((
            condition,
            Optimization::OrToIn {
                field,
                value_count: values.len(),
            },
        ))
    }
}

/// Convert a leaf scalar to a sea-query Value
fn scalar_value(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Text(s) => Value::String(Some(Box::new(s.clone()))),
        Scalar::Bool(b) => Value::Bool(Some(*b)),
    }
}

/// Compile with the default configuration.
pub fn compile(expression: &Expression, anchor: Table) -> FilterResult<CompiledQuery> {
    SqlCompiler::new().compile(expression, anchor)
}
