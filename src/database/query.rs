// src/database/query.rs

//! Composable predicates over ledger rows.
//!
//! ```ignore
//! use memodag::database::{field, where_, Direction, Field};
//!
//! let q = where_(field(Field::Task).eq("double"))
//!     .and_where(field(Field::Status).eq("failed"))
//!     .order_by(Field::CreatedAt, Direction::Desc)
//!     .limit(10);
//! ```

use std::cmp::Ordering;
use std::fmt;

use crate::database::{Dataset, DatasetStatus};
use crate::fingerprint::Fingerprint;
use crate::job::{FailureKind, JobId, RunId};
use crate::value::Value;

/// A queryable attribute of a [`Dataset`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    /// Hex string.
    Fingerprint,
    /// Task name.
    Task,
    Version,
    /// `"succeeded"`, `"failed"` or `"skipped"`. String operands are
    /// compared case-insensitively, so `"Succeeded"` and
    /// `DatasetStatus::Succeeded` both match.
    Status,
    Attempt,
    /// Run id as a string.
    RunId,
    /// Job index within its run.
    Job,
    /// Creation time as unix milliseconds.
    CreatedAt,
    /// Failure kind as a string; absent on succeeded rows. Operands are
    /// case-insensitive like `Status`.
    FailureKind,
    /// A task-supplied metadata entry.
    Meta(String),
}

impl Field {
    pub fn meta(key: impl Into<String>) -> Self {
        Field::Meta(key.into())
    }

    /// Extract this field's value from a row, if present.
    pub fn extract(&self, row: &Dataset) -> Option<Value> {
        match self {
            Field::Fingerprint => Some(Value::Str(row.fingerprint.to_hex())),
            Field::Task => Some(Value::Str(row.task.clone())),
            Field::Version => Some(Value::Int(row.version as i64)),
            Field::Status => Some(Value::from(row.status.as_str())),
            Field::Attempt => Some(Value::Int(row.attempt as i64)),
            Field::RunId => Some(Value::Str(row.run_id.to_string())),
            Field::Job => Some(Value::Int(row.job.0 as i64)),
            Field::CreatedAt => Some(Value::Int(row.created_at_millis())),
            Field::FailureKind => row
                .failure
                .as_ref()
                .map(|f| Value::from(f.kind.as_str())),
            Field::Meta(key) => row.metadata.get(key).cloned(),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Fingerprint => f.write_str("fingerprint"),
            Field::Task => f.write_str("task"),
            Field::Version => f.write_str("version"),
            Field::Status => f.write_str("status"),
            Field::Attempt => f.write_str("attempt"),
            Field::RunId => f.write_str("run_id"),
            Field::Job => f.write_str("job"),
            Field::CreatedAt => f.write_str("created_at"),
            Field::FailureKind => f.write_str("failure_kind"),
            Field::Meta(key) => write!(f, "meta.{key}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row.
    True,
    Compare {
        field: Field,
        op: CompareOp,
        value: Value,
    },
    /// Inclusive range.
    Between { field: Field, low: Value, high: Value },
    In { field: Field, values: Vec<Value> },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

fn values_equal(a: &Value, b: &Value) -> bool {
    a == b || a.compare(b) == Some(Ordering::Equal)
}

impl Predicate {
    pub fn matches(&self, row: &Dataset) -> bool {
        match self {
            Predicate::True => true,
            Predicate::Compare { field, op, value } => {
                let Some(actual) = field.extract(row) else {
                    // A missing field only satisfies `ne`.
                    return *op == CompareOp::Ne;
                };
                match op {
                    CompareOp::Eq => values_equal(&actual, value),
                    CompareOp::Ne => !values_equal(&actual, value),
                    CompareOp::Lt => actual.compare(value) == Some(Ordering::Less),
                    CompareOp::Le => matches!(
                        actual.compare(value),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                    CompareOp::Gt => actual.compare(value) == Some(Ordering::Greater),
                    CompareOp::Ge => matches!(
                        actual.compare(value),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                }
            }
            Predicate::Between { field, low, high } => field.extract(row).is_some_and(|v| {
                matches!(v.compare(low), Some(Ordering::Greater | Ordering::Equal))
                    && matches!(v.compare(high), Some(Ordering::Less | Ordering::Equal))
            }),
            Predicate::In { field, values } => field
                .extract(row)
                .is_some_and(|v| values.iter().any(|candidate| values_equal(&v, candidate))),
            Predicate::And(a, b) => a.matches(row) && b.matches(row),
            Predicate::Or(a, b) => a.matches(row) || b.matches(row),
            Predicate::Not(p) => !p.matches(row),
        }
    }

    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::True, p) | (p, Predicate::True) => p,
            (a, b) => Predicate::And(Box::new(a), Box::new(b)),
        }
    }

    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::True, _) | (_, Predicate::True) => Predicate::True,
            (a, b) => Predicate::Or(Box::new(a), Box::new(b)),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Predicate {
        match self {
            Predicate::Not(inner) => *inner,
            p => Predicate::Not(Box::new(p)),
        }
    }
}

/// Start a predicate on `field`.
pub fn field(field: Field) -> FieldRef {
    FieldRef { field }
}

/// Predicate builder for a single field.
#[derive(Debug, Clone)]
pub struct FieldRef {
    field: Field,
}

impl FieldRef {
    /// Enum-valued fields are stored lowercase.
    fn operand(&self, value: impl Into<Value>) -> Value {
        match (&self.field, value.into()) {
            (Field::Status | Field::FailureKind, Value::Str(s)) => Value::Str(s.to_lowercase()),
            (_, value) => value,
        }
    }

    fn compare(self, op: CompareOp, value: impl Into<Value>) -> Predicate {
        let value = self.operand(value);
        Predicate::Compare {
            field: self.field,
            op,
            value,
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Ne, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Lt, value)
    }

    pub fn le(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Le, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Gt, value)
    }

    pub fn ge(self, value: impl Into<Value>) -> Predicate {
        self.compare(CompareOp::Ge, value)
    }

    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Predicate {
        let low = self.operand(low);
        let high = self.operand(high);
        Predicate::Between {
            field: self.field,
            low,
            high,
        }
    }

    pub fn is_in<V, I>(self, values: I) -> Predicate
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let values = values.into_iter().map(|v| self.operand(v)).collect();
        Predicate::In {
            field: self.field,
            values,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// A predicate plus optional ordering and limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    predicate: Predicate,
    order: Option<(Field, Direction)>,
    limit: Option<usize>,
}

/// Start a query from a predicate.
pub fn where_(predicate: Predicate) -> Query {
    Query {
        predicate,
        order: None,
        limit: None,
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::all()
    }
}

impl Query {
    /// Matches every row.
    pub fn all() -> Self {
        where_(Predicate::True)
    }

    pub fn and_where(mut self, predicate: Predicate) -> Self {
        self.predicate = self.predicate.and(predicate);
        self
    }

    pub fn or_where(mut self, predicate: Predicate) -> Self {
        self.predicate = self.predicate.or(predicate);
        self
    }

    /// Sort results by `field`. Rows missing the field sort last.
    pub fn order_by(mut self, field: Field, direction: Direction) -> Self {
        self.order = Some((field, direction));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn ordering(&self) -> Option<&(Field, Direction)> {
        self.order.as_ref()
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.limit
    }

    /// Stable sort of already-filtered rows according to this query.
    pub(crate) fn sort(&self, rows: &mut [Dataset]) {
        let Some((field, direction)) = &self.order else {
            return;
        };
        rows.sort_by(|a, b| {
            match (field.extract(a), field.extract(b)) {
                (Some(x), Some(y)) => {
                    let ord = x.compare(&y).unwrap_or(Ordering::Equal);
                    match direction {
                        Direction::Asc => ord,
                        Direction::Desc => ord.reverse(),
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
    }
}

impl From<Fingerprint> for Value {
    fn from(fp: Fingerprint) -> Self {
        Value::Str(fp.to_hex())
    }
}

impl From<&Fingerprint> for Value {
    fn from(fp: &Fingerprint) -> Self {
        Value::Str(fp.to_hex())
    }
}

impl From<DatasetStatus> for Value {
    fn from(status: DatasetStatus) -> Self {
        Value::from(status.as_str())
    }
}

impl From<FailureKind> for Value {
    fn from(kind: FailureKind) -> Self {
        Value::from(kind.as_str())
    }
}

impl From<RunId> for Value {
    fn from(run: RunId) -> Self {
        Value::Str(run.to_string())
    }
}

impl From<JobId> for Value {
    fn from(job: JobId) -> Self {
        Value::Int(job.0 as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobFailure;
    use crate::task::TaskId;

    fn row(task: &str, status: DatasetStatus, attempt: u32) -> Dataset {
        let id = TaskId::new(task, 1);
        let fp = Fingerprint::from_bytes([attempt as u8; 32]);
        let run = RunId::new();
        match status {
            DatasetStatus::Succeeded => Dataset::succeeded(
                run,
                JobId(0),
                &id,
                fp,
                attempt,
                crate::database::ArtifactRef {
                    key: fp.to_hex(),
                    size: 1,
                },
            ),
            DatasetStatus::Failed => {
                Dataset::failed(run, JobId(0), &id, fp, attempt, JobFailure::timeout("slow"))
            }
            DatasetStatus::Skipped => Dataset::skipped(
                run,
                JobId(1),
                &id,
                fp,
                0,
                JobFailure::dependency_failed("upstream"),
            ),
        }
    }

    #[test]
    fn comparisons_and_ranges() {
        let r = row("double", DatasetStatus::Failed, 2);
        assert!(field(Field::Task).eq("double").matches(&r));
        assert!(field(Field::Task).ne("triple").matches(&r));
        assert!(field(Field::Attempt).gt(1).matches(&r));
        assert!(field(Field::Attempt).le(2).matches(&r));
        assert!(!field(Field::Attempt).lt(2).matches(&r));
        assert!(field(Field::Attempt).between(2, 3).matches(&r));
        assert!(!field(Field::Attempt).between(3, 9).matches(&r));
        assert!(field(Field::Status).is_in(["failed", "skipped"]).matches(&r));
        assert!(field(Field::FailureKind).eq(FailureKind::Timeout).matches(&r));
    }

    #[test]
    fn status_and_failure_kind_ignore_case() {
        let r = row("double", DatasetStatus::Failed, 2);
        assert!(field(Field::Status).eq("Failed").matches(&r));
        assert!(field(Field::Status).eq(DatasetStatus::Failed).matches(&r));
        assert!(field(Field::Status).is_in(["SKIPPED", "Failed"]).matches(&r));
        assert!(!field(Field::Status).eq("Succeeded").matches(&r));
        assert!(field(Field::FailureKind).eq("Timeout").matches(&r));
        // Other string fields stay exact.
        assert!(!field(Field::Task).eq("Double").matches(&r));
    }

    #[test]
    fn missing_fields_only_match_ne() {
        let r = row("double", DatasetStatus::Succeeded, 1);
        assert!(!field(Field::FailureKind).eq("timeout").matches(&r));
        assert!(field(Field::FailureKind).ne("timeout").matches(&r));
        assert!(!field(Field::meta("rows")).gt(0).matches(&r));
    }

    #[test]
    fn combinators() {
        let ok = row("a", DatasetStatus::Succeeded, 1);
        let bad = row("b", DatasetStatus::Failed, 1);

        let p = field(Field::Task).eq("a").or(field(Field::Status).eq("failed"));
        assert!(p.matches(&ok) && p.matches(&bad));

        let p = field(Field::Task).eq("a").and(field(Field::Status).eq("failed"));
        assert!(!p.matches(&ok) && !p.matches(&bad));

        let p = field(Field::Task).eq("a").not();
        assert!(!p.matches(&ok) && p.matches(&bad));
        assert_eq!(p.clone().not(), field(Field::Task).eq("a"));

        assert_eq!(Predicate::True.and(p.clone()), p);
    }

    #[test]
    fn sort_orders_rows_and_puts_missing_last() {
        let mut rows = vec![
            row("a", DatasetStatus::Succeeded, 1),
            row("b", DatasetStatus::Failed, 3),
            row("c", DatasetStatus::Failed, 2),
        ];
        let q = Query::all().order_by(Field::Attempt, Direction::Desc);
        q.sort(&mut rows);
        let tasks: Vec<_> = rows.iter().map(|r| r.task.as_str()).collect();
        assert_eq!(tasks, ["b", "c", "a"]);

        let q = Query::all().order_by(Field::FailureKind, Direction::Asc);
        q.sort(&mut rows);
        assert_eq!(rows.last().map(|r| r.task.as_str()), Some("a"));
    }
}
