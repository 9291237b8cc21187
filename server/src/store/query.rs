use std::cmp::Ordering;

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Op {
    pub fn sql(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "<>",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Gt => ">",
            Op::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// A comparison against one top-level field of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: String,
    pub op: Op,
    pub value: Value,
}

impl Predicate {
    pub fn matches(&self, doc: &Value) -> bool {
        let actual = doc.get(&self.field).unwrap_or(&Value::Null);
        match self.op {
            Op::Eq => actual == &self.value,
            Op::Ne => actual != &self.value,
            Op::Lt => compare_values(actual, &self.value) == Some(Ordering::Less),
            Op::Lte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Op::Gt => compare_values(actual, &self.value) == Some(Ordering::Greater),
            Op::Gte => matches!(
                compare_values(actual, &self.value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    pub predicates: Vec<Predicate>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, field: &str, op: Op, value: impl Into<Value>) -> Self {
        self.predicates.push(Predicate {
            field: field.to_string(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn eq(self, field: &str, value: impl Into<Value>) -> Self {
        self.filter(field, Op::Eq, value)
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.to_string(),
            direction,
        });
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.predicates.iter().all(|p| p.matches(doc))
    }

    /// Orders documents by the sort field, then by id so results are stable.
    pub fn sort(&self, docs: &mut [(String, Value)]) {
        match &self.order_by {
            Some(order) => docs.sort_by(|(a_id, a), (b_id, b)| {
                let a_field = a.get(&order.field).unwrap_or(&Value::Null);
                let b_field = b.get(&order.field).unwrap_or(&Value::Null);
                let ordering = compare_values(a_field, b_field).unwrap_or(Ordering::Equal);
                let ordering = match order.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                };
                ordering.then_with(|| a_id.cmp(b_id))
            }),
            None => docs.sort_by(|(a_id, _), (b_id, _)| a_id.cmp(b_id)),
        }
    }
}

/// Ordering between two scalars of the same JSON type; mixed types don't compare.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}
