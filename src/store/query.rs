// Collection queries - pure evaluation over decoded documents
use serde_json::Value;
use std::cmp::Ordering;

use super::Document;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    ArrayContains(String, Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(field.into(), value.into()))
    }

    pub fn where_array_contains(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::ArrayContains(field.into(), value.into()))
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document satisfies every filter. A document missing the
    /// filtered field never matches, `Ne` included.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|filter| filter.matches(doc))
    }

    /// Filter, order and truncate a collection's documents. Documents
    /// lacking the ordering field are dropped.
    pub fn apply(&self, docs: Vec<Document>) -> Vec<Document> {
        let mut docs: Vec<Document> = docs.into_iter().filter(|d| self.matches(d)).collect();

        if let Some((field, direction)) = &self.order_by {
            docs.retain(|d| d.get(field).is_some_and(|v| !v.is_null()));
            docs.sort_by(|a, b| {
                let ord = compare_values(&a.fields[field.as_str()], &b.fields[field.as_str()])
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }

        docs
    }
}

impl Filter {
    pub fn field(&self) -> &str {
        match self {
            Self::Eq(f, _)
            | Self::Ne(f, _)
            | Self::Lt(f, _)
            | Self::Lte(f, _)
            | Self::Gt(f, _)
            | Self::Gte(f, _)
            | Self::ArrayContains(f, _) => f,
        }
    }

    fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = doc.get(self.field()) else {
            return false;
        };

        match self {
            Self::Eq(_, expected) => actual == expected,
            Self::Ne(_, expected) => actual != expected,
            Self::Lt(_, bound) => compare_values(actual, bound) == Some(Ordering::Less),
            Self::Lte(_, bound) => matches!(
                compare_values(actual, bound),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::Gt(_, bound) => compare_values(actual, bound) == Some(Ordering::Greater),
            Self::Gte(_, bound) => matches!(
                compare_values(actual, bound),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::ArrayContains(_, needle) => actual
                .as_array()
                .is_some_and(|items| items.iter().any(|item| item == needle)),
        }
    }
}

/// Ordering between two scalar values of the same kind. Timestamps are
/// stored as fixed-width RFC 3339 strings, so string order is time order.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
