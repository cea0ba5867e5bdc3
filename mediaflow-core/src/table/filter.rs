//! Provider-neutral filter expressions over JSON documents.
//!
//! Properties are addressed by their wire (camelCase) names, with `.`
//! separating nested fields. Timestamps are compared in their fixed-width
//! string form, see [`mediaflow_model::timestamp`].

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use mediaflow_model::timestamp;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum FilterValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::String(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::String(value)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(value: DateTime<Utc>) -> Self {
        FilterValue::String(timestamp::format(&value))
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Number(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl FilterOperator {
    pub fn as_sql(self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "<>",
            FilterOperator::Lt => "<",
            FilterOperator::Le => "<=",
            FilterOperator::Gt => ">",
            FilterOperator::Ge => ">=",
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            FilterOperator::Eq => ordering == Ordering::Equal,
            FilterOperator::Ne => ordering != Ordering::Equal,
            FilterOperator::Lt => ordering == Ordering::Less,
            FilterOperator::Le => ordering != Ordering::Greater,
            FilterOperator::Gt => ordering == Ordering::Greater,
            FilterOperator::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FilterExpression {
    Condition {
        property: String,
        operator: FilterOperator,
        value: FilterValue,
    },
    And(Vec<FilterExpression>),
    Or(Vec<FilterExpression>),
}

impl FilterExpression {
    pub fn condition(
        property: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FilterValue>,
    ) -> Self {
        FilterExpression::Condition {
            property: property.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(property: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::condition(property, FilterOperator::Eq, value)
    }

    pub fn and(self, other: FilterExpression) -> Self {
        match self {
            FilterExpression::And(mut all) => {
                all.push(other);
                FilterExpression::And(all)
            }
            first => FilterExpression::And(vec![first, other]),
        }
    }

    /// Evaluates the expression against a stored document.
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            FilterExpression::Condition {
                property,
                operator,
                value,
            } => match lookup(document, property) {
                Some(found) => compare(found, value)
                    .is_some_and(|ordering| operator.accepts(ordering)),
                None => *operator == FilterOperator::Ne,
            },
            FilterExpression::And(all) => all.iter().all(|e| e.matches(document)),
            FilterExpression::Or(any) => any.iter().any(|e| e.matches(document)),
        }
    }
}

pub(crate) fn lookup<'a>(document: &'a Value, property: &str) -> Option<&'a Value> {
    property
        .split('.')
        .try_fold(document, |current, key| current.get(key))
        .filter(|value| !value.is_null())
}

fn compare(found: &Value, expected: &FilterValue) -> Option<Ordering> {
    match (found, expected) {
        (Value::String(found), FilterValue::String(expected)) => {
            Some(found.as_str().cmp(expected.as_str()))
        }
        (Value::Number(found), FilterValue::Number(expected)) => {
            found.as_f64()?.partial_cmp(expected)
        }
        (Value::Bool(found), FilterValue::Bool(expected)) => {
            Some(found.cmp(expected))
        }
        _ => None,
    }
}

/// Orders two documents by a property; missing values sort first.
pub(crate) fn compare_documents(a: &Value, b: &Value, property: &str) -> Ordering {
    match (lookup(a, property), lookup(b, property)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(a), Some(b)) => a.to_string().cmp(&b.to_string()),
    }
}
