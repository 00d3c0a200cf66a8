//! Payload filters in Qdrant's wire format.
//!
//! The same [`Filter`] value is sent verbatim to Qdrant and evaluated locally
//! by the in-memory store against the payload's camelCase JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Match clause: exact value or membership in a set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Match {
    Value(Value),
    Any(Vec<Value>),
}

/// Numeric range clause; unset bounds are open.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<f64>,
}

impl Range {
    pub fn less_than(bound: f64) -> Self {
        Self {
            lt: Some(bound),
            ..Default::default()
        }
    }

    fn contains(&self, x: f64) -> bool {
        self.lt.map_or(true, |b| x < b)
            && self.lte.map_or(true, |b| x <= b)
            && self.gt.map_or(true, |b| x > b)
            && self.gte.map_or(true, |b| x >= b)
    }
}

/// A condition on one payload field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub key: String,
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<Match>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

impl Condition {
    /// `key == value`
    pub fn equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            matches: Some(Match::Value(value.into())),
            range: None,
        }
    }

    /// `key in values`
    pub fn any<V: Into<Value>>(key: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Self {
            key: key.into(),
            matches: Some(Match::Any(values.into_iter().map(Into::into).collect())),
            range: None,
        }
    }

    pub fn range(key: impl Into<String>, range: Range) -> Self {
        Self {
            key: key.into(),
            matches: None,
            range: Some(range),
        }
    }

    /// A missing field never satisfies a condition.
    pub fn is_satisfied_by(&self, payload: &Value) -> bool {
        let Some(field) = payload.get(&self.key) else {
            return false;
        };
        let match_ok = match &self.matches {
            None => true,
            Some(Match::Value(v)) => field == v,
            Some(Match::Any(vs)) => vs.iter().any(|v| field == v),
        };
        let range_ok = match &self.range {
            None => true,
            Some(range) => field.as_f64().is_some_and(|x| range.contains(x)),
        };
        match_ok && range_ok
    }
}

/// Conjunction of `must` conditions and negated `must_not` conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<Condition>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must(mut self, condition: Condition) -> Self {
        self.must.push(condition);
        self
    }

    pub fn must_not(mut self, condition: Condition) -> Self {
        self.must_not.push(condition);
        self
    }

    pub fn matches(&self, payload: &Value) -> bool {
        self.must.iter().all(|c| c.is_satisfied_by(payload))
            && !self.must_not.iter().any(|c| c.is_satisfied_by(payload))
    }
}
