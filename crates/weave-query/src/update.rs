//! Update documents.

use serde_json::{Map, Value};
use weave_state::StateDiff;
use weave_types::Record;

use crate::error::{QueryError, QueryResult};

/// An update document under construction.
///
/// Operators render in a fixed order; repeating a path under one operator
/// keeps the last value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    set: Record,
    unset: Record,
    inc: Record,
    push: Record,
    raw: Record,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(path.into(), value.into());
        self
    }

    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.unset.insert(path.into(), Value::String(String::new()));
        self
    }

    pub fn inc(mut self, path: impl Into<String>, by: impl Into<Value>) -> Self {
        self.inc.insert(path.into(), by.into());
        self
    }

    pub fn push(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push.insert(path.into(), value.into());
        self
    }

    /// An update document used as-is. It must use operators only.
    pub fn raw(value: Value) -> QueryResult<Self> {
        let raw = match value {
            Value::Object(raw) => raw,
            other => return Err(QueryError::NotADocument(other.to_string())),
        };
        if raw.is_empty() || !raw.keys().all(|k| k.starts_with('$')) {
            return Err(QueryError::MissingOperator(Value::Object(raw).to_string()));
        }
        Ok(Self {
            raw,
            ..Self::default()
        })
    }

    /// The update applying a state diff.
    pub fn from_diff(diff: &StateDiff) -> Self {
        Self {
            raw: diff.to_update(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            && self.unset.is_empty()
            && self.inc.is_empty()
            && self.push.is_empty()
            && self.raw.is_empty()
    }

    /// Render to an update document.
    pub fn render(&self) -> Record {
        let mut out = self.raw.clone();
        for (operator, fields) in [
            ("$set", &self.set),
            ("$unset", &self.unset),
            ("$inc", &self.inc),
            ("$push", &self.push),
        ] {
            if fields.is_empty() {
                continue;
            }
            match out.get_mut(operator) {
                Some(Value::Object(existing)) => existing.extend(fields.clone()),
                _ => {
                    out.insert(operator.into(), Value::Object(fields.clone()));
                }
            }
        }
        out
    }
}

impl From<Update> for Map<String, Value> {
    fn from(update: Update) -> Self {
        update.render()
    }
}
