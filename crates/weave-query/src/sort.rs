use serde_json::{json, Map, Value};
use weave_store::{FindOptions, SortDirection};

/// Ordered sort keys.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Sort {
    keys: Vec<(String, SortDirection)>,
}

impl Sort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortDirection::Ascending));
        self
    }

    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortDirection::Descending));
        self
    }

    /// Parse `"field"` / `"-field"` / `"+field"` shorthand.
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => Self::new().desc(field),
            None => Self::new().asc(spec.strip_prefix('+').unwrap_or(spec)),
        }
    }

    /// Keys of `other` after the keys of `self`.
    pub fn then(mut self, other: Sort) -> Self {
        self.keys.extend(other.keys);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[(String, SortDirection)] {
        &self.keys
    }

    /// Copy the keys into find options.
    pub fn apply(&self, options: FindOptions) -> FindOptions {
        self.keys
            .iter()
            .fold(options, |o, (field, direction)| o.with_sort(field.clone(), *direction))
    }

    /// The `$sort` pipeline stage, if there are keys.
    pub fn to_stage(&self) -> Option<Value> {
        if self.keys.is_empty() {
            return None;
        }
        let spec: Map<String, Value> = self
            .keys
            .iter()
            .map(|(field, direction)| (field.clone(), json!(direction.as_i32())))
            .collect();
        Some(json!({ "$sort": spec }))
    }
}
